use chrono::{DateTime, Utc};
use serde::Deserialize;

// ============================================================================
// Feed Types
// ============================================================================

/// Syndication format of a provider's status feed.
///
/// Deserializes case-insensitively; anything that is not `rss` is treated as
/// Atom, the format most hosted status pages publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum FeedType {
    #[default]
    Atom,
    Rss,
}

impl From<&str> for FeedType {
    fn from(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("rss") {
            FeedType::Rss
        } else {
            FeedType::Atom
        }
    }
}

impl From<String> for FeedType {
    fn from(s: String) -> Self {
        FeedType::from(s.as_str())
    }
}

impl std::fmt::Display for FeedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedType::Atom => f.write_str("atom"),
            FeedType::Rss => f.write_str("rss"),
        }
    }
}

// ============================================================================
// Incident Types
// ============================================================================

/// An affected sub-service listed inside an incident, e.g. `Chat Completions (Degraded)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Component {
    pub name: String,
    /// Operational state in parentheses after the name; empty when absent.
    pub status: String,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.status.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} ({})", self.name, self.status)
        }
    }
}

/// A single status-page entry as parsed from a provider feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Incident {
    /// Feed entry identifier (Atom `id`, RSS `guid` or `link`); stable across polls.
    pub id: String,
    pub title: String,
    /// Text of the `Status:` marker, or `"Unknown"`.
    pub status: String,
    pub updated: DateTime<Utc>,
    pub link: String,
    pub summary: String,
    pub components: Vec<Component>,
    /// Display name of the provider whose feed produced this incident.
    pub provider: String,
}

impl Incident {
    /// Comma-separated component names, or `N/A` when none were listed.
    pub fn product_names(&self) -> String {
        if self.components.is_empty() {
            return "N/A".to_string();
        }
        self.components
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
