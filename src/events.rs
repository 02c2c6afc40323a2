//! Events produced by the poll loops and consumed by the notifier.

use crate::feed::Incident;
use std::sync::Arc;
use std::time::Duration;

/// Capacity of the bounded event channel between poll loops and the notifier.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why an incident is being surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentKind {
    /// Shown once at startup as context; not counted.
    Historical,
    /// An id the provider's loop has never seen before.
    New,
    /// A known id whose status, summary or components changed.
    Updated,
}

impl IncidentKind {
    /// New and updated incidents count towards the tracked total; historical ones don't.
    pub fn is_tracked(self) -> bool {
        !matches!(self, IncidentKind::Historical)
    }

    pub fn label(self) -> &'static str {
        match self {
            IncidentKind::Historical => "HISTORICAL",
            IncidentKind::New => "NEW INCIDENT",
            IncidentKind::Updated => "INCIDENT UPDATE",
        }
    }
}

/// Everything a poll loop reports.
///
/// Provider names are `Arc<str>` so each emission is a refcount bump rather
/// than a string copy.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    MonitoringStarted {
        provider: Arc<str>,
        url: Arc<str>,
        interval: Duration,
    },
    /// Precedes the historical incidents of a provider's first cycle.
    Historical { provider: Arc<str>, count: usize },
    Incident {
        incident: Incident,
        kind: IncidentKind,
    },
    /// Baseline captured; from now on only new/updated incidents are reported.
    Watching { provider: Arc<str> },
    Error { provider: Arc<str>, message: String },
    /// Emitted after `Error`: the loop sleeps `wait` before attempt `attempt + 1`.
    Retry {
        provider: Arc<str>,
        attempt: u32,
        wait: Duration,
    },
    /// A cycle ended on `304` or an identical body.
    NoChange { provider: Arc<str> },
}

impl TrackerEvent {
    pub fn provider(&self) -> &str {
        match self {
            TrackerEvent::MonitoringStarted { provider, .. }
            | TrackerEvent::Historical { provider, .. }
            | TrackerEvent::Watching { provider }
            | TrackerEvent::Error { provider, .. }
            | TrackerEvent::Retry { provider, .. }
            | TrackerEvent::NoChange { provider } => provider,
            TrackerEvent::Incident { incident, .. } => &incident.provider,
        }
    }
}
