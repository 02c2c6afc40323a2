//! Status feed retrieval and parsing.
//!
//! - [`parser`] - Atom/RSS documents into [`Incident`] records
//! - [`html`] - the status/components/summary micro-format inside each entry
//! - [`fetcher`] - conditional HTTP GET with per-host connection limits
//!
//! # Example
//!
//! ```ignore
//! use statuswatch::feed::{FeedClient, FetchOutcome, parse_feed};
//!
//! let client = FeedClient::new()?;
//! if let FetchOutcome::Modified { body, .. } = client.fetch(url, None, None).await? {
//!     let incidents = parse_feed(&String::from_utf8_lossy(&body), FeedType::Atom, "OpenAI")?;
//! }
//! ```

mod fetcher;
mod html;
mod parser;
mod types;

pub use fetcher::{FeedClient, FetchError, FetchOutcome, DEFAULT_MAX_PER_HOST, FETCH_TIMEOUT};
pub use html::{parse_components, parse_status, parse_summary, strip_html, UNKNOWN_STATUS};
pub use parser::{parse_atom, parse_feed, parse_rss, parse_timestamp, ParseError};
pub use types::{Component, FeedType, Incident};
