//! Per-provider polling engine.
//!
//! - [`detector`] - body hash short-circuit for servers that ignore conditional requests
//! - [`diff`] - seen ids and fingerprints; classifies incidents as new or updated
//! - [`backoff`] - retry delays after failed cycles
//! - [`poll`] - the loop tying fetch, detect, parse and diff together

mod backoff;
mod detector;
mod diff;
mod metrics;
mod poll;

pub use backoff::{Backoff, MAX_BACKOFF};
pub use detector::{BodyHash, ChangeDetector};
pub use diff::{Fingerprint, IncidentDiff};
pub use metrics::IncidentCounter;
pub use poll::{CycleOutcome, Monitor, MonitorState, PollError};
