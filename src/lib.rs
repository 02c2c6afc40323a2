//! Watches provider status-page feeds (Atom/RSS) and reports incidents that
//! are new or have changed since the previous poll.
//!
//! One [`monitor::Monitor`] runs per provider. Each cycle does a conditional
//! GET, skips bodies identical to the last one parsed, parses the feed into
//! [`feed::Incident`]s and diffs them against what the loop has already seen.
//! Results are sent as [`events::TrackerEvent`]s to the console notifier.

pub mod config;
pub mod events;
pub mod feed;
pub mod health;
pub mod monitor;
pub mod notifier;
pub mod tracker;
pub mod util;
