//! Runs one poll loop per configured provider.

use crate::config::Config;
use crate::events::TrackerEvent;
use crate::feed::FeedClient;
use crate::monitor::{IncidentCounter, Monitor};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Owns the resources every poll loop shares: the HTTP client, the
/// tracked-incident counter and the event channel.
pub struct Tracker {
    config: Config,
    client: FeedClient,
    counter: Arc<IncidentCounter>,
    tx: mpsc::Sender<TrackerEvent>,
}

impl Tracker {
    pub fn new(
        config: Config,
        client: FeedClient,
        counter: Arc<IncidentCounter>,
        tx: mpsc::Sender<TrackerEvent>,
    ) -> Self {
        Self {
            config,
            client,
            counter,
            tx,
        }
    }

    /// Spawns every poll loop and waits until all of them have stopped.
    ///
    /// Loops only stop on cancellation; a panicking loop is logged and the
    /// others keep running. The event sender is dropped on return, which
    /// lets the consumer drain and finish.
    pub async fn run(self, cancel: CancellationToken) {
        let mut loops = JoinSet::new();

        for provider in self.config.providers {
            tracing::info!(
                provider = %provider.name,
                url = %provider.feed_url,
                feed_type = %provider.feed_type,
                interval_secs = provider.poll_interval,
                "Starting poll loop"
            );
            let monitor = Monitor::new(
                provider,
                self.config.settings.clone(),
                self.client.clone(),
                Arc::clone(&self.counter),
                self.tx.clone(),
            );
            loops.spawn(monitor.run(cancel.clone()));
        }
        drop(self.tx);

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::error!(error = %e, "Poll loop panicked");
                }
            }
        }

        tracing::info!(
            tracked_incidents = self.counter.get(),
            "All poll loops stopped"
        );
    }
}
