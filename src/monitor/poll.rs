use super::backoff::Backoff;
use super::detector::{BodyHash, ChangeDetector};
use super::diff::IncidentDiff;
use super::metrics::IncidentCounter;
use crate::config::{ProviderConfig, Settings};
use crate::events::{IncidentKind, TrackerEvent};
use crate::feed::{parse_feed, FeedClient, FetchError, FetchOutcome, Incident, ParseError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A failed poll cycle. Never fatal: the loop backs off and retries.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Failed to parse feed: {0}")]
    Parse(#[from] ParseError),
}

/// How a successful cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Server answered `304 Not Modified`.
    NotModified,
    /// Body identical to the last one parsed.
    Unchanged,
    /// Body parsed and diffed; `events` is empty when nothing new or updated was found.
    Changed { events: Vec<TrackerEvent> },
}

/// Everything a poll loop remembers between cycles. Never shared, never persisted.
#[derive(Debug)]
pub struct MonitorState {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub detector: ChangeDetector,
    pub diff: IncidentDiff,
    pub backoff: Backoff,
    pub first_run: bool,
}

impl MonitorState {
    pub fn new(settings: &Settings) -> Self {
        Self {
            etag: None,
            last_modified: None,
            detector: ChangeDetector::new(),
            diff: IncidentDiff::new(),
            backoff: Backoff::new(settings.base_backoff(), settings.max_retries),
            first_run: true,
        }
    }

    /// Keeps the previous token for any validator the response omitted.
    fn refresh_tokens(&mut self, etag: Option<String>, last_modified: Option<String>) {
        if etag.is_some() {
            self.etag = etag;
        }
        if last_modified.is_some() {
            self.last_modified = last_modified;
        }
    }
}

/// Poll loop for a single provider.
///
/// Each cycle is atomic with respect to [`MonitorState`]: validator tokens,
/// the body hash, seen ids and fingerprints are only committed once the body
/// has parsed. A failed cycle only moves the backoff counter.
pub struct Monitor {
    provider: ProviderConfig,
    name: Arc<str>,
    url: Arc<str>,
    settings: Settings,
    client: FeedClient,
    counter: Arc<IncidentCounter>,
    tx: mpsc::Sender<TrackerEvent>,
    state: MonitorState,
}

impl Monitor {
    pub fn new(
        provider: ProviderConfig,
        settings: Settings,
        client: FeedClient,
        counter: Arc<IncidentCounter>,
        tx: mpsc::Sender<TrackerEvent>,
    ) -> Self {
        let state = MonitorState::new(&settings);
        Self {
            name: Arc::from(provider.name.as_str()),
            url: Arc::from(provider.feed_url.as_str()),
            provider,
            settings,
            client,
            counter,
            tx,
            state,
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Polls until `cancel` fires. Cancellation is observed while fetching,
    /// while handing events to a full channel and while sleeping; an
    /// in-flight fetch is dropped and commits nothing.
    pub async fn run(mut self, cancel: CancellationToken) {
        let interval = self.provider.interval();
        let started = TrackerEvent::MonitoringStarted {
            provider: Arc::clone(&self.name),
            url: Arc::clone(&self.url),
            interval,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(provider = %self.name, "Poll loop cancelled");
                return;
            }
            _ = self.emit(started) => {}
        }

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.poll_once() => result,
            };

            let reported = async {
                match result {
                    Ok(outcome) => {
                        self.state.backoff.reset();
                        self.report(outcome).await;
                        interval
                    }
                    Err(e) => self.report_failure(e).await,
                }
            };
            let wait = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                wait = reported => wait,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        tracing::debug!(provider = %self.name, "Poll loop cancelled");
    }

    /// Runs one fetch → detect → parse → diff cycle and returns what to report.
    pub async fn poll_once(&mut self) -> Result<CycleOutcome, PollError> {
        let fetched = self
            .client
            .fetch(
                &self.url,
                self.state.etag.as_deref(),
                self.state.last_modified.as_deref(),
            )
            .await?;

        let (body, etag, last_modified) = match fetched {
            FetchOutcome::NotModified {
                etag,
                last_modified,
            } => {
                self.state.refresh_tokens(etag, last_modified);
                return Ok(CycleOutcome::NotModified);
            }
            FetchOutcome::Modified {
                body,
                etag,
                last_modified,
            } => (body, etag, last_modified),
        };

        let hash = BodyHash::of(&body);
        if self.state.detector.is_unchanged(&hash) {
            tracing::debug!(provider = %self.name, hash = %hash, "Feed body unchanged");
            return Ok(CycleOutcome::Unchanged);
        }

        let text = String::from_utf8_lossy(&body);
        let incidents = parse_feed(&text, self.provider.feed_type, &self.name)?;
        tracing::debug!(
            provider = %self.name,
            incidents = incidents.len(),
            "Parsed feed"
        );

        // Parse succeeded: commit the cycle.
        self.state.refresh_tokens(etag, last_modified);
        self.state.detector.commit(hash);

        let events = if self.state.first_run {
            if incidents.is_empty() {
                // Nothing to seed yet; the first non-empty document becomes the baseline.
                tracing::debug!(provider = %self.name, "Empty feed on first run, baseline deferred");
                return Ok(CycleOutcome::Changed { events: Vec::new() });
            }
            self.state.first_run = false;
            self.baseline(incidents)
        } else {
            self.state
                .diff
                .apply(incidents)
                .into_iter()
                .map(|(incident, kind)| TrackerEvent::Incident { incident, kind })
                .collect()
        };

        Ok(CycleOutcome::Changed { events })
    }

    /// First successful cycle: optionally show recent history, then treat
    /// everything currently in the feed as already known.
    fn baseline(&mut self, incidents: Vec<Incident>) -> Vec<TrackerEvent> {
        let mut events = Vec::new();

        if self.settings.show_historical {
            let count = incidents.len().min(self.settings.max_historical);
            if count > 0 {
                events.push(TrackerEvent::Historical {
                    provider: Arc::clone(&self.name),
                    count,
                });
                events.extend(incidents.iter().take(count).map(|incident| {
                    TrackerEvent::Incident {
                        incident: incident.clone(),
                        kind: IncidentKind::Historical,
                    }
                }));
            }
        }

        self.state.diff.seed(&incidents);
        tracing::info!(
            provider = %self.name,
            seeded = incidents.len(),
            "Baseline captured"
        );

        events.push(TrackerEvent::Watching {
            provider: Arc::clone(&self.name),
        });
        events
    }

    async fn report(&self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::NotModified | CycleOutcome::Unchanged => {
                self.emit(TrackerEvent::NoChange {
                    provider: Arc::clone(&self.name),
                })
                .await;
            }
            CycleOutcome::Changed { events } => {
                for event in events {
                    self.emit(event).await;
                }
            }
        }
    }

    async fn report_failure(&mut self, error: PollError) -> Duration {
        let wait = self.state.backoff.record_failure();
        let attempt = self.state.backoff.consecutive_errors();
        tracing::warn!(
            provider = %self.name,
            error = %error,
            attempt,
            wait_secs = wait.as_secs_f64(),
            "Poll failed, backing off"
        );

        self.emit(TrackerEvent::Error {
            provider: Arc::clone(&self.name),
            message: error.to_string(),
        })
        .await;
        self.emit(TrackerEvent::Retry {
            provider: Arc::clone(&self.name),
            attempt,
            wait,
        })
        .await;
        wait
    }

    /// Sends an event, counting new and updated incidents on the way out.
    async fn emit(&self, event: TrackerEvent) {
        if let TrackerEvent::Incident { kind, .. } = &event {
            if kind.is_tracked() {
                self.counter.increment();
            }
        }
        if let Err(e) = self.tx.send(event).await {
            tracing::warn!(provider = %self.name, error = %e, "Channel send failed (receiver dropped)");
        }
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("provider", &self.name)
            .field("url", &self.url)
            .field("feed_type", &self.provider.feed_type)
            .field("state", &self.state)
            .finish()
    }
}
