//! Console rendering of [`TrackerEvent`]s.
//!
//! Each incident is printed as the two-line `[timestamp] Product: ...` /
//! `Status: ...` record followed by an indented detail block. Everything that
//! originates from a feed goes through [`strip_control_chars`] first.

use crate::events::{IncidentKind, TrackerEvent};
use crate::feed::Incident;
use crate::util::{strip_control_chars, truncate_to_width};
use chrono::Utc;
use crossterm::style::{Color, Stylize};
use std::io::{self, Write};
use tokio::sync::mpsc;

/// Column budget for the summary line of the detail block.
pub const SUMMARY_WIDTH: usize = 200;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

struct Colors;

impl Colors {
    const BANNER: Color = Color::Cyan;
    const LABEL: Color = Color::Blue;
    const HEADER: Color = Color::Yellow;
    const WATCHING: Color = Color::Green;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
}

fn status_color(status: &str) -> Color {
    let s = status.to_ascii_lowercase();
    if s.contains("resolved") {
        Color::Green
    } else if s.contains("monitoring") {
        Color::Cyan
    } else if s.contains("identified") || s.contains("degraded") {
        Color::Yellow
    } else if s.contains("investigating") {
        Color::Red
    } else {
        Color::Magenta
    }
}

/// Writes events to any [`Write`] sink; stdout in production.
pub struct ConsoleNotifier<W: Write> {
    out: W,
    /// Render `NoChange` heartbeats (debug logging only).
    heartbeat: bool,
}

impl<W: Write> ConsoleNotifier<W> {
    pub fn new(out: W, heartbeat: bool) -> Self {
        Self { out, heartbeat }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn banner(&mut self) -> io::Result<()> {
        let rule = format!("+{}+", "-".repeat(66));
        writeln!(self.out)?;
        writeln!(self.out, "{}", rule.as_str().with(Colors::BANNER).bold())?;
        writeln!(
            self.out,
            "{}",
            format!("|{:^66}|", "Status Page Tracker -- Live Monitor")
                .with(Colors::BANNER)
                .bold()
        )?;
        writeln!(self.out, "{}", rule.as_str().with(Colors::BANNER).bold())?;
        writeln!(self.out)?;
        self.out.flush()
    }

    pub fn shutdown(&mut self) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(
            self.out,
            "{}",
            "Tracker stopped. Goodbye!".with(Colors::BANNER).bold()
        )?;
        self.out.flush()
    }

    pub fn render(&mut self, event: &TrackerEvent) -> io::Result<()> {
        match event {
            TrackerEvent::MonitoringStarted {
                provider,
                url,
                interval,
            } => writeln!(
                self.out,
                "  {} {}  {}  {}",
                "> Monitoring:".with(Colors::LABEL).bold(),
                strip_control_chars(provider),
                format!("({})", strip_control_chars(url)).with(Colors::DIM),
                format!("[every {}s]", interval.as_secs()).with(Colors::DIM),
            )?,
            TrackerEvent::Historical { provider, count } => {
                writeln!(self.out)?;
                writeln!(
                    self.out,
                    "  {}",
                    format!(
                        "{}: showing {} most recent historical incidents:",
                        strip_control_chars(provider),
                        count
                    )
                    .with(Colors::HEADER)
                    .bold()
                )?;
                writeln!(self.out)?;
            }
            TrackerEvent::Incident { incident, kind } => self.incident(incident, *kind)?,
            TrackerEvent::Watching { provider } => {
                writeln!(self.out)?;
                writeln!(
                    self.out,
                    "  {}  {}",
                    format!(
                        "{}: now watching for new updates...",
                        strip_control_chars(provider)
                    )
                    .with(Colors::WATCHING)
                    .bold(),
                    "(Press Ctrl+C to stop)".with(Colors::DIM)
                )?;
                writeln!(self.out)?;
            }
            TrackerEvent::Error { provider, message } => writeln!(
                self.out,
                "  {} {} {} {}",
                format!("[{}]", Utc::now().format(TIMESTAMP_FORMAT)).with(Colors::DIM),
                "ERROR".with(Colors::ERROR),
                format!("{}:", strip_control_chars(provider)).bold(),
                strip_control_chars(message),
            )?,
            TrackerEvent::Retry {
                provider,
                attempt,
                wait,
            } => writeln!(
                self.out,
                "  {}",
                format!(
                    "{}: Retrying in {:.1}s (attempt {})...",
                    strip_control_chars(provider),
                    wait.as_secs_f64(),
                    attempt
                )
                .with(Colors::DIM)
            )?,
            TrackerEvent::NoChange { provider } => {
                if !self.heartbeat {
                    return Ok(());
                }
                writeln!(
                    self.out,
                    "  {}",
                    format!(
                        "[{}] {}: No changes",
                        Utc::now().format("%H:%M:%S"),
                        strip_control_chars(provider)
                    )
                    .with(Colors::DIM)
                )?;
            }
        }
        self.out.flush()
    }

    fn incident(&mut self, incident: &Incident, kind: IncidentKind) -> io::Result<()> {
        let ts = incident.updated.format(TIMESTAMP_FORMAT).to_string();
        let provider = strip_control_chars(&incident.provider).into_owned();
        let title = strip_control_chars(&incident.title).into_owned();
        let status = strip_control_chars(&incident.status).into_owned();
        let summary = strip_control_chars(&incident.summary).into_owned();
        let link = strip_control_chars(&incident.link).into_owned();

        let status_line = if summary.is_empty() {
            status.clone()
        } else {
            format!("{} - {}", status, summary)
        };

        if kind != IncidentKind::Historical {
            writeln!(self.out, "{}", "─".repeat(68).with(Colors::DIM))?;
        }

        if incident.components.is_empty() {
            writeln!(self.out, "[{}] Product: {} - {}", ts, provider, title)?;
            writeln!(self.out, "Status: {}", status_line)?;
        } else {
            for component in &incident.components {
                writeln!(
                    self.out,
                    "[{}] Product: {} API - {}",
                    ts,
                    provider,
                    strip_control_chars(&component.name)
                )?;
                writeln!(self.out, "Status: {}", status_line)?;
            }
        }

        let color = status_color(&status);
        writeln!(self.out)?;
        writeln!(
            self.out,
            "  {} {}",
            format!("[{}]", ts).with(Colors::DIM),
            kind.label().with(color).bold()
        )?;
        writeln!(self.out, "    {} {}", "Provider :".bold(), provider)?;
        writeln!(self.out, "    {} {}", "Title    :".bold(), title)?;
        writeln!(
            self.out,
            "    {} {}",
            "Status   :".bold(),
            status.as_str().with(color)
        )?;
        writeln!(
            self.out,
            "    {} {}",
            "Products :".bold(),
            strip_control_chars(&incident.product_names())
        )?;
        if !summary.is_empty() {
            writeln!(
                self.out,
                "    {} {}",
                "Detail   :".bold(),
                truncate_to_width(&summary, SUMMARY_WIDTH)
                    .into_owned()
                    .with(Colors::DIM)
            )?;
        }
        if !link.is_empty() {
            writeln!(
                self.out,
                "    {} {}",
                "Link     :".bold(),
                link.as_str().with(Colors::DIM)
            )?;
        }
        writeln!(self.out)
    }
}

/// Renders events to stdout until every sender has been dropped.
pub async fn run(mut rx: mpsc::Receiver<TrackerEvent>, heartbeat: bool) {
    let mut notifier = ConsoleNotifier::new(io::stdout(), heartbeat);
    while let Some(event) = rx.recv().await {
        if let Err(e) = notifier.render(&event) {
            tracing::warn!(error = %e, provider = %event.provider(), "Failed to write event to stdout");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Component;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::time::Duration;

    fn render(event: TrackerEvent, heartbeat: bool) -> String {
        let mut notifier = ConsoleNotifier::new(Vec::new(), heartbeat);
        notifier.render(&event).unwrap();
        String::from_utf8(notifier.into_inner()).unwrap()
    }

    fn incident() -> Incident {
        Incident {
            id: "tag:status.openai.com,2005:Incident/1".into(),
            title: "Elevated errors on Chat Completions".into(),
            status: "Investigating".into(),
            updated: Utc.with_ymd_and_hms(2025, 11, 3, 14, 32, 0).unwrap(),
            link: "https://status.openai.com/incidents/1".into(),
            summary: "Degraded performance due to upstream issue".into(),
            components: vec![
                Component {
                    name: "Chat Completions".into(),
                    status: "Degraded performance".into(),
                },
                Component {
                    name: "Responses".into(),
                    status: "Degraded performance".into(),
                },
            ],
            provider: "OpenAI".into(),
        }
    }

    #[test]
    fn test_incident_record_lines() {
        let out = render(
            TrackerEvent::Incident {
                incident: incident(),
                kind: IncidentKind::New,
            },
            false,
        );

        assert!(out.contains("[2025-11-03 14:32:00] Product: OpenAI API - Chat Completions\n"));
        assert!(out.contains("[2025-11-03 14:32:00] Product: OpenAI API - Responses\n"));
        assert!(out.contains(
            "Status: Investigating - Degraded performance due to upstream issue\n"
        ));
        assert!(out.contains("NEW INCIDENT"));
        assert!(out.contains("Chat Completions, Responses"));
        assert!(out.contains("https://status.openai.com/incidents/1"));
    }

    #[test]
    fn test_incident_without_components() {
        let mut inc = incident();
        inc.components.clear();
        inc.summary.clear();
        let out = render(
            TrackerEvent::Incident {
                incident: inc,
                kind: IncidentKind::Updated,
            },
            false,
        );

        assert!(out.contains(
            "[2025-11-03 14:32:00] Product: OpenAI - Elevated errors on Chat Completions\n"
        ));
        assert!(out.contains("Status: Investigating\n"));
        assert!(out.contains("INCIDENT UPDATE"));
        assert!(out.contains("N/A"));
        assert!(!out.contains("Detail"));
    }

    #[test]
    fn test_historical_tag() {
        let out = render(
            TrackerEvent::Incident {
                incident: incident(),
                kind: IncidentKind::Historical,
            },
            false,
        );
        assert!(out.contains("HISTORICAL"));
        assert!(!out.contains("─"));
    }

    #[test]
    fn test_feed_text_is_sanitized() {
        let mut inc = incident();
        inc.title = "Outage\x1b]0;pwned\x07 now".into();
        inc.summary = "Red \x1b[31malert".into();
        let out = render(
            TrackerEvent::Incident {
                incident: inc,
                kind: IncidentKind::New,
            },
            false,
        );
        assert!(!out.contains("pwned"));
        assert!(!out.contains("\x1b[31malert"));
        assert!(out.contains("Red alert"));
    }

    #[test]
    fn test_long_summary_truncated_in_detail() {
        let mut inc = incident();
        inc.summary = "x".repeat(500);
        let out = render(
            TrackerEvent::Incident {
                incident: inc,
                kind: IncidentKind::New,
            },
            false,
        );
        let detail = out
            .lines()
            .find(|line| line.contains("Detail"))
            .unwrap();
        assert!(detail.contains(&format!("{}...", "x".repeat(197))));
        assert!(!detail.contains(&"x".repeat(198)));
    }

    #[test]
    fn test_monitoring_started() {
        let out = render(
            TrackerEvent::MonitoringStarted {
                provider: Arc::from("OpenAI"),
                url: Arc::from("https://status.openai.com/history.atom"),
                interval: Duration::from_secs(30),
            },
            false,
        );
        assert!(out.contains("Monitoring:"));
        assert!(out.contains("OpenAI"));
        assert!(out.contains("(https://status.openai.com/history.atom)"));
        assert!(out.contains("[every 30s]"));
    }

    #[test]
    fn test_error_and_retry() {
        let out = render(
            TrackerEvent::Error {
                provider: Arc::from("OpenAI"),
                message: "HTTP error: status 503".into(),
            },
            false,
        );
        assert!(out.contains("ERROR"));
        assert!(out.contains("HTTP error: status 503"));

        let out = render(
            TrackerEvent::Retry {
                provider: Arc::from("OpenAI"),
                attempt: 3,
                wait: Duration::from_millis(9300),
            },
            false,
        );
        assert!(out.contains("OpenAI: Retrying in 9.3s (attempt 3)..."));
    }

    #[test]
    fn test_heartbeat_only_when_enabled() {
        let event = TrackerEvent::NoChange {
            provider: Arc::from("OpenAI"),
        };
        assert!(render(event.clone(), false).is_empty());
        assert!(render(event, true).contains("OpenAI: No changes"));
    }

    #[test]
    fn test_banner_and_shutdown() {
        let mut notifier = ConsoleNotifier::new(Vec::new(), false);
        notifier.banner().unwrap();
        notifier.shutdown().unwrap();
        let out = String::from_utf8(notifier.into_inner()).unwrap();
        assert!(out.contains("Status Page Tracker -- Live Monitor"));
        assert!(out.contains("Tracker stopped. Goodbye!"));
    }

    #[test]
    fn test_status_color() {
        assert_eq!(status_color("Resolved"), Color::Green);
        assert_eq!(status_color("monitoring"), Color::Cyan);
        assert_eq!(status_color("Identified"), Color::Yellow);
        assert_eq!(status_color("Investigating"), Color::Red);
        assert_eq!(status_color("Unknown"), Color::Magenta);
    }
}
