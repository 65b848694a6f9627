//! Notifier traits and the messages sent through them

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::report::StatusReportData;

/// What an alert is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A target is failing its checks or was triggered
    Down,
    /// A target's response size drifted from its recent average
    SizeChange,
    /// An inbound hook fired
    Hook,
}

/// An alert to be delivered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub target: String,
    pub address: Option<String>,
    pub kind: AlertKind,
    pub message: String,
    pub failure_count: u32,
    pub down_since: Option<DateTime<Utc>>,
    pub status_code: Option<u16>,
    pub timestamp: DateTime<Utc>,
}

/// Notice that a target recovered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllClear {
    pub target: String,
    pub address: Option<String>,
    pub down_since: Option<DateTime<Utc>>,
    #[serde(with = "humantime_serde")]
    pub down_for: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Notice that someone acknowledged an incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acknowledgement {
    /// Target or hook name
    pub subject: String,
    pub acknowledged_by: String,
    pub note: Option<String>,
    pub acknowledged_at: DateTime<Utc>,
}

/// Kind of delivery recorded in the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    Alert,
    AllClear,
    Acknowledgement,
    StatusReport,
}

/// Record of a sent notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub target: String,
    pub channel: String,
    pub kind: DeliveryKind,
    pub message: String,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp_epoch_ms: i64,
}

/// Machine-readable form of a notification, used by the JSON channels
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event<'a> {
    Alert {
        alert: &'a Alert,
        ack_url: Option<&'a str>,
    },
    AllClear {
        all_clear: &'a AllClear,
    },
    Acknowledgement {
        acknowledgement: &'a Acknowledgement,
    },
    StatusReport {
        report: &'a StatusReportData,
    },
}

/// A delivery channel
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Channel name targets refer to
    fn name(&self) -> &str;

    /// Get the notifier type name (e.g. "slack")
    fn type_name(&self) -> &str;

    async fn send_alert(&self, alert: &Alert) -> crate::Result<()>;

    async fn send_all_clear(&self, all_clear: &AllClear) -> crate::Result<()>;

    async fn send_status_report(&self, report: &StatusReportData) -> crate::Result<()>;

    /// Acknowledgement-aware extension, if this channel supports it
    fn acknowledgements(&self) -> Option<&dyn AckNotifier> {
        None
    }
}

/// Channels that can carry acknowledgement links and confirmations
#[async_trait]
pub trait AckNotifier: Send + Sync {
    async fn send_alert_with_ack(&self, alert: &Alert, ack_url: &str) -> crate::Result<()>;

    async fn send_acknowledgement(&self, ack: &Acknowledgement) -> crate::Result<()>;
}

/// Compact "1h 2m 3s" rendering
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    match (hours, minutes) {
        (0, 0) => format!("{}s", seconds),
        (0, _) => format!("{}m {}s", minutes, seconds),
        _ => format!("{}h {}m {}s", hours, minutes, seconds),
    }
}

pub fn alert_title(alert: &Alert) -> String {
    match alert.kind {
        AlertKind::Down => format!("[DOWN] {}", alert.target),
        AlertKind::SizeChange => format!("[SIZE CHANGE] {}", alert.target),
        AlertKind::Hook => format!("[HOOK] {}", alert.target),
    }
}

pub fn render_alert(alert: &Alert, ack_url: Option<&str>) -> String {
    let mut lines = vec![alert_title(alert)];
    if let Some(address) = &alert.address {
        lines.push(format!("Address: {}", address));
    }
    lines.push(alert.message.clone());
    if let Some(status) = alert.status_code {
        lines.push(format!("Status code: {}", status));
    }
    if let Some(since) = alert.down_since {
        let down_for = (alert.timestamp - since).to_std().unwrap_or_default();
        lines.push(format!(
            "Down since {} ({}, {} failed checks)",
            since.to_rfc3339(),
            format_duration(down_for),
            alert.failure_count
        ));
    }
    if let Some(url) = ack_url {
        lines.push(format!("Acknowledge: {}", url));
    }
    lines.join("\n")
}

pub fn render_all_clear(all_clear: &AllClear) -> String {
    format!(
        "[RECOVERED] {} is back up after {}",
        all_clear.target,
        format_duration(all_clear.down_for)
    )
}

pub fn render_acknowledgement(ack: &Acknowledgement) -> String {
    let mut text = format!(
        "[ACKNOWLEDGED] {} acknowledged by {}",
        ack.subject, ack.acknowledged_by
    );
    if let Some(note) = &ack.note {
        text.push_str(&format!(": {}", note));
    }
    text
}

pub fn render_status_report(report: &StatusReportData) -> String {
    let mut lines = vec![format!(
        "Status report {} to {}",
        report.period_start.to_rfc3339(),
        report.period_end.to_rfc3339()
    )];

    if report.active_outages.is_empty() {
        lines.push("No active outages".to_string());
    } else {
        lines.push(format!("Active outages ({}):", report.active_outages.len()));
        for outage in &report.active_outages {
            let ack = match (outage.acknowledged, &outage.acknowledged_by) {
                (true, Some(by)) => format!(" (acknowledged by {})", by),
                (true, None) => " (acknowledged)".to_string(),
                _ => String::new(),
            };
            lines.push(format!(
                "  - {} down for {}{}",
                outage.target,
                format_duration(outage.down_for),
                ack
            ));
        }
    }

    if !report.resolved_outages.is_empty() {
        lines.push(format!(
            "Resolved outages ({}):",
            report.resolved_outages.len()
        ));
        for outage in &report.resolved_outages {
            lines.push(format!(
                "  - {} was down for {}",
                outage.target,
                format_duration(outage.down_for)
            ));
        }
    }

    lines.push(format!(
        "Alerts sent: {}, notifications sent: {}",
        report.alerts_sent, report.notifications_sent
    ));
    lines.join("\n")
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ActiveOutage, ResolvedOutage};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn format_duration_variants() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 2m 3s");
    }

    #[test]
    fn render_alert_includes_context_and_ack_link() {
        let alert = Alert {
            target: "api".to_string(),
            address: Some("http://api.local".to_string()),
            kind: AlertKind::Down,
            message: "HTTP 503".to_string(),
            failure_count: 3,
            down_since: Some(at(0)),
            status_code: Some(503),
            timestamp: at(90),
        };
        let text = render_alert(&alert, Some("http://vigil/ack/t"));
        assert!(text.starts_with("[DOWN] api"));
        assert!(text.contains("Address: http://api.local"));
        assert!(text.contains("Status code: 503"));
        assert!(text.contains("1m 30s, 3 failed checks"));
        assert!(text.ends_with("Acknowledge: http://vigil/ack/t"));
    }

    #[test]
    fn event_is_tagged() {
        let ack = Acknowledgement {
            subject: "api".to_string(),
            acknowledged_by: "alice".to_string(),
            note: None,
            acknowledged_at: at(0),
        };
        let json = serde_json::to_value(Event::Acknowledgement {
            acknowledgement: &ack,
        })
        .unwrap();
        assert_eq!(json["event"], "acknowledgement");
        assert_eq!(json["acknowledgement"]["acknowledged_by"], "alice");
    }

    #[test]
    fn render_acknowledgement_with_note() {
        let ack = Acknowledgement {
            subject: "api".to_string(),
            acknowledged_by: "alice".to_string(),
            note: Some("looking into it".to_string()),
            acknowledged_at: at(0),
        };
        assert_eq!(
            render_acknowledgement(&ack),
            "[ACKNOWLEDGED] api acknowledged by alice: looking into it"
        );
    }

    #[test]
    fn render_status_report_lists_outages() {
        let report = StatusReportData {
            period_start: at(0),
            period_end: at(3600),
            active_outages: vec![ActiveOutage {
                target: "db".to_string(),
                down_since: at(100),
                down_for: Duration::from_secs(3500),
                acknowledged: true,
                acknowledged_by: Some("bob".to_string()),
            }],
            resolved_outages: vec![ResolvedOutage {
                target: "api".to_string(),
                down_for: Duration::from_secs(60),
                recovered_at: at(200),
            }],
            alerts_sent: 4,
            notifications_sent: 9,
        };
        let text = render_status_report(&report);
        assert!(text.contains("db down for 58m 20s (acknowledged by bob)"));
        assert!(text.contains("api was down for 1m 0s"));
        assert!(text.contains("Alerts sent: 4, notifications sent: 9"));
    }
}
