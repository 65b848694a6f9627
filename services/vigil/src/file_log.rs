//! File channel: appends notifications as JSON lines

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::notifier::{AckNotifier, Acknowledgement, Alert, AllClear, Event, Notifier};
use crate::report::StatusReportData;

#[derive(Debug)]
pub struct FileNotifier {
    name: String,
    path: PathBuf,
    /// Serializes appends from concurrent deliveries
    lock: Mutex<()>,
}

impl FileNotifier {
    pub fn new(name: &str, path: &Path) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    async fn append(&self, event: Event<'_>) -> crate::Result<()> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for FileNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        "file"
    }

    async fn send_alert(&self, alert: &Alert) -> crate::Result<()> {
        self.append(Event::Alert {
            alert,
            ack_url: None,
        })
        .await
    }

    async fn send_all_clear(&self, all_clear: &AllClear) -> crate::Result<()> {
        self.append(Event::AllClear { all_clear }).await
    }

    async fn send_status_report(&self, report: &StatusReportData) -> crate::Result<()> {
        self.append(Event::StatusReport { report }).await
    }

    fn acknowledgements(&self) -> Option<&dyn AckNotifier> {
        Some(self)
    }
}

#[async_trait]
impl AckNotifier for FileNotifier {
    async fn send_alert_with_ack(&self, alert: &Alert, ack_url: &str) -> crate::Result<()> {
        self.append(Event::Alert {
            alert,
            ack_url: Some(ack_url),
        })
        .await
    }

    async fn send_acknowledgement(&self, ack: &Acknowledgement) -> crate::Result<()> {
        self.append(Event::Acknowledgement {
            acknowledgement: ack,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::AlertKind;
    use chrono::Utc;
    use std::time::Duration;

    #[tokio::test]
    async fn appends_one_json_line_per_notification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let file = FileNotifier::new("audit", &path);

        let alert = Alert {
            target: "api".to_string(),
            address: None,
            kind: AlertKind::Down,
            message: "refused".to_string(),
            failure_count: 1,
            down_since: None,
            status_code: None,
            timestamp: Utc::now(),
        };
        file.send_alert_with_ack(&alert, "http://localhost:8080/ack/t")
            .await
            .unwrap();
        file.send_all_clear(&AllClear {
            target: "api".to_string(),
            address: None,
            down_since: None,
            down_for: Duration::from_secs(5),
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "alert");
        assert_eq!(lines[0]["ack_url"], "http://localhost:8080/ack/t");
        assert_eq!(lines[1]["event"], "all_clear");
        assert_eq!(lines[1]["all_clear"]["down_for"], "5s");
    }

    #[tokio::test]
    async fn unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileNotifier::new("audit", &dir.path().join("missing").join("x.jsonl"));
        let report = StatusReportData {
            period_start: Utc::now(),
            period_end: Utc::now(),
            active_outages: vec![],
            resolved_outages: vec![],
            alerts_sent: 0,
            notifications_sent: 0,
        };
        assert!(file.send_status_report(&report).await.is_err());
    }
}
