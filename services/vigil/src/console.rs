//! Console channel: writes notifications to standard output

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::notifier::{
    render_acknowledgement, render_alert, render_all_clear, render_status_report, AckNotifier,
    Acknowledgement, Alert, AllClear, Notifier,
};
use crate::report::StatusReportData;

#[derive(Debug)]
pub struct ConsoleNotifier {
    name: String,
}

impl ConsoleNotifier {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    async fn write(&self, text: &str) -> crate::Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(format!("{}\n", text).as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        "console"
    }

    async fn send_alert(&self, alert: &Alert) -> crate::Result<()> {
        self.write(&render_alert(alert, None)).await
    }

    async fn send_all_clear(&self, all_clear: &AllClear) -> crate::Result<()> {
        self.write(&render_all_clear(all_clear)).await
    }

    async fn send_status_report(&self, report: &StatusReportData) -> crate::Result<()> {
        self.write(&render_status_report(report)).await
    }

    fn acknowledgements(&self) -> Option<&dyn AckNotifier> {
        Some(self)
    }
}

#[async_trait]
impl AckNotifier for ConsoleNotifier {
    async fn send_alert_with_ack(&self, alert: &Alert, ack_url: &str) -> crate::Result<()> {
        self.write(&render_alert(alert, Some(ack_url))).await
    }

    async fn send_acknowledgement(&self, ack: &Acknowledgement) -> crate::Result<()> {
        self.write(&render_acknowledgement(ack)).await
    }
}
