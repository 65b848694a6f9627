//! Slack incoming-webhook channel

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::io::HttpClient;
use crate::notifier::{
    alert_title, render_acknowledgement, render_all_clear, render_status_report, AckNotifier,
    Acknowledgement, Alert, AllClear, Notifier,
};
use crate::report::StatusReportData;

const COLOR_DOWN: &str = "#d00000";
const COLOR_RECOVERED: &str = "#2eb886";
const COLOR_INFO: &str = "#439fe0";

pub struct SlackNotifier {
    name: String,
    webhook_url: String,
    channel: Option<String>,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackNotifier")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .finish()
    }
}

impl SlackNotifier {
    pub fn new(
        name: &str,
        webhook_url: &str,
        channel: Option<String>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            name: name.to_string(),
            webhook_url: webhook_url.to_string(),
            channel,
            http,
        }
    }

    fn payload(&self, title: &str, text: &str, color: &str) -> serde_json::Value {
        let mut payload = json!({
            "text": title,
            "attachments": [{"color": color, "text": text}],
        });
        if let Some(channel) = &self.channel {
            payload["channel"] = json!(channel);
        }
        payload
    }

    async fn post(&self, payload: serde_json::Value) -> crate::Result<()> {
        let response = self.http.post_json(&self.webhook_url, &payload).await?;
        if !response.is_success() {
            return Err(crate::VigilError::Notifier(format!(
                "Slack webhook returned status {}: {}",
                response.status, response.body
            )));
        }
        Ok(())
    }

    fn alert_text(alert: &Alert, ack_url: Option<&str>) -> String {
        let mut text = alert.message.clone();
        if let Some(address) = &alert.address {
            text = format!("{}\n{}", address, text);
        }
        if let Some(url) = ack_url {
            text.push_str(&format!("\n<{}|Acknowledge>", url));
        }
        text
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        "slack"
    }

    async fn send_alert(&self, alert: &Alert) -> crate::Result<()> {
        let text = Self::alert_text(alert, None);
        self.post(self.payload(&alert_title(alert), &text, COLOR_DOWN))
            .await
    }

    async fn send_all_clear(&self, all_clear: &AllClear) -> crate::Result<()> {
        let title = format!("[RECOVERED] {}", all_clear.target);
        self.post(self.payload(&title, &render_all_clear(all_clear), COLOR_RECOVERED))
            .await
    }

    async fn send_status_report(&self, report: &StatusReportData) -> crate::Result<()> {
        self.post(self.payload("Status report", &render_status_report(report), COLOR_INFO))
            .await
    }

    fn acknowledgements(&self) -> Option<&dyn AckNotifier> {
        Some(self)
    }
}

#[async_trait]
impl AckNotifier for SlackNotifier {
    async fn send_alert_with_ack(&self, alert: &Alert, ack_url: &str) -> crate::Result<()> {
        let text = Self::alert_text(alert, Some(ack_url));
        self.post(self.payload(&alert_title(alert), &text, COLOR_DOWN))
            .await
    }

    async fn send_acknowledgement(&self, ack: &Acknowledgement) -> crate::Result<()> {
        let title = format!("[ACKNOWLEDGED] {}", ack.subject);
        self.post(self.payload(&title, &render_acknowledgement(ack), COLOR_INFO))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{HttpResponse, MockHttpClient};
    use crate::notifier::AlertKind;
    use chrono::Utc;

    fn alert() -> Alert {
        Alert {
            target: "api".to_string(),
            address: Some("http://api.local".to_string()),
            kind: AlertKind::Down,
            message: "HTTP 502".to_string(),
            failure_count: 2,
            down_since: None,
            status_code: Some(502),
            timestamp: Utc::now(),
        }
    }

    fn response(status: u16) -> crate::Result<HttpResponse> {
        Ok(HttpResponse {
            status,
            body: "ok".to_string(),
            content_type: None,
        })
    }

    #[tokio::test]
    async fn alert_with_ack_links_the_token() {
        let mut mock = MockHttpClient::new();
        mock.expect_post_json()
            .withf(|url, body| {
                url == "https://hooks.slack.test/T1"
                    && body["text"] == "[DOWN] api"
                    && body["channel"] == "#ops"
                    && body["attachments"][0]["text"]
                        .as_str()
                        .is_some_and(|t| t.ends_with("<https://vigil/ack/abc|Acknowledge>"))
            })
            .returning(|_, _| Box::pin(async { response(200) }));

        let slack = SlackNotifier::new(
            "slack",
            "https://hooks.slack.test/T1",
            Some("#ops".to_string()),
            Arc::new(mock),
        );
        slack
            .send_alert_with_ack(&alert(), "https://vigil/ack/abc")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn plain_alert_has_no_channel_override() {
        let mut mock = MockHttpClient::new();
        mock.expect_post_json()
            .withf(|_, body| body.get("channel").is_none())
            .returning(|_, _| Box::pin(async { response(200) }));

        let slack = SlackNotifier::new("slack", "https://hooks.slack.test/T1", None, Arc::new(mock));
        slack.send_alert(&alert()).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut mock = MockHttpClient::new();
        mock.expect_post_json()
            .returning(|_, _| Box::pin(async { response(404) }));

        let slack = SlackNotifier::new("slack", "https://hooks.slack.test/T1", None, Arc::new(mock));
        let err = slack.send_alert(&alert()).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
