//! Pushover notification client

use std::sync::Arc;

use async_trait::async_trait;

use crate::io::HttpClient;
use crate::notifier::{
    alert_title, render_acknowledgement, render_alert, render_all_clear, render_status_report,
    AckNotifier, Acknowledgement, Alert, AllClear, Notifier,
};
use crate::report::StatusReportData;

const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// Priority for informational messages (recoveries, acknowledgements, reports)
const QUIET_PRIORITY: i8 = -1;

/// Pushover notification sender
pub struct PushoverNotifier {
    name: String,
    api_token: String,
    user_key: String,
    default_title: String,
    default_priority: i8,
    default_sound: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for PushoverNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushoverNotifier")
            .field("name", &self.name)
            .field("default_title", &self.default_title)
            .finish()
    }
}

/// One Pushover message
struct Message<'a> {
    title: &'a str,
    message: &'a str,
    priority: i8,
    url: Option<&'a str>,
}

impl PushoverNotifier {
    pub fn new(
        name: &str,
        api_token: &str,
        user_key: &str,
        default_title: &str,
        default_priority: i8,
        default_sound: &str,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        tracing::debug!("Created PushoverNotifier '{}' with title '{}'", name, default_title);

        Self {
            name: name.to_string(),
            api_token: api_token.to_string(),
            user_key: user_key.to_string(),
            default_title: default_title.to_string(),
            default_priority,
            default_sound: default_sound.to_string(),
            http,
        }
    }

    async fn post(&self, message: Message<'_>) -> crate::Result<()> {
        let title = if message.title.is_empty() {
            self.default_title.as_str()
        } else {
            message.title
        };

        let priority_str = message.priority.to_string();
        let mut params = vec![
            ("token", self.api_token.as_str()),
            ("user", self.user_key.as_str()),
            ("title", title),
            ("message", message.message),
            ("priority", &priority_str),
            ("sound", self.default_sound.as_str()),
        ];
        if let Some(url) = message.url {
            params.push(("url", url));
            params.push(("url_title", "Acknowledge"));
        }

        tracing::debug!(
            "Sending Pushover notification: title='{}', priority={}",
            title,
            message.priority
        );

        let response = self.http.post_form(PUSHOVER_API_URL, &params).await?;

        if response.status != 200 {
            return Err(crate::VigilError::Notifier(format!(
                "Pushover API returned status {}: {}",
                response.status, response.body
            )));
        }

        tracing::debug!("Pushover notification sent successfully");
        Ok(())
    }

    async fn alert(&self, alert: &Alert, ack_url: Option<&str>) -> crate::Result<()> {
        let title = alert_title(alert);
        let text = render_alert(alert, None);
        self.post(Message {
            title: &title,
            message: &text,
            priority: self.default_priority,
            url: ack_url,
        })
        .await
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        "pushover"
    }

    async fn send_alert(&self, alert: &Alert) -> crate::Result<()> {
        self.alert(alert, None).await
    }

    async fn send_all_clear(&self, all_clear: &AllClear) -> crate::Result<()> {
        let title = format!("[RECOVERED] {}", all_clear.target);
        self.post(Message {
            title: &title,
            message: &render_all_clear(all_clear),
            priority: QUIET_PRIORITY,
            url: None,
        })
        .await
    }

    async fn send_status_report(&self, report: &StatusReportData) -> crate::Result<()> {
        self.post(Message {
            title: "",
            message: &render_status_report(report),
            priority: QUIET_PRIORITY,
            url: None,
        })
        .await
    }

    fn acknowledgements(&self) -> Option<&dyn AckNotifier> {
        Some(self)
    }
}

#[async_trait]
impl AckNotifier for PushoverNotifier {
    async fn send_alert_with_ack(&self, alert: &Alert, ack_url: &str) -> crate::Result<()> {
        self.alert(alert, Some(ack_url)).await
    }

    async fn send_acknowledgement(&self, ack: &Acknowledgement) -> crate::Result<()> {
        let title = format!("[ACKNOWLEDGED] {}", ack.subject);
        self.post(Message {
            title: &title,
            message: &render_acknowledgement(ack),
            priority: QUIET_PRIORITY,
            url: None,
        })
        .await
    }
}
