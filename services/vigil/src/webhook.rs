//! Generic JSON webhook channel

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::io::{HttpClient, HttpRequest, DELIVERY_TIMEOUT};
use crate::notifier::{AckNotifier, Acknowledgement, Alert, AllClear, Event, Notifier};
use crate::report::StatusReportData;

/// Posts every notification as a JSON [`Event`]
pub struct WebhookNotifier {
    name: String,
    url: String,
    headers: BTreeMap<String, String>,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("name", &self.name)
            .field("url", &self.url)
            .finish()
    }
}

impl WebhookNotifier {
    pub fn new(
        name: &str,
        url: &str,
        headers: BTreeMap<String, String>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            headers,
            http,
        }
    }

    async fn post(&self, event: Event<'_>) -> crate::Result<()> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !self
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"))
        {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        let request = HttpRequest {
            method: "POST".to_string(),
            url: self.url.clone(),
            headers,
            body: Some(serde_json::to_string(&event)?),
            timeout: DELIVERY_TIMEOUT,
        };
        let response = self.http.send(&request).await?;
        if !response.is_success() {
            return Err(crate::VigilError::Notifier(format!(
                "Webhook {} returned status {}",
                self.url, response.status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        "webhook"
    }

    async fn send_alert(&self, alert: &Alert) -> crate::Result<()> {
        self.post(Event::Alert {
            alert,
            ack_url: None,
        })
        .await
    }

    async fn send_all_clear(&self, all_clear: &AllClear) -> crate::Result<()> {
        self.post(Event::AllClear { all_clear }).await
    }

    async fn send_status_report(&self, report: &StatusReportData) -> crate::Result<()> {
        self.post(Event::StatusReport { report }).await
    }

    fn acknowledgements(&self) -> Option<&dyn AckNotifier> {
        Some(self)
    }
}

#[async_trait]
impl AckNotifier for WebhookNotifier {
    async fn send_alert_with_ack(&self, alert: &Alert, ack_url: &str) -> crate::Result<()> {
        self.post(Event::Alert {
            alert,
            ack_url: Some(ack_url),
        })
        .await
    }

    async fn send_acknowledgement(&self, ack: &Acknowledgement) -> crate::Result<()> {
        self.post(Event::Acknowledgement {
            acknowledgement: ack,
        })
        .await
    }
}
