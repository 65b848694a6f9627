//! Delivery of notifications to channels
//!
//! The dispatcher is only ever called after the state lock has been
//! released. It takes the lock again briefly afterwards to record history
//! and counters.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::config::AcknowledgementConfig;
use crate::notifier::{
    render_acknowledgement, render_all_clear, render_alert, render_status_report,
    Acknowledgement, Alert, AllClear, DeliveryKind, NotificationRecord, Notifier,
};
use crate::report::StatusReportData;
use crate::state::StateHandle;

#[derive(Clone)]
pub struct Dispatcher {
    notifiers: Arc<HashMap<String, Arc<dyn Notifier>>>,
    acks: AcknowledgementConfig,
    state: StateHandle,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut channels: Vec<&String> = self.notifiers.keys().collect();
        channels.sort();
        f.debug_struct("Dispatcher")
            .field("channels", &channels)
            .field("acknowledgements", &self.acks.enabled)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(
        notifiers: Vec<Arc<dyn Notifier>>,
        acks: AcknowledgementConfig,
        state: StateHandle,
    ) -> Self {
        let notifiers = notifiers
            .into_iter()
            .map(|n| (n.name().to_string(), n))
            .collect();
        Self {
            notifiers: Arc::new(notifiers),
            acks,
            state,
        }
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.notifiers.contains_key(name)
    }

    pub fn acks_enabled(&self) -> bool {
        self.acks.enabled
    }

    /// Public acknowledgement link for a token
    pub fn ack_url(&self, token: &str) -> String {
        self.acks.ack_url(token)
    }

    fn channels<'a>(
        &'a self,
        names: &'a [String],
    ) -> impl Iterator<Item = (&'a String, &'a Arc<dyn Notifier>)> + 'a {
        names.iter().filter_map(move |name| {
            let notifier = self.notifiers.get(name);
            if notifier.is_none() {
                tracing::warn!("Unknown notification channel '{}'", name);
            }
            notifier.map(|n| (name, n))
        })
    }

    /// Deliver an alert, with an acknowledgement link where the channel supports one
    pub async fn send_alert(&self, channels: &[String], alert: &Alert, ack_token: Option<&str>) {
        let ack_url = ack_token
            .filter(|_| self.acks.enabled)
            .map(|token| self.ack_url(token));
        let message = render_alert(alert, ack_url.as_deref());

        let mut records = Vec::new();
        for (name, notifier) in self.channels(channels) {
            tracing::debug!("Dispatching alert to '{}' for '{}'", name, alert.target);
            let result = match (&ack_url, notifier.acknowledgements()) {
                (Some(url), Some(ack)) => ack.send_alert_with_ack(alert, url).await,
                _ => notifier.send_alert(alert).await,
            };
            records.push(record(&alert.target, name, DeliveryKind::Alert, &message, result));
        }
        self.record(records, true).await;
    }

    pub async fn send_all_clear(&self, channels: &[String], all_clear: &AllClear) {
        let message = render_all_clear(all_clear);
        let mut records = Vec::new();
        for (name, notifier) in self.channels(channels) {
            let result = notifier.send_all_clear(all_clear).await;
            records.push(record(
                &all_clear.target,
                name,
                DeliveryKind::AllClear,
                &message,
                result,
            ));
        }
        self.record(records, false).await;
    }

    /// Only acknowledgement-aware channels receive the confirmation
    pub async fn send_acknowledgement(&self, channels: &[String], ack: &Acknowledgement) {
        let message = render_acknowledgement(ack);
        let mut records = Vec::new();
        for (name, notifier) in self.channels(channels) {
            let Some(aware) = notifier.acknowledgements() else {
                tracing::debug!("Channel '{}' does not take acknowledgements", name);
                continue;
            };
            let result = aware.send_acknowledgement(ack).await;
            records.push(record(
                &ack.subject,
                name,
                DeliveryKind::Acknowledgement,
                &message,
                result,
            ));
        }
        self.record(records, false).await;
    }

    /// Returns the number of channels that accepted the report
    pub async fn send_status_report(
        &self,
        channels: &[String],
        report: &StatusReportData,
    ) -> usize {
        let message = render_status_report(report);
        let mut records = Vec::new();
        for (name, notifier) in self.channels(channels) {
            let result = notifier.send_status_report(report).await;
            records.push(record(
                "status-report",
                name,
                DeliveryKind::StatusReport,
                &message,
                result,
            ));
        }
        let delivered = records.iter().filter(|r| r.success).count();
        self.record(records, false).await;
        delivered
    }

    async fn record(&self, records: Vec<NotificationRecord>, alert: bool) {
        let mut state = self.state.write().await;
        // An alert counts once if any channel took it
        if alert && records.iter().any(|r| r.success) {
            state.counters.alerts_sent += 1;
        }
        for record in records {
            if record.success {
                state.counters.notifications_sent += 1;
            } else {
                state.counters.notifications_failed += 1;
            }
            state.add_notification(record);
        }
    }
}

fn record(
    target: &str,
    channel: &str,
    kind: DeliveryKind,
    message: &str,
    result: crate::Result<()>,
) -> NotificationRecord {
    if let Err(e) = &result {
        tracing::warn!(
            "Notification via '{}' for '{}' failed: {}",
            channel,
            target,
            e
        );
    }
    NotificationRecord {
        target: target.to_string(),
        channel: channel.to_string(),
        kind,
        message: message.to_string(),
        success: result.is_ok(),
        error: result.err().map(|e| e.to_string()),
        timestamp_epoch_ms: Utc::now().timestamp_millis(),
    }
}
