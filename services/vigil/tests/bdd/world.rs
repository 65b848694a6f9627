//! BDD test world for the vigil service

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cucumber::World;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use vigil::check::CheckRegistry;
use vigil::config::{Config, TargetConfig};
use vigil::engine::{Engine, TargetStatus};
use vigil::io::ReqwestHttpClient;
use vigil::notifier::{AckNotifier, Acknowledgement, Alert, AllClear, Notifier};
use vigil::report::StatusReportData;

/// What the recording channel received
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Alert { target: String, ack_url: Option<String> },
    AllClear { target: String },
    Acknowledgement { subject: String, by: String },
    StatusReport,
}

/// A channel that keeps everything it is asked to deliver
#[derive(Debug, Default)]
pub struct RecordingChannel {
    pub deliveries: RwLock<Vec<Delivery>>,
}

impl RecordingChannel {
    pub async fn count(&self, matches: impl Fn(&Delivery) -> bool) -> usize {
        self.deliveries.read().await.iter().filter(|d| matches(d)).count()
    }
}

#[async_trait]
impl Notifier for RecordingChannel {
    fn name(&self) -> &str {
        "ops"
    }

    fn type_name(&self) -> &str {
        "recording"
    }

    async fn send_alert(&self, alert: &Alert) -> vigil::Result<()> {
        self.deliveries.write().await.push(Delivery::Alert {
            target: alert.target.clone(),
            ack_url: None,
        });
        Ok(())
    }

    async fn send_all_clear(&self, all_clear: &AllClear) -> vigil::Result<()> {
        self.deliveries.write().await.push(Delivery::AllClear {
            target: all_clear.target.clone(),
        });
        Ok(())
    }

    async fn send_status_report(&self, _report: &StatusReportData) -> vigil::Result<()> {
        self.deliveries.write().await.push(Delivery::StatusReport);
        Ok(())
    }

    fn acknowledgements(&self) -> Option<&dyn AckNotifier> {
        Some(self)
    }
}

#[async_trait]
impl AckNotifier for RecordingChannel {
    async fn send_alert_with_ack(&self, alert: &Alert, ack_url: &str) -> vigil::Result<()> {
        self.deliveries.write().await.push(Delivery::Alert {
            target: alert.target.clone(),
            ack_url: Some(ack_url.to_string()),
        });
        Ok(())
    }

    async fn send_acknowledgement(&self, ack: &Acknowledgement) -> vigil::Result<()> {
        self.deliveries.write().await.push(Delivery::Acknowledgement {
            subject: ack.subject.clone(),
            by: ack.acknowledged_by.clone(),
        });
        Ok(())
    }
}

#[derive(Debug, Default, World)]
pub struct VigilWorld {
    pub targets: Vec<serde_json::Value>,
    pub acknowledgements: bool,
    pub engine: Option<Arc<Engine>>,
    pub channel: Arc<RecordingChannel>,

    pub ack_token: Option<String>,
    pub last_error: Option<vigil::VigilError>,
}

impl VigilWorld {
    /// Build the engine from the accumulated configuration on first use
    pub fn engine(&mut self) -> Arc<Engine> {
        if let Some(engine) = &self.engine {
            return Arc::clone(engine);
        }
        let config: Config = serde_json::from_value(serde_json::json!({
            "settings": {
                "check_interval": "5s",
                "acknowledgements": {
                    "enabled": self.acknowledgements,
                    "public_url": "https://vigil.example"
                }
            },
            "targets": self.targets,
            "notifiers": [{"type": "console", "name": "ops"}],
            "server": {"enabled": false}
        }))
        .expect("valid test config");

        let checks = CheckRegistry::with_defaults(Arc::new(ReqwestHttpClient::new()));
        let channel: Arc<dyn Notifier> = self.channel.clone();
        let engine = Engine::build(&config, &checks, vec![channel], CancellationToken::new());
        self.engine = Some(Arc::clone(&engine));
        engine
    }

    pub fn target_config(&self, name: &str) -> TargetConfig {
        let json = self
            .targets
            .iter()
            .find(|t| t["name"] == name)
            .cloned()
            .expect("target configured");
        serde_json::from_value(json).expect("valid target config")
    }

    pub async fn status(&mut self, name: &str) -> TargetStatus {
        self.engine()
            .status()
            .await
            .into_iter()
            .find(|t| t.name == name)
            .expect("target known to the engine")
    }
}

/// Fixed origin for scenarios that drive time by hand
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .expect("valid timestamp")
}
