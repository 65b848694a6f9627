//! Configuration types for the vigil service

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Global engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_check_interval", with = "humantime_serde")]
    pub check_interval: Duration,
    #[serde(default = "default_threshold", with = "humantime_serde")]
    pub default_threshold: Duration,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default)]
    pub acknowledgements: AcknowledgementConfig,
    #[serde(default)]
    pub status_report: StatusReportConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            default_threshold: default_threshold(),
            history_size: default_history_size(),
            acknowledgements: AcknowledgementConfig::default(),
            status_report: StatusReportConfig::default(),
        }
    }
}

impl Settings {
    /// Replace zero intervals with their defaults.
    ///
    /// Tickers need a non-zero period, so a zero interval is treated as a
    /// configuration mistake rather than a reason to stop.
    pub fn sanitize(&mut self) {
        if self.check_interval.is_zero() {
            tracing::warn!(
                "check_interval must be non-zero, using {:?}",
                default_check_interval()
            );
            self.check_interval = default_check_interval();
        }
        if self.status_report.interval.is_zero() {
            tracing::warn!(
                "status_report.interval must be non-zero, using {:?}",
                default_report_interval()
            );
            self.status_report.interval = default_report_interval();
        }
    }
}

/// Acknowledgement link settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgementConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Externally reachable base URL used to build acknowledgement links
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default = "default_token_ttl", with = "humantime_serde")]
    pub token_ttl: Duration,
}

impl Default for AcknowledgementConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            public_url: default_public_url(),
            token_ttl: default_token_ttl(),
        }
    }
}

impl AcknowledgementConfig {
    /// Build the acknowledgement URL for a token
    pub fn ack_url(&self, token: &str) -> String {
        format!("{}/ack/{}", self.public_url.trim_end_matches('/'), token)
    }
}

/// Periodic status report settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReportConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_report_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// Channel names that receive the report
    #[serde(default)]
    pub alerts: Vec<String>,
}

impl Default for StatusReportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_report_interval(),
            alerts: Vec::new(),
        }
    }
}

/// A monitored target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    /// Check strategy name: "http", "tcp" or "webhook"
    #[serde(rename = "type", default = "default_check_type")]
    pub check_type: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Accepted status code patterns ("200", "2**", "200-399", "*")
    #[serde(default)]
    pub status_codes: Vec<String>,
    #[serde(default, with = "humantime_serde")]
    pub threshold: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub size_alert: SizeAlertConfig,
    /// Channel names notified for this target
    #[serde(default)]
    pub alerts: Vec<String>,
}

pub const WEBHOOK_CHECK_TYPE: &str = "webhook";

impl TargetConfig {
    pub fn is_webhook(&self) -> bool {
        self.check_type == WEBHOOK_CHECK_TYPE
    }

    /// Threshold for this target, falling back to the global default
    pub fn threshold_or(&self, default: Duration) -> Duration {
        self.threshold.unwrap_or(default)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or_else(default_check_timeout)
    }

    /// Human readable address shown in alerts and the status API
    pub fn address(&self) -> Option<String> {
        if let Some(url) = &self.url {
            return Some(url.clone());
        }
        self.host.as_ref().map(|host| {
            if self.ports.is_empty() {
                host.clone()
            } else {
                let ports: Vec<String> = self.ports.iter().map(|p| p.to_string()).collect();
                format!("{}:{}", host, ports.join(","))
            }
        })
    }
}

/// Response size drift alerting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeAlertConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_size_history")]
    pub history_size: usize,
    #[serde(default = "default_size_threshold_percent")]
    pub threshold_percent: f64,
}

impl Default for SizeAlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            history_size: default_size_history(),
            threshold_percent: default_size_threshold_percent(),
        }
    }
}

impl SizeAlertConfig {
    pub fn threshold_fraction(&self) -> f64 {
        self.threshold_percent / 100.0
    }
}

/// Notifier configuration with tagged enum for extensibility
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotifierConfig {
    #[serde(rename = "console")]
    Console {
        #[serde(default)]
        name: Option<String>,
    },
    #[serde(rename = "slack")]
    Slack {
        #[serde(default)]
        name: Option<String>,
        webhook_url: String,
        #[serde(default)]
        channel: Option<String>,
    },
    #[serde(rename = "webhook")]
    Webhook {
        #[serde(default)]
        name: Option<String>,
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    #[serde(rename = "pushover")]
    Pushover {
        #[serde(default)]
        name: Option<String>,
        api_token: String,
        user_key: String,
        #[serde(default = "default_pushover_title")]
        default_title: String,
        #[serde(default)]
        default_priority: i8,
        #[serde(default = "default_pushover_sound")]
        default_sound: String,
    },
    #[serde(rename = "email")]
    Email {
        #[serde(default)]
        name: Option<String>,
        smtp_host: String,
        #[serde(default = "default_smtp_port")]
        smtp_port: u16,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        from: String,
        to: Vec<String>,
        #[serde(default = "default_true")]
        starttls: bool,
    },
    #[serde(rename = "file")]
    File {
        #[serde(default)]
        name: Option<String>,
        path: PathBuf,
    },
}

impl NotifierConfig {
    pub fn type_name(&self) -> &str {
        match self {
            NotifierConfig::Console { .. } => "console",
            NotifierConfig::Slack { .. } => "slack",
            NotifierConfig::Webhook { .. } => "webhook",
            NotifierConfig::Pushover { .. } => "pushover",
            NotifierConfig::Email { .. } => "email",
            NotifierConfig::File { .. } => "file",
        }
    }

    /// Channel name referenced by targets; defaults to the type name
    pub fn name(&self) -> &str {
        let name = match self {
            NotifierConfig::Console { name }
            | NotifierConfig::Slack { name, .. }
            | NotifierConfig::Webhook { name, .. }
            | NotifierConfig::Pushover { name, .. }
            | NotifierConfig::Email { name, .. }
            | NotifierConfig::File { name, .. } => name,
        };
        name.as_deref().unwrap_or_else(|| self.type_name())
    }
}

/// A named inbound hook route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    pub name: String,
    #[serde(default = "default_hook_methods")]
    pub methods: Vec<String>,
    /// Bearer token required in the Authorization header
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_hook_template")]
    pub message_template: String,
    #[serde(default)]
    pub alerts: Vec<String>,
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_server_port(),
        }
    }
}

fn default_check_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_threshold() -> Duration {
    Duration::from_secs(30)
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_history_size() -> usize {
    100
}

fn default_public_url() -> String {
    format!("http://localhost:{}", default_server_port())
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_report_interval() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_check_type() -> String {
    "http".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_size_history() -> usize {
    10
}

fn default_size_threshold_percent() -> f64 {
    50.0
}

fn default_pushover_title() -> String {
    "Vigil Alert".to_string()
}

fn default_pushover_sound() -> String {
    "pushover".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_hook_methods() -> Vec<String> {
    vec!["POST".to_string()]
}

fn default_hook_template() -> String {
    "Hook {hook_name} received".to_string()
}

fn default_true() -> bool {
    true
}

fn default_server_port() -> u16 {
    8080
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::VigilError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let mut config: Config = serde_json::from_str(&content)?;
    config.settings.sanitize();
    Ok(config)
}

const ENV_PREFIX: &str = "env:";

fn resolve_secret(value: &mut String) -> crate::Result<()> {
    if let Some(var) = value.strip_prefix(ENV_PREFIX) {
        let resolved = std::env::var(var).map_err(|_| {
            crate::VigilError::Config(format!("Environment variable '{}' is not set", var))
        })?;
        *value = resolved;
    }
    Ok(())
}

impl Config {
    /// Replace `env:NAME` secret references with the environment variable value
    pub fn resolve_secrets(&mut self) -> crate::Result<()> {
        for notifier in &mut self.notifiers {
            match notifier {
                NotifierConfig::Slack { webhook_url, .. } => resolve_secret(webhook_url)?,
                NotifierConfig::Webhook { headers, .. } => {
                    for value in headers.values_mut() {
                        resolve_secret(value)?;
                    }
                }
                NotifierConfig::Pushover {
                    api_token,
                    user_key,
                    ..
                } => {
                    resolve_secret(api_token)?;
                    resolve_secret(user_key)?;
                }
                NotifierConfig::Email { password, .. } => {
                    if let Some(password) = password {
                        resolve_secret(password)?;
                    }
                }
                NotifierConfig::Console { .. } | NotifierConfig::File { .. } => {}
            }
        }
        for hook in &mut self.hooks {
            if let Some(token) = &mut hook.token {
                resolve_secret(token)?;
            }
        }
        Ok(())
    }
}
