//! Named inbound hooks
//!
//! A hook is an HTTP route that turns an arbitrary JSON payload into an
//! alert on its configured channels. Hook alerts can be acknowledged like
//! target alerts, but they have no down state and never recover.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::ack::{AckSubject, HookIncident};
use crate::config::HookConfig;
use crate::dispatch::Dispatcher;
use crate::notifier::{Alert, AlertKind};
use crate::state::StateHandle;
use crate::VigilError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap_or_else(|e| unreachable!("invalid pattern: {e}"))
});

/// Replace `{field}` placeholders with top-level payload fields.
///
/// `{hook_name}` always resolves to the hook name. Unknown placeholders are
/// left as they are.
pub fn render_template(template: &str, hook_name: &str, payload: &serde_json::Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            if key == "hook_name" {
                return hook_name.to_string();
            }
            match payload.get(key) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => caps[0].to_string(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

/// Result of a hook delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookReceipt {
    pub hook: String,
    pub message: String,
    pub channels: Vec<String>,
    pub ack_token: Option<String>,
    pub ack_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HookRouter {
    hooks: HashMap<String, HookConfig>,
    state: StateHandle,
    dispatcher: Dispatcher,
}

impl HookRouter {
    pub fn new(hooks: Vec<HookConfig>, state: StateHandle, dispatcher: Dispatcher) -> Self {
        let hooks = hooks.into_iter().map(|h| (h.name.clone(), h)).collect();
        Self {
            hooks,
            state,
            dispatcher,
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hooks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Handle one inbound request for hook `name`
    pub async fn receive(
        &self,
        name: &str,
        method: &str,
        authorization: Option<&str>,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> crate::Result<HookReceipt> {
        let hook = self
            .hooks
            .get(name)
            .ok_or_else(|| VigilError::HookNotFound(name.to_string()))?;

        if !hook.methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
            return Err(VigilError::MethodNotAllowed {
                hook: name.to_string(),
                method: method.to_string(),
            });
        }

        if let Some(expected) = &hook.token {
            let presented = authorization.and_then(|h| h.strip_prefix("Bearer "));
            if presented != Some(expected.as_str()) {
                tracing::warn!("Rejected unauthorized request to hook '{}'", name);
                return Err(VigilError::Unauthorized(name.to_string()));
            }
        }

        let message = render_template(&hook.message_template, name, payload);
        tracing::info!("Hook '{}' received: {}", name, message);

        let ack_token = if self.dispatcher.acks_enabled() {
            let incident = HookIncident {
                hook_name: name.to_string(),
                message: message.clone(),
                triggered_at: now,
                alerts: hook.alerts.clone(),
                acknowledged_at: None,
                acknowledged_by: None,
                note: None,
            };
            Some(
                self.state
                    .write()
                    .await
                    .issue_token(AckSubject::Hook(incident), now),
            )
        } else {
            None
        };

        let alert = Alert {
            target: name.to_string(),
            address: None,
            kind: AlertKind::Hook,
            message: message.clone(),
            failure_count: 0,
            down_since: None,
            status_code: None,
            timestamp: now,
        };
        self.dispatcher
            .send_alert(&hook.alerts, &alert, ack_token.as_deref())
            .await;

        Ok(HookReceipt {
            hook: name.to_string(),
            message,
            channels: hook.alerts.clone(),
            ack_url: ack_token.as_deref().map(|t| self.dispatcher.ack_url(t)),
            ack_token,
        })
    }
}
