//! Webhook-driven targets
//!
//! A virtual target has no check loop. External systems mark it down with a
//! trigger and either resolve it explicitly or let it recover after a
//! duration. Each trigger with a duration cancels the pending recovery and
//! schedules a new one, so only the latest deadline can fire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::notifier::{Alert, AlertKind, AllClear};
use crate::policy::{apply_trigger, Transition};
use crate::state::{Clock, Health, Recovery, SharedState, StateHandle};
use crate::VigilError;

const DEFAULT_TRIGGER_MESSAGE: &str = "Triggered via webhook";

/// Result of a trigger request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerOutcome {
    pub target: String,
    pub health: Health,
    pub new_incident: bool,
    /// An alert was dispatched for this trigger
    pub alerted: bool,
    pub failure_count: u32,
    pub ack_token: Option<String>,
    pub ack_url: Option<String>,
    pub recovery_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct PendingRecovery {
    id: u64,
    cancel: CancellationToken,
}

/// Trigger and resolve webhook targets, owning their recovery timers
#[derive(Debug, Clone)]
pub struct VirtualTargets {
    state: StateHandle,
    dispatcher: Dispatcher,
    timers: Arc<Mutex<HashMap<String, PendingRecovery>>>,
    next_id: Arc<AtomicU64>,
    clock: Clock,
    cancel: CancellationToken,
}

fn webhook_target<'a>(
    state: &'a mut SharedState,
    name: &str,
) -> crate::Result<&'a mut crate::state::TargetState> {
    let target = state
        .target_mut(name)
        .ok_or_else(|| VigilError::NotFound(name.to_string()))?;
    if !target.virtual_target {
        return Err(VigilError::NotWebhookTarget(name.to_string()));
    }
    Ok(target)
}

impl VirtualTargets {
    pub fn new(
        state: StateHandle,
        dispatcher: Dispatcher,
        clock: Clock,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            dispatcher,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            clock,
            cancel,
        }
    }

    /// Mark a webhook target down.
    ///
    /// A new incident alerts immediately. A re-trigger counts as another
    /// failure and is subject to backoff and acknowledgement. A non-zero
    /// `duration` (re)schedules automatic recovery.
    pub async fn trigger(
        &self,
        name: &str,
        message: Option<String>,
        duration: Option<Duration>,
        now: DateTime<Utc>,
    ) -> crate::Result<TriggerOutcome> {
        let duration = duration.filter(|d| !d.is_zero());
        let message = message.unwrap_or_else(|| DEFAULT_TRIGGER_MESSAGE.to_string());

        let mut state = self.state.write().await;
        let target = webhook_target(&mut state, name)?;

        let transition = apply_trigger(target, now);
        target.message = Some(message.clone());
        let recovery_time = match duration {
            Some(after) => {
                let deadline = chrono::Duration::from_std(after)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                target.recovery_time = Some(deadline);
                Some(deadline)
            }
            None => target.recovery_time,
        };
        let (alert, new_incident) = match transition {
            Transition::Failing { alert, new_incident } => (alert, new_incident),
            _ => (false, false),
        };
        let health = target.health();
        let failure_count = target.failure_count;
        let channels = target.alerts.clone();
        let pending_alert = alert.then(|| Alert {
            target: name.to_string(),
            address: None,
            kind: AlertKind::Down,
            message: message.clone(),
            failure_count,
            down_since: target.down_since,
            status_code: None,
            timestamp: now,
        });

        let ack_token = if self.dispatcher.acks_enabled() {
            state.ensure_target_token(name, now)
        } else {
            None
        };
        // The timer that wins the map must match the deadline written above,
        // so concurrent triggers schedule in the order they hold the state lock
        if let (Some(after), Some(deadline)) = (duration, recovery_time) {
            self.schedule_recovery(name, deadline, after).await;
        }
        drop(state);

        if new_incident {
            tracing::info!("Webhook target '{}' triggered: {}", name, message);
        } else {
            tracing::debug!("Webhook target '{}' re-triggered ({} failures)", name, failure_count);
        }

        if let Some(alert) = &pending_alert {
            self.dispatcher
                .send_alert(&channels, alert, ack_token.as_deref())
                .await;
        }

        Ok(TriggerOutcome {
            target: name.to_string(),
            health,
            new_incident,
            alerted: pending_alert.is_some(),
            failure_count,
            ack_url: ack_token.as_deref().map(|t| self.dispatcher.ack_url(t)),
            ack_token,
            recovery_time,
        })
    }

    /// Manually recover a webhook target. Returns `None` if it was not down.
    pub async fn resolve(&self, name: &str, now: DateTime<Utc>) -> crate::Result<Option<Recovery>> {
        let mut state = self.state.write().await;
        let target = webhook_target(&mut state, name)?;
        let recovery = target.recover(now);
        let channels = target.alerts.clone();
        drop(state);

        if let Some(pending) = self.timers.lock().await.remove(name) {
            pending.cancel.cancel();
        }

        if let Some(recovery) = recovery {
            tracing::info!("Webhook target '{}' resolved", name);
            self.send_all_clear(name, &channels, recovery).await;
        }
        Ok(recovery)
    }

    /// Number of pending recovery timers
    pub async fn pending(&self) -> usize {
        self.timers.lock().await.len()
    }

    async fn schedule_recovery(&self, name: &str, deadline: DateTime<Utc>, after: Duration) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.cancel.child_token();

        let previous = self.timers.lock().await.insert(
            name.to_string(),
            PendingRecovery {
                id,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        tracing::debug!("Webhook target '{}' recovers at {}", name, deadline);
        let this = self.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(after) => this.expire(&name, deadline, id).await,
            }
        });
    }

    async fn expire(&self, name: &str, deadline: DateTime<Utc>, id: u64) {
        {
            let mut timers = self.timers.lock().await;
            if timers.get(name).is_some_and(|p| p.id == id) {
                timers.remove(name);
            }
        }

        let mut state = self.state.write().await;
        let Some(target) = state.target_mut(name) else {
            return;
        };
        // A later trigger or a manual resolve moved the deadline
        if !target.is_down || target.recovery_time != Some(deadline) {
            return;
        }
        let recovery = target.recover(self.clock.now());
        let channels = target.alerts.clone();
        drop(state);

        if let Some(recovery) = recovery {
            tracing::info!("Webhook target '{}' recovered automatically", name);
            self.send_all_clear(name, &channels, recovery).await;
        }
    }

    async fn send_all_clear(&self, name: &str, channels: &[String], recovery: Recovery) {
        let all_clear = AllClear {
            target: name.to_string(),
            address: None,
            down_since: Some(recovery.down_since),
            down_for: recovery.down_for,
            timestamp: recovery.at,
        };
        self.dispatcher.send_all_clear(channels, &all_clear).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AcknowledgementConfig, TargetConfig};
    use crate::notifier::testing::{RecordingNotifier, Sent};
    use crate::notifier::Notifier;
    use crate::state::{new_state_handle, TargetState};

    struct Fixture {
        targets: VirtualTargets,
        state: StateHandle,
        channel: Arc<RecordingNotifier>,
    }

    fn fixture(acks_enabled: bool) -> Fixture {
        let deploy: TargetConfig = serde_json::from_value(serde_json::json!({
            "name": "deploy",
            "type": "webhook",
            "alerts": ["slack"]
        }))
        .unwrap();
        let api: TargetConfig =
            serde_json::from_value(serde_json::json!({"name": "api", "url": "http://x"})).unwrap();
        let state = new_state_handle(
            vec![
                TargetState::new(&deploy, Duration::from_secs(300)),
                TargetState::new(&api, Duration::from_secs(300)),
            ],
            50,
            Duration::from_secs(3600),
            Utc::now(),
        );
        let channel = Arc::new(RecordingNotifier::new("slack"));
        let notifiers: Vec<Arc<dyn Notifier>> = vec![channel.clone()];
        let acks = AcknowledgementConfig {
            enabled: acks_enabled,
            ..AcknowledgementConfig::default()
        };
        let dispatcher = Dispatcher::new(notifiers, acks, state.clone());
        Fixture {
            targets: VirtualTargets::new(
                state.clone(),
                dispatcher,
                Clock::new(),
                CancellationToken::new(),
            ),
            state,
            channel,
        }
    }

    #[tokio::test]
    async fn unknown_and_polled_targets_are_rejected() {
        let f = fixture(false);
        let err = f
            .targets
            .trigger("nope", None, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, VigilError::NotFound(_)));

        let err = f
            .targets
            .trigger("api", None, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, VigilError::NotWebhookTarget(_)));
        assert!(!f.state.read().await.target("api").unwrap().is_down);
    }

    #[tokio::test]
    async fn first_trigger_alerts_immediately_despite_threshold() {
        let f = fixture(true);
        let outcome = f
            .targets
            .trigger("deploy", Some("build broke".to_string()), None, Utc::now())
            .await
            .unwrap();

        assert!(outcome.new_incident);
        assert!(outcome.alerted);
        assert_eq!(outcome.health, Health::Down);
        let token = outcome.ack_token.clone().unwrap();
        assert_eq!(
            outcome.ack_url.as_deref(),
            Some(format!("http://localhost:8080/ack/{}", token).as_str())
        );
        assert_eq!(
            f.channel.sent().await,
            vec![Sent::Alert("deploy".to_string(), outcome.ack_url.clone())]
        );
        let state = f.state.read().await;
        let target = state.target("deploy").unwrap();
        assert_eq!(target.message.as_deref(), Some("build broke"));
        assert_eq!(target.current_ack_token.as_deref(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn retrigger_keeps_token_and_respects_backoff() {
        let f = fixture(true);
        let now = Utc::now();
        let first = f.targets.trigger("deploy", None, None, now).await.unwrap();
        let second = f
            .targets
            .trigger("deploy", None, None, now + chrono::Duration::seconds(1))
            .await
            .unwrap();

        assert!(!second.new_incident);
        assert!(!second.alerted);
        assert_eq!(second.failure_count, 2);
        assert_eq!(first.ack_token, second.ack_token);
        assert_eq!(f.channel.alerts().await, 1);

        let third = f
            .targets
            .trigger("deploy", None, None, now + chrono::Duration::seconds(11))
            .await
            .unwrap();
        assert!(third.alerted);
        assert_eq!(f.channel.alerts().await, 2);
    }

    #[tokio::test]
    async fn acknowledged_retrigger_does_not_alert() {
        let f = fixture(true);
        let now = Utc::now();
        let first = f.targets.trigger("deploy", None, None, now).await.unwrap();
        f.state
            .write()
            .await
            .acknowledge(first.ack_token.as_deref().unwrap(), "alice", None, now)
            .unwrap();

        let later = f
            .targets
            .trigger("deploy", None, None, now + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(!later.alerted);
        assert_eq!(later.health, Health::Acknowledged);
        assert_eq!(f.channel.alerts().await, 1);
    }

    #[tokio::test]
    async fn resolve_sends_all_clear_and_resets() {
        let f = fixture(true);
        let now = Utc::now();
        f.targets.trigger("deploy", None, None, now).await.unwrap();

        let recovery = f
            .targets
            .resolve("deploy", now + chrono::Duration::seconds(90))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recovery.down_for, Duration::from_secs(90));
        assert!(f
            .channel
            .sent()
            .await
            .contains(&Sent::AllClear("deploy".to_string())));

        let state = f.state.read().await;
        let target = state.target("deploy").unwrap();
        assert!(!target.is_down);
        assert_eq!(target.current_ack_token, None);
        assert_eq!(target.message, None);
        drop(state);

        assert!(f.targets.resolve("deploy", now).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn duration_recovers_automatically() {
        let f = fixture(false);
        let outcome = f
            .targets
            .trigger("deploy", None, Some(Duration::from_secs(60)), Utc::now())
            .await
            .unwrap();
        assert!(outcome.recovery_time.is_some());
        assert_eq!(f.targets.pending().await, 1);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(f.state.read().await.target("deploy").unwrap().is_down);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!f.state.read().await.target("deploy").unwrap().is_down);
        assert_eq!(f.targets.pending().await, 0);
        assert!(f
            .channel
            .sent()
            .await
            .contains(&Sent::AllClear("deploy".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn retrigger_extends_recovery() {
        let f = fixture(false);
        let start = Utc::now();
        f.targets
            .trigger("deploy", None, Some(Duration::from_secs(60)), start)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        let extended = f
            .targets
            .trigger(
                "deploy",
                None,
                Some(Duration::from_secs(60)),
                start + chrono::Duration::seconds(30),
            )
            .await
            .unwrap();
        assert_eq!(
            extended.recovery_time,
            Some(start + chrono::Duration::seconds(90))
        );

        // The first deadline passes without recovering
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(f.state.read().await.target("deploy").unwrap().is_down);
        assert_eq!(f.targets.pending().await, 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(!f.state.read().await.target("deploy").unwrap().is_down);
        let all_clears = f
            .channel
            .sent()
            .await
            .into_iter()
            .filter(|s| matches!(s, Sent::AllClear(_)))
            .count();
        assert_eq!(all_clears, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_triggers_leave_a_timer_for_the_final_deadline() {
        let f = fixture(false);
        let mut handles = Vec::new();
        for i in 0..16u64 {
            let targets = f.targets.clone();
            handles.push(tokio::spawn(async move {
                targets
                    .trigger(
                        "deploy",
                        None,
                        Some(Duration::from_millis(50 + i * 5)),
                        Utc::now(),
                    )
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(f.targets.pending().await, 1);

        // Every deadline is at most 125ms away
        tokio::time::sleep(Duration::from_millis(500)).await;
        let state = f.state.read().await;
        let target = state.target("deploy").unwrap();
        assert!(!target.is_down);
        assert_eq!(target.recovery_time, None);
        drop(state);
        assert_eq!(f.targets.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_cancels_pending_recovery() {
        let f = fixture(false);
        let now = Utc::now();
        f.targets
            .trigger("deploy", None, Some(Duration::from_secs(60)), now)
            .await
            .unwrap();
        f.targets.resolve("deploy", now).await.unwrap();
        assert_eq!(f.targets.pending().await, 0);

        // A new incident without a duration must not be recovered by the old timer
        f.targets.trigger("deploy", None, None, now).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(f.state.read().await.target("deploy").unwrap().is_down);
    }
}
