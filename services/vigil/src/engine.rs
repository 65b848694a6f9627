//! Engine: schedules checks, drives target state and dispatches notifications

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::ack::{AckOutcome, AckView};
use crate::check::{Check, CheckRegistry, CheckResult};
use crate::config::{Config, HookConfig, Settings, TargetConfig};
use crate::dispatch::Dispatcher;
use crate::evaluator::{detect_size_drift, evaluate, previous_mean};
use crate::hooks::{HookReceipt, HookRouter};
use crate::notifier::{Alert, AlertKind, AllClear, NotificationRecord, Notifier};
use crate::policy::{apply_outcome, Transition};
use crate::report::{build_report, report_loop, StatusReportData};
use crate::state::{
    new_state_handle, CheckSummary, Clock, Health, Recovery, StateHandle, TargetState,
};
use crate::virtual_target::{TriggerOutcome, VirtualTargets};
use crate::VigilError;

/// A polled target and the check that probes it
#[derive(Debug)]
struct PolledTarget {
    config: TargetConfig,
    check: Arc<dyn Check>,
}

/// Per-target status exposed by the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStatus {
    pub name: String,
    pub address: Option<String>,
    pub webhook: bool,
    pub health: Health,
    pub is_down: bool,
    pub down_since: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub acknowledged_by: Option<String>,
    pub message: Option<String>,
    pub recovery_time: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    pub last_result: Option<CheckSummary>,
    pub last_recovery: Option<Recovery>,
}

impl From<&TargetState> for TargetStatus {
    fn from(t: &TargetState) -> Self {
        Self {
            name: t.name.clone(),
            address: t.address.clone(),
            webhook: t.virtual_target,
            health: t.health(),
            is_down: t.is_down,
            down_since: t.down_since,
            failure_count: t.failure_count,
            acknowledged_by: t.acknowledged_by.clone(),
            message: t.message.clone(),
            recovery_time: t.recovery_time,
            last_check: t.last_check,
            last_result: t.last_result.clone(),
            last_recovery: t.last_recovery,
        }
    }
}

/// The engine owns the shared state and everything that mutates it
pub struct Engine {
    settings: Settings,
    polled: Vec<PolledTarget>,
    report_channels: Vec<String>,
    state: StateHandle,
    dispatcher: Dispatcher,
    virtual_targets: VirtualTargets,
    hooks: HookRouter,
    clock: Clock,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("polled", &self.polled.len())
            .field("dispatcher", &self.dispatcher)
            .field("hooks", &self.hooks.names())
            .finish()
    }
}

/// Keep only channel names that resolve to a configured notifier
fn known_channels(owner: &str, names: &[String], channels: &HashSet<String>) -> Vec<String> {
    names
        .iter()
        .filter(|name| {
            let known = channels.contains(name.as_str());
            if !known {
                tracing::warn!("'{}' refers to unknown channel '{}', skipping it", owner, name);
            }
            known
        })
        .cloned()
        .collect()
}

impl Engine {
    /// Build an engine from configuration.
    ///
    /// Targets with an unknown check type or incomplete settings, duplicate
    /// target names and unknown channel names are skipped with a warning.
    pub fn build(
        config: &Config,
        checks: &CheckRegistry,
        notifiers: Vec<Arc<dyn Notifier>>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let mut settings = config.settings.clone();
        settings.sanitize();
        let mut polled = Vec::new();
        let mut states = Vec::new();
        let mut seen = HashSet::new();
        let channels: HashSet<String> = notifiers.iter().map(|n| n.name().to_string()).collect();

        for target in &config.targets {
            if !seen.insert(target.name.clone()) {
                tracing::warn!("Duplicate target '{}', skipping it", target.name);
                continue;
            }
            let mut target = target.clone();
            target.alerts = known_channels(&target.name, &target.alerts, &channels);

            if !target.is_webhook() {
                let Some(check) = checks.get(&target.check_type) else {
                    tracing::warn!(
                        "Target '{}' has unknown check type '{}', skipping it",
                        target.name,
                        target.check_type
                    );
                    continue;
                };
                if let Err(e) = check.validate(&target) {
                    tracing::warn!("Skipping target '{}': {}", target.name, e);
                    continue;
                }
                polled.push(PolledTarget {
                    config: target.clone(),
                    check,
                });
            }
            states.push(TargetState::new(&target, settings.default_threshold));
        }

        let hooks: Vec<HookConfig> = config
            .hooks
            .iter()
            .cloned()
            .map(|mut hook| {
                hook.alerts = known_channels(&hook.name, &hook.alerts, &channels);
                hook
            })
            .collect();
        let report_channels =
            known_channels("status_report", &settings.status_report.alerts, &channels);

        let clock = Clock::new();
        let state = new_state_handle(
            states,
            settings.history_size,
            settings.acknowledgements.token_ttl,
            clock.now(),
        );
        let dispatcher = Dispatcher::new(
            notifiers,
            settings.acknowledgements.clone(),
            Arc::clone(&state),
        );

        tracing::debug!(
            "Engine built: {} polled targets, {} hooks",
            polled.len(),
            hooks.len()
        );

        Arc::new(Self {
            virtual_targets: VirtualTargets::new(
                Arc::clone(&state),
                dispatcher.clone(),
                clock,
                cancel.clone(),
            ),
            hooks: HookRouter::new(hooks, Arc::clone(&state), dispatcher.clone()),
            settings,
            polled,
            report_channels,
            state,
            dispatcher,
            clock,
            cancel,
        })
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// Run every check loop and the report loop. Returns once cancelled.
    pub async fn run(self: Arc<Self>) {
        let mut handles = Vec::new();

        for index in 0..self.polled.len() {
            let engine = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                engine.check_loop(index).await;
            }));
        }

        if self.settings.status_report.enabled {
            let engine = Arc::clone(&self);
            let interval = self.settings.status_report.interval;
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                report_loop(engine, interval, cancel).await;
            }));
        }

        tracing::info!("Engine started with {} check loops", self.polled.len());
        self.cancel.cancelled().await;

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Engine task ended abnormally: {}", e);
            }
        }
        tracing::info!("Engine stopped");
    }

    async fn check_loop(&self, index: usize) {
        let Some(target) = self.polled.get(index) else {
            return;
        };
        let name = &target.config.name;
        let mut ticker = tokio::time::interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = probe(target) => result,
            };
            self.process_result(&target.config, result, self.clock.now()).await;
        }
        tracing::debug!("Check loop for '{}' cancelled", name);
    }

    /// Apply one check result to the target's state and send what it calls for
    pub async fn process_result(
        &self,
        config: &TargetConfig,
        result: CheckResult,
        now: DateTime<Utc>,
    ) -> Transition {
        let healthy = evaluate(config, &result);

        let mut state = self.state.write().await;
        let Some(target) = state.target_mut(&config.name) else {
            return Transition::Unchanged;
        };

        target.last_check = Some(now);
        target.last_result = Some(CheckSummary::new(&result, healthy));

        let size = &config.size_alert;
        let size_changed = healthy
            && result.response_size > 0
            && detect_size_drift(
                &mut target.size_history,
                result.response_size,
                size.enabled,
                size.history_size,
                size.threshold_fraction(),
            );
        let size_alert = size_changed.then(|| Alert {
            target: config.name.clone(),
            address: target.address.clone(),
            kind: AlertKind::SizeChange,
            message: format!(
                "Response size changed to {} bytes (recent average {:.0} bytes)",
                result.response_size,
                previous_mean(&target.size_history).unwrap_or_default()
            ),
            failure_count: 0,
            down_since: None,
            status_code: result.status_code,
            timestamp: now,
        });

        let transition = apply_outcome(target, healthy, now);
        let channels = target.alerts.clone();

        let mut down_alert = None;
        let mut all_clear = None;
        match transition {
            Transition::Failing { alert, new_incident } => {
                if new_incident {
                    tracing::info!("Target '{}' is down: {}", config.name, failure_reason(&result));
                }
                if alert {
                    down_alert = Some(Alert {
                        target: config.name.clone(),
                        address: target.address.clone(),
                        kind: AlertKind::Down,
                        message: failure_reason(&result),
                        failure_count: target.failure_count,
                        down_since: target.down_since,
                        status_code: result.status_code,
                        timestamp: now,
                    });
                }
            }
            Transition::Recovered(recovery) => {
                tracing::info!(
                    "Target '{}' recovered after {:?}",
                    config.name,
                    recovery.down_for
                );
                all_clear = Some(AllClear {
                    target: config.name.clone(),
                    address: target.address.clone(),
                    down_since: Some(recovery.down_since),
                    down_for: recovery.down_for,
                    timestamp: now,
                });
            }
            Transition::Unchanged => {}
        }

        let ack_token = match &down_alert {
            Some(_) if self.dispatcher.acks_enabled() => {
                state.ensure_target_token(&config.name, now)
            }
            _ => None,
        };
        drop(state);

        if let Some(alert) = &down_alert {
            self.dispatcher
                .send_alert(&channels, alert, ack_token.as_deref())
                .await;
        }
        if let Some(all_clear) = &all_clear {
            self.dispatcher.send_all_clear(&channels, all_clear).await;
        }
        if let Some(alert) = &size_alert {
            tracing::info!("Target '{}': {}", config.name, alert.message);
            self.dispatcher.send_alert(&channels, alert, None).await;
        }

        transition
    }

    /// Acknowledge the incident behind `token` and notify ack-aware channels once
    pub async fn acknowledge(
        &self,
        token: &str,
        by: &str,
        note: Option<String>,
    ) -> crate::Result<AckOutcome> {
        let outcome = self
            .state
            .write()
            .await
            .acknowledge(token, by, note, self.clock.now())?;

        if let Some(ack) = &outcome.acknowledgement {
            self.dispatcher
                .send_acknowledgement(&outcome.channels, ack)
                .await;
        }
        Ok(outcome)
    }

    pub async fn ack_view(&self, token: &str) -> crate::Result<AckView> {
        self.state.read().await.ack_view(token)
    }

    pub async fn trigger(
        &self,
        name: &str,
        message: Option<String>,
        duration: Option<Duration>,
    ) -> crate::Result<TriggerOutcome> {
        self.virtual_targets
            .trigger(name, message, duration, self.clock.now())
            .await
    }

    pub async fn resolve(&self, name: &str) -> crate::Result<Option<Recovery>> {
        self.virtual_targets.resolve(name, self.clock.now()).await
    }

    pub async fn receive_hook(
        &self,
        name: &str,
        method: &str,
        authorization: Option<&str>,
        payload: &serde_json::Value,
    ) -> crate::Result<HookReceipt> {
        self.hooks
            .receive(name, method, authorization, payload, self.clock.now())
            .await
    }

    pub async fn status(&self) -> Vec<TargetStatus> {
        let state = self.state.read().await;
        state.targets.iter().map(TargetStatus::from).collect()
    }

    pub async fn history(&self) -> Vec<NotificationRecord> {
        self.state.read().await.history.iter().cloned().collect()
    }

    /// Build a report over the window since the previous one and send it.
    ///
    /// Delivery counters are drained into the report.
    pub async fn generate_report(&self) -> crate::Result<StatusReportData> {
        if !self.settings.status_report.enabled {
            return Err(VigilError::ReportsDisabled);
        }
        if self.report_channels.is_empty() {
            return Err(VigilError::NoReportChannels);
        }

        let report = {
            let mut state = self.state.write().await;
            let end = self.clock.now();
            let counters = state.counters.take();
            let report = build_report(state.last_report_at, end, &state.targets, counters);
            state.last_report_at = end;
            report
        };

        let delivered = self
            .dispatcher
            .send_status_report(&self.report_channels, &report)
            .await;
        tracing::debug!(
            "Status report delivered to {}/{} channels",
            delivered,
            self.report_channels.len()
        );
        Ok(report)
    }
}

/// Run one check, bounded by the target's timeout
async fn probe(target: &PolledTarget) -> CheckResult {
    let timeout = target.config.timeout();
    let started = tokio::time::Instant::now();
    match tokio::time::timeout(timeout, target.check.check(&target.config)).await {
        Ok(result) => result,
        Err(_) => CheckResult::failed(format!("timed out after {:?}", timeout), started.elapsed()),
    }
}

fn failure_reason(result: &CheckResult) -> String {
    match (&result.error, result.status_code) {
        (Some(error), _) => error.clone(),
        (None, Some(code)) => format!("Unexpected status code {}", code),
        (None, None) => "Check failed".to_string(),
    }
}
