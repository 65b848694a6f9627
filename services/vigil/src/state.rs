//! Shared state for target health, acknowledgements and delivery history

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::ack::AckRegistry;
use crate::check::CheckResult;
use crate::config::TargetConfig;
use crate::notifier::NotificationRecord;

/// Coarse health of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Down,
    Acknowledged,
}

/// Summary of the most recent check, kept for the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSummary {
    pub healthy: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub response_size: u64,
    pub error: Option<String>,
}

impl CheckSummary {
    pub fn new(result: &CheckResult, healthy: bool) -> Self {
        Self {
            healthy,
            status_code: result.status_code,
            response_time_ms: result.response_time.as_millis() as u64,
            response_size: result.response_size,
            error: result.error.clone(),
        }
    }
}

/// A resolved outage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recovery {
    pub at: DateTime<Utc>,
    pub down_since: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub down_for: Duration,
}

/// Health record of one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetState {
    pub name: String,
    pub address: Option<String>,
    /// Webhook targets are driven by triggers instead of checks
    pub virtual_target: bool,
    #[serde(with = "humantime_serde")]
    pub threshold: Duration,
    /// Channel names alerted for this target
    pub alerts: Vec<String>,

    pub is_down: bool,
    pub down_since: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub last_alert_time: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub acknowledgement_note: Option<String>,
    pub current_ack_token: Option<String>,
    pub size_history: VecDeque<u64>,
    pub recovery_time: Option<DateTime<Utc>>,
    pub message: Option<String>,

    pub last_check: Option<DateTime<Utc>>,
    pub last_result: Option<CheckSummary>,
    pub last_recovery: Option<Recovery>,
    /// Recent recoveries, oldest first, bounded by `RECOVERY_HISTORY`
    pub recoveries: VecDeque<Recovery>,
}

/// Recoveries kept per target for status reports
pub const RECOVERY_HISTORY: usize = 64;

impl TargetState {
    pub fn new(config: &TargetConfig, default_threshold: Duration) -> Self {
        Self {
            name: config.name.clone(),
            address: config.address(),
            virtual_target: config.is_webhook(),
            threshold: config.threshold_or(default_threshold),
            alerts: config.alerts.clone(),
            is_down: false,
            down_since: None,
            failure_count: 0,
            last_alert_time: None,
            acknowledged_at: None,
            acknowledged_by: None,
            acknowledgement_note: None,
            current_ack_token: None,
            size_history: VecDeque::with_capacity(config.size_alert.history_size),
            recovery_time: None,
            message: None,
            last_check: None,
            last_result: None,
            last_recovery: None,
            recoveries: VecDeque::new(),
        }
    }

    pub fn health(&self) -> Health {
        match (self.is_down, self.acknowledged_at.is_some()) {
            (false, _) => Health::Healthy,
            (true, false) => Health::Down,
            (true, true) => Health::Acknowledged,
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }

    /// How long the current incident has lasted
    pub fn down_for(&self, now: DateTime<Utc>) -> Duration {
        self.down_since
            .map(|since| elapsed(since, now))
            .unwrap_or_default()
    }

    /// Enter the down state with a fresh incident
    pub fn start_incident(&mut self, now: DateTime<Utc>) {
        self.is_down = true;
        self.down_since = Some(now);
        self.failure_count = 1;
        self.last_alert_time = None;
    }

    /// Reset every incident field to its healthy default.
    ///
    /// Returns the resolved outage, or `None` if the target was not down.
    pub fn recover(&mut self, now: DateTime<Utc>) -> Option<Recovery> {
        if !self.is_down {
            return None;
        }
        let down_since = self.down_since.unwrap_or(now);
        let recovery = Recovery {
            at: now,
            down_since,
            down_for: elapsed(down_since, now),
        };

        self.is_down = false;
        self.down_since = None;
        self.failure_count = 0;
        self.last_alert_time = None;
        self.acknowledged_at = None;
        self.acknowledged_by = None;
        self.acknowledgement_note = None;
        self.current_ack_token = None;
        self.recovery_time = None;
        self.message = None;
        self.last_recovery = Some(recovery);
        if self.recoveries.len() >= RECOVERY_HISTORY {
            self.recoveries.pop_front();
        }
        self.recoveries.push_back(recovery);
        Some(recovery)
    }
}

/// Non-negative wall-clock time between two instants
pub fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

/// Wall-clock timestamps that advance with the tokio clock.
///
/// Timestamps never go backwards when the system clock is adjusted, and
/// follow paused time in tests.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    instant: tokio::time::Instant,
    time: DateTime<Utc>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            instant: tokio::time::Instant::now(),
            time: Utc::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.instant.elapsed())
            .ok()
            .and_then(|d| self.time.checked_add_signed(d))
            .unwrap_or_else(Utc::now)
    }
}

/// Delivery counters, drained by each status report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCounters {
    pub alerts_sent: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
}

impl DeliveryCounters {
    /// Return the current counts and reset them
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// Shared state accessible by the engine and the HTTP API
#[derive(Debug)]
pub struct SharedState {
    pub targets: Vec<TargetState>,
    pub registry: AckRegistry,
    pub counters: DeliveryCounters,
    pub history: VecDeque<NotificationRecord>,
    pub history_max_size: usize,
    pub last_report_at: DateTime<Utc>,
}

impl SharedState {
    /// `started_at` opens the first status report window
    pub fn new(
        targets: Vec<TargetState>,
        history_max_size: usize,
        token_ttl: Duration,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            targets,
            registry: AckRegistry::new(token_ttl),
            counters: DeliveryCounters::default(),
            history: VecDeque::with_capacity(history_max_size),
            history_max_size,
            last_report_at: started_at,
        }
    }

    pub fn target(&self, name: &str) -> Option<&TargetState> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn target_mut(&mut self, name: &str) -> Option<&mut TargetState> {
        self.targets.iter_mut().find(|t| t.name == name)
    }

    /// Add a notification to history
    pub fn add_notification(&mut self, record: NotificationRecord) {
        if self.history_max_size == 0 {
            return;
        }
        if self.history.len() >= self.history_max_size {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}

/// Thread-safe shared state handle
pub type StateHandle = Arc<RwLock<SharedState>>;

pub fn new_state_handle(
    targets: Vec<TargetState>,
    history_max_size: usize,
    token_ttl: Duration,
    started_at: DateTime<Utc>,
) -> StateHandle {
    Arc::new(RwLock::new(SharedState::new(
        targets,
        history_max_size,
        token_ttl,
        started_at,
    )))
}
