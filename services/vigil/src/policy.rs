//! Alert policy: threshold suppression, exponential backoff and the
//! per-target state machine.
//!
//! Everything here is a pure function of a [`TargetState`] and a timestamp so
//! the policy can be tested without running the scheduler. Callers hold the
//! shared state write lock while applying a transition, which makes the
//! decision and the `last_alert_time` update a single critical section.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::state::{elapsed, Recovery, TargetState};

/// Backoff after the first alert of an incident
pub const BASE_BACKOFF: Duration = Duration::from_secs(5);

/// Minimum spacing between alerts: `5 * 2^(n-1)` seconds, saturating.
pub fn backoff(failure_count: u32) -> Duration {
    let exponent = failure_count.saturating_sub(1);
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    Duration::from_secs(BASE_BACKOFF.as_secs().saturating_mul(factor))
}

/// Whether an alert for the current incident may be sent at `now`.
///
/// Acknowledged and healthy targets never alert. Until the first alert has
/// gone out the threshold applies; afterwards the backoff for the current
/// failure count does.
pub fn should_alert(state: &TargetState, now: DateTime<Utc>) -> bool {
    if !state.is_down || state.is_acknowledged() {
        return false;
    }
    match (state.last_alert_time, state.down_since) {
        (Some(last), _) => elapsed(last, now) >= backoff(state.failure_count),
        (None, Some(since)) => elapsed(since, now) >= state.threshold,
        (None, None) => false,
    }
}

/// Result of applying one check outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Healthy and still healthy
    Unchanged,
    /// Failing; `alert` is true when an alert must be dispatched now
    Failing { alert: bool, new_incident: bool },
    /// Was down, now healthy
    Recovered(Recovery),
}

/// Apply a check outcome to a polled target.
///
/// When the returned transition asks for an alert, `last_alert_time` has
/// already been set to `now`.
pub fn apply_outcome(state: &mut TargetState, success: bool, now: DateTime<Utc>) -> Transition {
    match (success, state.is_down) {
        (true, false) => Transition::Unchanged,
        (true, true) => match state.recover(now) {
            Some(recovery) => Transition::Recovered(recovery),
            None => Transition::Unchanged,
        },
        (false, false) => {
            state.start_incident(now);
            let alert = mark_if_due(state, now);
            Transition::Failing {
                alert,
                new_incident: true,
            }
        }
        (false, true) => {
            // Backoff is computed from the count before this failure.
            let alert = mark_if_due(state, now);
            state.failure_count = state.failure_count.saturating_add(1);
            Transition::Failing {
                alert,
                new_incident: false,
            }
        }
    }
}

/// Apply an explicit trigger to a webhook target.
///
/// A new incident alerts immediately; a re-trigger of an ongoing incident
/// counts as another failure and goes through the normal policy.
pub fn apply_trigger(state: &mut TargetState, now: DateTime<Utc>) -> Transition {
    if state.is_down {
        return apply_outcome(state, false, now);
    }
    state.start_incident(now);
    state.last_alert_time = Some(now);
    Transition::Failing {
        alert: true,
        new_incident: true,
    }
}

fn mark_if_due(state: &mut TargetState, now: DateTime<Utc>) -> bool {
    let due = should_alert(state, now);
    if due {
        state.last_alert_time = Some(now);
    }
    due
}
