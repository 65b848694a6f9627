//! Status report aggregation

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::state::{elapsed, DeliveryCounters, TargetState};

/// A target that is down at the end of the reporting window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveOutage {
    pub target: String,
    pub down_since: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub down_for: Duration,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
}

/// An outage that ended inside the reporting window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOutage {
    pub target: String,
    #[serde(with = "humantime_serde")]
    pub down_for: Duration,
    pub recovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReportData {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub active_outages: Vec<ActiveOutage>,
    pub resolved_outages: Vec<ResolvedOutage>,
    pub alerts_sent: u64,
    pub notifications_sent: u64,
}

/// Snapshot of the target states over `[start, end)`
pub fn build_report(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    targets: &[TargetState],
    counters: DeliveryCounters,
) -> StatusReportData {
    let active_outages = targets
        .iter()
        .filter(|t| t.is_down)
        .filter_map(|t| {
            let down_since = t.down_since?;
            Some(ActiveOutage {
                target: t.name.clone(),
                down_since,
                down_for: elapsed(down_since, end),
                acknowledged: t.is_acknowledged(),
                acknowledged_by: t.acknowledged_by.clone(),
            })
        })
        .collect();

    let resolved_outages = targets
        .iter()
        .flat_map(|t| t.recoveries.iter().map(move |r| (t, r)))
        .filter(|(_, r)| r.at >= start && r.at < end)
        .map(|(t, r)| ResolvedOutage {
            target: t.name.clone(),
            down_for: r.down_for,
            recovered_at: r.at,
        })
        .collect();

    StatusReportData {
        period_start: start,
        period_end: end,
        active_outages,
        resolved_outages,
        alerts_sent: counters.alerts_sent,
        notifications_sent: counters.notifications_sent,
    }
}

/// Send a report every `interval` until cancelled
pub async fn report_loop(engine: Arc<Engine>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Report loop cancelled");
                break;
            }
            _ = ticker.tick() => {
                match engine.generate_report().await {
                    Ok(report) => tracing::info!(
                        "Status report sent: {} active, {} resolved",
                        report.active_outages.len(),
                        report.resolved_outages.len()
                    ),
                    Err(e) => tracing::warn!("Status report failed: {}", e),
                }
            }
        }
    }
}
