//! BDD step definitions for the alerting feature

use std::time::Duration;

use cucumber::{given, then, when};

use vigil::check::CheckResult;

use crate::world::{at, Delivery, VigilWorld};

#[given(expr = "an http target {string} with a threshold of {string}")]
fn http_target(world: &mut VigilWorld, name: String, threshold: String) {
    world.targets.push(serde_json::json!({
        "name": name,
        "type": "http",
        "url": "http://127.0.0.1:9/health",
        "status_codes": ["2**"],
        "threshold": threshold,
        "alerts": ["ops"]
    }));
}

#[when(expr = "target {string} fails at second {int}")]
async fn target_fails(world: &mut VigilWorld, name: String, second: i64) {
    let config = world.target_config(&name);
    let result = CheckResult::failed("connection refused", Duration::from_millis(3));
    world
        .engine()
        .process_result(&config, result, at(second))
        .await;
}

#[when(expr = "target {string} returns status {int} at second {int}")]
async fn target_returns(world: &mut VigilWorld, name: String, status: u16, second: i64) {
    let config = world.target_config(&name);
    let result = CheckResult {
        success: true,
        status_code: Some(status),
        response_time: Duration::from_millis(12),
        response_size: 512,
        error: None,
        content_type: Some("application/json".to_string()),
        response_body: None,
    };
    world
        .engine()
        .process_result(&config, result, at(second))
        .await;
}

#[then("no alerts have been sent")]
async fn no_alerts(world: &mut VigilWorld) {
    let alerts = world
        .channel
        .count(|d| matches!(d, Delivery::Alert { .. }))
        .await;
    assert_eq!(alerts, 0);
}

#[then(expr = "{int} alert(s) has/have been sent for {string}")]
async fn alerts_sent(world: &mut VigilWorld, expected: usize, name: String) {
    let alerts = world
        .channel
        .count(|d| matches!(d, Delivery::Alert { target, .. } if *target == name))
        .await;
    assert_eq!(alerts, expected);
}

#[then(expr = "an all-clear has been sent for {string}")]
async fn all_clear_sent(world: &mut VigilWorld, name: String) {
    let all_clears = world
        .channel
        .count(|d| matches!(d, Delivery::AllClear { target } if *target == name))
        .await;
    assert_eq!(all_clears, 1);
}

#[then(expr = "target {string} is down")]
async fn target_is_down(world: &mut VigilWorld, name: String) {
    assert!(world.status(&name).await.is_down);
}

#[then(expr = "target {string} is healthy with no failures")]
async fn target_is_healthy(world: &mut VigilWorld, name: String) {
    let status = world.status(&name).await;
    assert!(!status.is_down);
    assert_eq!(status.failure_count, 0);
    assert!(status.down_since.is_none());
    assert!(status.acknowledged_by.is_none());
}
