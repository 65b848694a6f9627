//! BDD step definitions for the acknowledgement feature

use cucumber::{given, then, when};

use vigil::VigilError;

use crate::world::{Delivery, VigilWorld};

#[given(expr = "a webhook target {string} with acknowledgements enabled")]
fn webhook_target(world: &mut VigilWorld, name: String) {
    world.acknowledgements = true;
    world.targets.push(serde_json::json!({
        "name": name,
        "type": "webhook",
        "alerts": ["ops"]
    }));
}

#[when(expr = "the incident is acknowledged by {string}")]
async fn acknowledge_incident(world: &mut VigilWorld, by: String) {
    let token = world.ack_token.clone().expect("an acknowledgement token");
    if let Err(e) = world.engine().acknowledge(&token, &by, None).await {
        world.last_error = Some(e);
    }
}

#[when(expr = "token {string} is acknowledged by {string}")]
async fn acknowledge_token(world: &mut VigilWorld, token: String, by: String) {
    if let Err(e) = world.engine().acknowledge(&token, &by, None).await {
        world.last_error = Some(e);
    }
}

#[then(expr = "{int} acknowledgement notice(s) has/have been sent")]
async fn acknowledgements_sent(world: &mut VigilWorld, expected: usize) {
    let sent = world
        .channel
        .count(|d| matches!(d, Delivery::Acknowledgement { .. }))
        .await;
    assert_eq!(sent, expected);
}

#[then(expr = "target {string} is acknowledged by {string}")]
async fn acknowledged_by(world: &mut VigilWorld, name: String, by: String) {
    let status = world.status(&name).await;
    assert!(status.is_down);
    assert_eq!(status.acknowledged_by.as_deref(), Some(by.as_str()));
}

#[then("the alert carried an acknowledgement link")]
async fn alert_has_link(world: &mut VigilWorld) {
    let deliveries = world.channel.deliveries.read().await;
    let link = deliveries.iter().find_map(|d| match d {
        Delivery::Alert { ack_url, .. } => ack_url.clone(),
        _ => None,
    });
    let token = world.ack_token.as_deref().expect("an acknowledgement token");
    assert_eq!(link, Some(format!("https://vigil.example/ack/{}", token)));
}

#[then("the acknowledgement is rejected as having no active incident")]
fn rejected_no_incident(world: &mut VigilWorld) {
    assert!(matches!(
        world.last_error,
        Some(VigilError::NoActiveIncident)
    ));
}

#[then("the acknowledgement is rejected as unknown")]
fn rejected_unknown(world: &mut VigilWorld) {
    assert!(matches!(world.last_error, Some(VigilError::UnknownToken)));
}
