//! BDD step definitions for webhook-triggered targets

use std::time::Duration;

use cucumber::{then, when};

use vigil::VigilError;

use crate::world::VigilWorld;

async fn trigger(
    world: &mut VigilWorld,
    name: &str,
    message: Option<String>,
    duration: Option<Duration>,
) {
    match world.engine().trigger(name, message, duration).await {
        Ok(outcome) => {
            if outcome.ack_token.is_some() {
                world.ack_token = outcome.ack_token;
            }
        }
        Err(e) => world.last_error = Some(e),
    }
}

#[when(expr = "target {string} is triggered with message {string}")]
async fn triggered_with_message(world: &mut VigilWorld, name: String, message: String) {
    trigger(world, &name, Some(message), None).await;
}

#[when(expr = "target {string} is triggered for {int} second(s)")]
async fn triggered_for(world: &mut VigilWorld, name: String, seconds: u64) {
    trigger(world, &name, None, Some(Duration::from_secs(seconds))).await;
}

#[when(expr = "target {string} is resolved")]
async fn resolved(world: &mut VigilWorld, name: String) {
    if let Err(e) = world.engine().resolve(&name).await {
        world.last_error = Some(e);
    }
}

#[when(expr = "{int} milliseconds pass")]
async fn time_passes(_world: &mut VigilWorld, millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[then(expr = "target {string} has a pending recovery")]
async fn pending_recovery(world: &mut VigilWorld, name: String) {
    assert!(world.status(&name).await.recovery_time.is_some());
}

#[then(expr = "the trigger is rejected because {string} is not a webhook target")]
fn rejected_not_webhook(world: &mut VigilWorld, name: String) {
    match &world.last_error {
        Some(VigilError::NotWebhookTarget(target)) => assert_eq!(target, &name),
        other => panic!("expected NotWebhookTarget, got {:?}", other),
    }
}
