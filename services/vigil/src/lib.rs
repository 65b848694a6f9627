//! Vigil - target monitoring and alerting service
//!
//! Probes HTTP and TCP targets on a schedule, tracks incidents per target,
//! and alerts through configured channels with backoff, acknowledgements
//! and periodic status reports.

pub mod ack;
pub mod check;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod email;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod file_log;
pub mod hooks;
pub mod io;
pub mod notifier;
pub mod policy;
pub mod pushover;
pub mod report;
pub mod server;
pub mod slack;
pub mod state;
pub mod virtual_target;
pub mod webhook;

pub use config::{load_config, Config};
pub use error::{Result, VigilError};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::check::CheckRegistry;
use crate::config::NotifierConfig;
use crate::console::ConsoleNotifier;
use crate::email::{EmailNotifier, SmtpSettings};
use crate::engine::Engine;
use crate::file_log::FileNotifier;
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::notifier::Notifier;
use crate::pushover::PushoverNotifier;
use crate::slack::SlackNotifier;
use crate::webhook::WebhookNotifier;

/// Instantiate the configured channels.
///
/// A channel that cannot be built is skipped with a warning, as is a
/// second channel with an already used name.
pub fn build_notifiers(
    configs: &[NotifierConfig],
    http: Arc<dyn HttpClient>,
) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
    for config in configs {
        let name = config.name();
        if notifiers.iter().any(|n| n.name() == name) {
            tracing::warn!("Duplicate channel name '{}', skipping it", name);
            continue;
        }
        let notifier: Arc<dyn Notifier> = match config {
            NotifierConfig::Console { .. } => Arc::new(ConsoleNotifier::new(name)),
            NotifierConfig::Slack {
                webhook_url,
                channel,
                ..
            } => Arc::new(SlackNotifier::new(
                name,
                webhook_url,
                channel.clone(),
                Arc::clone(&http),
            )),
            NotifierConfig::Webhook { url, headers, .. } => Arc::new(WebhookNotifier::new(
                name,
                url,
                headers.clone(),
                Arc::clone(&http),
            )),
            NotifierConfig::Pushover {
                api_token,
                user_key,
                default_title,
                default_priority,
                default_sound,
                ..
            } => Arc::new(PushoverNotifier::new(
                name,
                api_token,
                user_key,
                default_title,
                *default_priority,
                default_sound,
                Arc::clone(&http),
            )),
            NotifierConfig::Email {
                smtp_host,
                smtp_port,
                username,
                password,
                from,
                to,
                starttls,
                ..
            } => {
                let smtp = SmtpSettings {
                    host: smtp_host.clone(),
                    port: *smtp_port,
                    username: username.clone(),
                    password: password.clone(),
                    starttls: *starttls,
                };
                match EmailNotifier::new(name, smtp, from, to) {
                    Ok(email) => Arc::new(email),
                    Err(e) => {
                        tracing::warn!("Skipping email channel '{}': {}", name, e);
                        continue;
                    }
                }
            }
            NotifierConfig::File { path, .. } => Arc::new(FileNotifier::new(name, path)),
        };
        tracing::debug!("Configured {} channel '{}'", notifier.type_name(), name);
        notifiers.push(notifier);
    }
    notifiers
}

/// Run the vigil service with the given configuration until ctrl-c
pub async fn run(config: Config) -> Result<()> {
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let cancel = CancellationToken::new();

    let checks = CheckRegistry::with_defaults(Arc::clone(&http));
    let notifiers = build_notifiers(&config.notifiers, Arc::clone(&http));
    let engine = Engine::build(&config, &checks, notifiers, cancel.clone());

    // Setup shutdown handler
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
        }
        cancel_for_signal.cancel();
    });

    if config.server.enabled {
        let port = config.server.port;
        let router = server::build_router(Arc::clone(&engine));
        let cancel_for_server = cancel.clone();

        tokio::spawn(async move {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!(
                        "Failed to bind API server to port {}: {}. Continuing without it.",
                        port,
                        e
                    );
                    return;
                }
            };
            tracing::info!("API listening on http://{}", addr);

            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    cancel_for_server.cancelled().await;
                })
                .await
                .ok();

            tracing::debug!("API server stopped");
        });
    }

    tracing::info!("Vigil engine started");
    engine.run().await;
    tracing::info!("Vigil engine stopped");

    Ok(())
}
