//! HTTP API: webhook targets, acknowledgements, hooks, status and reports

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::ack::AckView;
use crate::engine::Engine;
use crate::state::Recovery;
use crate::VigilError;

const ANONYMOUS: &str = "anonymous";

impl IntoResponse for VigilError {
    fn into_response(self) -> Response {
        let status = match &self {
            VigilError::NotFound(_) | VigilError::HookNotFound(_) | VigilError::UnknownToken => {
                StatusCode::NOT_FOUND
            }
            VigilError::NotWebhookTarget(_)
            | VigilError::Json(_)
            | VigilError::ReportsDisabled
            | VigilError::NoReportChannels => StatusCode::BAD_REQUEST,
            VigilError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            VigilError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            VigilError::NoActiveIncident => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the API router around a running engine
pub fn build_router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/api/targets/{name}/trigger", post(trigger_handler))
        .route("/api/targets/{name}/resolve", post(resolve_handler))
        .route("/ack/{token}", get(ack_view_handler).post(ack_handler))
        .route("/api/status", get(status_handler))
        .route("/api/history", get(history_handler))
        .route("/api/reports", post(report_handler))
        .route("/hooks/{name}", any(hook_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Parse an optional JSON body; an empty body yields the default
fn optional_json<T: serde::de::DeserializeOwned + Default>(body: &Bytes) -> crate::Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}

#[derive(Debug, Default, Deserialize)]
struct TriggerRequest {
    message: Option<String>,
    duration_seconds: Option<u64>,
}

async fn trigger_handler(
    State(engine): State<Arc<Engine>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, VigilError> {
    let request: TriggerRequest = optional_json(&body)?;
    let outcome = engine
        .trigger(
            &name,
            request.message,
            request.duration_seconds.map(Duration::from_secs),
        )
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    target: String,
    recovered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    recovery: Option<Recovery>,
}

async fn resolve_handler(
    State(engine): State<Arc<Engine>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, VigilError> {
    let recovery = engine.resolve(&name).await?;
    Ok(Json(ResolveResponse {
        target: name,
        recovered: recovery.is_some(),
        recovery,
    }))
}

async fn ack_view_handler(
    State(engine): State<Arc<Engine>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, VigilError> {
    Ok(Json(engine.ack_view(&token).await?))
}

#[derive(Debug, Default, Deserialize)]
struct AckRequest {
    by: Option<String>,
    note: Option<String>,
}

#[derive(Debug, Serialize)]
struct AckResponse {
    first_acknowledgement: bool,
    #[serde(flatten)]
    incident: AckView,
}

async fn ack_handler(
    State(engine): State<Arc<Engine>>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, VigilError> {
    let request: AckRequest = optional_json(&body)?;
    let by = request
        .by
        .filter(|by| !by.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string());
    let outcome = engine.acknowledge(&token, &by, request.note).await?;
    Ok(Json(AckResponse {
        first_acknowledgement: !outcome.already_acknowledged(),
        incident: outcome.view,
    }))
}

async fn status_handler(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(engine.status().await)
}

async fn history_handler(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(engine.history().await)
}

async fn report_handler(
    State(engine): State<Arc<Engine>>,
) -> Result<impl IntoResponse, VigilError> {
    Ok(Json(engine.generate_report().await?))
}

/// Hook payloads are JSON when they parse, otherwise the raw text under `body`
fn hook_payload(body: &Bytes) -> serde_json::Value {
    if body.is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_slice(body).unwrap_or_else(|_| {
        serde_json::json!({ "body": String::from_utf8_lossy(body) })
    })
}

async fn hook_handler(
    State(engine): State<Arc<Engine>>,
    Path(name): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, VigilError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let receipt = engine
        .receive_hook(&name, method.as_str(), authorization, &hook_payload(&body))
        .await?;
    Ok(Json(receipt))
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}
