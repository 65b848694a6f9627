//! Check strategies: one probe against a target
//!
//! A check never fails with an error for ordinary network problems; transport
//! failures are folded into a failed [`CheckResult`] carrying the error text.
//! Whether a result counts as healthy is decided by the evaluator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::config::TargetConfig;
use crate::io::{HttpClient, HttpRequest};

/// Maximum number of response body bytes kept for alert context
const BODY_EXCERPT_LEN: usize = 512;

/// Raw outcome of a single probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// The probe reached the target at the transport level
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_time: Duration,
    pub response_size: u64,
    pub error: Option<String>,
    pub content_type: Option<String>,
    pub response_body: Option<String>,
}

impl CheckResult {
    pub fn failed(error: impl Into<String>, response_time: Duration) -> Self {
        Self {
            success: false,
            status_code: None,
            response_time,
            response_size: 0,
            error: Some(error.into()),
            content_type: None,
            response_body: None,
        }
    }
}

/// A probe strategy selected by configuration name
#[async_trait]
pub trait Check: Send + Sync + std::fmt::Debug {
    /// Configuration name of this strategy (e.g. "http")
    fn type_name(&self) -> &str;

    /// Probe the target once
    async fn check(&self, target: &TargetConfig) -> CheckResult;

    /// Validate that the target carries what this strategy needs
    fn validate(&self, target: &TargetConfig) -> crate::Result<()>;
}

/// HTTP request check
pub struct HttpCheck {
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for HttpCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCheck").finish()
    }
}

impl HttpCheck {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_LEN {
        return body.to_string();
    }
    let mut end = BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[async_trait]
impl Check for HttpCheck {
    fn type_name(&self) -> &str {
        "http"
    }

    async fn check(&self, target: &TargetConfig) -> CheckResult {
        let Some(url) = &target.url else {
            return CheckResult::failed("target has no url", Duration::ZERO);
        };

        let request = HttpRequest {
            method: target.method.clone(),
            url: url.clone(),
            headers: target
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            body: None,
            timeout: target.timeout(),
        };

        let start = Instant::now();
        match self.http.send(&request).await {
            Ok(response) => CheckResult {
                success: true,
                status_code: Some(response.status),
                response_time: start.elapsed(),
                response_size: response.body.len() as u64,
                error: None,
                content_type: response.content_type,
                response_body: Some(excerpt(&response.body)),
            },
            Err(e) => {
                tracing::debug!("HTTP check for '{}' failed: {}", target.name, e);
                CheckResult::failed(e.to_string(), start.elapsed())
            }
        }
    }

    fn validate(&self, target: &TargetConfig) -> crate::Result<()> {
        if target.url.is_none() {
            return Err(crate::VigilError::Config(format!(
                "HTTP target '{}' has no url",
                target.name
            )));
        }
        Ok(())
    }
}

/// TCP port dial check; succeeds only when every port accepts a connection
#[derive(Debug, Default)]
pub struct TcpCheck;

#[async_trait]
impl Check for TcpCheck {
    fn type_name(&self) -> &str {
        "tcp"
    }

    async fn check(&self, target: &TargetConfig) -> CheckResult {
        let Some(host) = &target.host else {
            return CheckResult::failed("target has no host", Duration::ZERO);
        };

        let timeout = target.timeout();
        let start = Instant::now();
        let mut failures = Vec::new();

        for port in &target.ports {
            match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), *port))).await
            {
                Ok(Ok(_stream)) => {
                    tracing::debug!("TCP check '{}' {}:{} open", target.name, host, port);
                }
                Ok(Err(e)) => failures.push(format!("{}: {}", port, e)),
                Err(_) => failures.push(format!("{}: timed out after {:?}", port, timeout)),
            }
        }

        if failures.is_empty() {
            CheckResult {
                success: true,
                status_code: None,
                response_time: start.elapsed(),
                response_size: 0,
                error: None,
                content_type: None,
                response_body: None,
            }
        } else {
            CheckResult::failed(
                format!("{} unreachable on {}", host, failures.join("; ")),
                start.elapsed(),
            )
        }
    }

    fn validate(&self, target: &TargetConfig) -> crate::Result<()> {
        if target.host.is_none() || target.ports.is_empty() {
            return Err(crate::VigilError::Config(format!(
                "TCP target '{}' needs a host and at least one port",
                target.name
            )));
        }
        Ok(())
    }
}

/// Maps configuration names to check strategies
#[derive(Debug, Default, Clone)]
pub struct CheckRegistry {
    checks: HashMap<String, Arc<dyn Check>>,
}

impl CheckRegistry {
    /// Registry with the built-in HTTP and TCP strategies
    pub fn with_defaults(http: Arc<dyn HttpClient>) -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(HttpCheck::new(http)));
        registry.register(Arc::new(TcpCheck));
        registry
    }

    pub fn register(&mut self, check: Arc<dyn Check>) {
        self.checks.insert(check.type_name().to_string(), check);
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn Check>> {
        self.checks.get(type_name).cloned()
    }
}
