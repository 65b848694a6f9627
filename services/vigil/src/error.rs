//! Error types for the vigil service

/// Errors that can occur in the vigil service
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("Target '{0}' not found")]
    NotFound(String),

    #[error("Target '{0}' is not a webhook target")]
    NotWebhookTarget(String),

    #[error("Hook '{0}' not found")]
    HookNotFound(String),

    #[error("Hook '{hook}' does not accept {method} requests")]
    MethodNotAllowed { hook: String, method: String },

    #[error("Unauthorized request to hook '{0}'")]
    Unauthorized(String),

    #[error("Unknown acknowledgement token")]
    UnknownToken,

    #[error("No active incident for this acknowledgement token")]
    NoActiveIncident,

    #[error("Status reports are disabled")]
    ReportsDisabled,

    #[error("No status report channels configured")]
    NoReportChannels,
}

/// Result type alias for vigil operations
pub type Result<T> = std::result::Result<T, VigilError>;
