// Route assembly and request lifecycle error types
use std::path::PathBuf;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use thiserror::Error;

/// Filesystem discovery errors. Fatal to the branch they occur in; the
/// scanner collects them and keeps walking sibling branches.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("unreadable directory {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to stat {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("marker directory {path} has no parent segment to parameterize")]
    MarkerAtRoot { path: PathBuf },

    #[error("marker directory {path} sits directly under another marker")]
    NestedMarker { path: PathBuf },
}

impl ScanError {
    /// Path the error was raised for, for log correlation.
    pub fn path(&self) -> &PathBuf {
        match self {
            ScanError::Unreadable { path, .. } => path,
            ScanError::Metadata { path, .. } => path,
            ScanError::MarkerAtRoot { path } => path,
            ScanError::NestedMarker { path } => path,
        }
    }
}

/// Startup-time binding errors. These abort assembly; a service with a
/// half-bound route table must not come up.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("entity setup failed for '{param}': {source}")]
    EntitySetup {
        param: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid parameter template '{template}': must contain {{name}}")]
    InvalidTemplate { template: String },

    #[error("invalid naming pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Per-request failures. Each variant maps to exactly one response status.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("entity load failed for '{param}': {source}")]
    LoadFailure {
        param: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("lifecycle completed without a response")]
    Incomplete,

    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl RequestError {
    /// HTTP status this failure resolves to.
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::Forbidden(_) => StatusCode::FORBIDDEN,
            RequestError::NotFound(_) => StatusCode::NOT_FOUND,
            RequestError::Incomplete => StatusCode::METHOD_NOT_ALLOWED,
            RequestError::LoadFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RequestError::Stage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error code for client handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::Forbidden(_) => "FORBIDDEN",
            RequestError::NotFound(_) => "NOT_FOUND",
            RequestError::LoadFailure { .. } => "LOAD_FAILED",
            RequestError::Incomplete => "NO_RESPONSE",
            RequestError::Stage { .. } => "STAGE_FAILED",
        }
    }

    /// Convert to JSON response body.
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.to_string(),
            "code": self.error_code(),
        })
    }
}

// Automatic HTTP response conversion for Axum
impl IntoResponse for RequestError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self.to_json())).into_response()
    }
}

/// Errors surfaced to whoever drives assembly at startup.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("resource scan failed with {} error(s)", .0.len())]
    Scan(Vec<ScanError>),

    #[error(transparent)]
    Bind(#[from] BindError),
}
