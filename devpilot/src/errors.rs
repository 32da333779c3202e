//! Error types for DevPilot

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// A single rejected input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Main error type for DevPilot
#[derive(Error, Debug)]
pub enum PilotError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Validation error: {}", describe_fields(.0))]
    ValidationError(Vec<FieldError>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Operation '{operation}' is not supported for project type '{project_type}'")]
    UnsupportedType {
        operation: String,
        project_type: String,
    },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

fn describe_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl PilotError {
    /// HTTP status this error maps to when it is reported before a stream opens
    pub fn status_code(&self) -> StatusCode {
        match self {
            PilotError::ValidationError(_) | PilotError::UnsupportedType { .. } => {
                StatusCode::BAD_REQUEST
            }
            PilotError::JsonError(_) => StatusCode::BAD_REQUEST,
            PilotError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PilotError::Forbidden(_) => StatusCode::FORBIDDEN,
            PilotError::NotFound(_) => StatusCode::NOT_FOUND,
            PilotError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ValidationBody<'a> {
    errors: &'a [FieldError],
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for PilotError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            PilotError::ValidationError(fields) => {
                (status, Json(ValidationBody { errors: fields })).into_response()
            }
            _ => (
                status,
                Json(ErrorBody {
                    error: self.to_string(),
                }),
            )
                .into_response(),
        }
    }
}
