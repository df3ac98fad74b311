// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use callroom_common::ProtocolError;
use thiserror::Error;

use crate::validation::ValidationError;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Room {0} is full")]
    RoomFull(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::RoomFull(_) => StatusCode::CONFLICT,
            AppError::MalformedMessage(_)
            | AppError::UnknownMessageType(_)
            | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_) | AppError::Internal(_) | AppError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::RoomFull(_) => "ROOM_001",
            AppError::MalformedMessage(_) => "MSG_001",
            AppError::UnknownMessageType(_) => "MSG_002",
            AppError::Storage(_) => "STORE_001",
            AppError::InvalidInput(_) => "VAL_001",
            AppError::Internal(_) => "INT_001",
            AppError::Json(_) => "JSON_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::RoomFull(_) => "This room is full".to_string(),
            AppError::MalformedMessage(_) | AppError::Json(_) => {
                "Invalid request format".to_string()
            },
            AppError::UnknownMessageType(_) => "Unsupported message type".to_string(),
            AppError::Storage(_) | AppError::Internal(_) => {
                "An internal server error occurred".to_string()
            },
            AppError::InvalidInput(_) => "Invalid input provided".to_string(),
        }
    }

    /// Errors the signaling path reports to the client as protocol events
    /// (or drops by contract) rather than as failures.
    pub fn is_protocol_outcome(&self) -> bool {
        matches!(
            self,
            AppError::RoomFull(_) | AppError::UnknownMessageType(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<ProtocolError> for AppError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownType(kind) => AppError::UnknownMessageType(kind),
            other => AppError::MalformedMessage(other.to_string()),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AppError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AppError::Internal("Room registry is not running".to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for AppError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        AppError::Internal("Room registry dropped the request".to_string())
    }
}
