//! Error types for the intake server

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdf_text_core::ErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::StatusError;

/// Errors returned by the HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid file type: {0}")]
    InvalidFileType(String),

    #[error("File exceeds the {limit} byte limit")]
    FileTooLarge { limit: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Process not found: {0}")]
    UnknownProcess(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized,
            ApiError::InvalidFileType(_) => ErrorKind::InvalidFileType,
            ApiError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            ApiError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ApiError::UnknownProcess(_) => ErrorKind::UnknownProcess,
            ApiError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Map a multipart read failure, recognizing the body limit
    pub fn from_multipart(err: MultipartError, limit: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::FileTooLarge { limit }
        } else {
            ApiError::InvalidRequest(err.body_text())
        }
    }
}

/// HTTP status for each failure kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidFileType | ErrorKind::FileTooLarge | ErrorKind::InvalidRequest => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::UnknownProcess => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientText | ErrorKind::UnreadableInput => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::WebhookRejected => StatusCode::BAD_GATEWAY,
        ErrorKind::SubprocessTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: kind.code().to_string(),
        };

        (status_for(kind), Json(body)).into_response()
    }
}

impl From<StatusError> for ApiError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::UnknownProcess(id) => ApiError::UnknownProcess(id),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
