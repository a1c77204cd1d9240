//! Error types for extraction and decoding

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure categories shared by the extraction core and the HTTP surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidFileType,
    FileTooLarge,
    UnreadableInput,
    InsufficientText,
    WebhookRejected,
    UnknownProcess,
    SubprocessTimeout,
    Unauthorized,
    InvalidRequest,
    Internal,
}

impl ErrorKind {
    /// Machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidFileType => "INVALID_FILE_TYPE",
            ErrorKind::FileTooLarge => "FILE_TOO_LARGE",
            ErrorKind::UnreadableInput => "UNREADABLE_INPUT",
            ErrorKind::InsufficientText => "INSUFFICIENT_TEXT",
            ErrorKind::WebhookRejected => "WEBHOOK_REJECTED",
            ErrorKind::UnknownProcess => "UNKNOWN_PROCESS",
            ErrorKind::SubprocessTimeout => "SUBPROCESS_TIMEOUT",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Job-level extraction failure. Decoder failures never reach this type.
#[derive(Debug, Error)]
pub enum ExtractionFailure {
    #[error("Unreadable input: {0}")]
    UnreadableInput(String),

    #[error("Insufficient text: extracted {found} characters, at least {required} required")]
    InsufficientText { found: usize, required: usize },

    #[error("Extraction task failed: {0}")]
    Internal(String),
}

impl ExtractionFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractionFailure::UnreadableInput(_) => ErrorKind::UnreadableInput,
            ExtractionFailure::InsufficientText { .. } => ErrorKind::InsufficientText,
            ExtractionFailure::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Failure of a single decoder; recovered by falling through to the next one
#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("External decoder timed out after {0}ms")]
    SubprocessTimeout(u64),

    #[error("External decoder output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },

    #[error("External decoder exited with {0}")]
    ExitStatus(String),

    #[error("External decoder produced invalid output: {0}")]
    InvalidOutput(String),

    #[error("External decoder reported failure: {0}")]
    Reported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecoderError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DecoderError::SubprocessTimeout(_) => Some(ErrorKind::SubprocessTimeout),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let err = ExtractionFailure::InsufficientText {
            found: 3,
            required: 10,
        };
        assert_eq!(err.kind(), ErrorKind::InsufficientText);
        assert!(err.to_string().contains("at least 10"));

        let err = ExtractionFailure::UnreadableInput("empty buffer".into());
        assert_eq!(err.kind(), ErrorKind::UnreadableInput);
    }

    #[test]
    fn test_kind_serializes_by_name() {
        let json = serde_json::to_string(&ErrorKind::UnknownProcess).unwrap();
        assert_eq!(json, "\"UnknownProcess\"");
        assert_eq!(ErrorKind::WebhookRejected.code(), "WEBHOOK_REJECTED");
    }

    #[test]
    fn test_timeout_is_the_only_classified_decoder_error() {
        assert_eq!(
            DecoderError::SubprocessTimeout(30_000).kind(),
            Some(ErrorKind::SubprocessTimeout)
        );
        assert_eq!(DecoderError::Reported("no text".into()).kind(), None);
    }
}
