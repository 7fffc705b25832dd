use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde::Serialize;
use serde_json::json;
use axum::Json;
use thiserror::Error;

/// Failure of a single ingestion run. Every variant ends the run in the
/// `Failed` state.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid identifier {name:?}: no letters, digits or underscores left after sanitizing")]
    InvalidIdentifier { name: String },

    #[error("Duplicate column: {first:?} and {second:?} both become {sanitized:?}")]
    DuplicateColumn {
        first: String,
        second: String,
        sanitized: String,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Schema error on table {table}: {reason}")]
    Schema { table: String, reason: String },

    /// `row` is the 1-based data row number (header excluded).
    #[error("Insert error at row {row}: {reason}")]
    Insert { row: usize, reason: String },

    #[error("Deadline exceeded after {rows_attempted} rows; transaction rolled back")]
    DeadlineExceeded { rows_attempted: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ParseError,
    InvalidIdentifier,
    DuplicateColumn,
    ConnectionError,
    SchemaError,
    InsertError,
    DeadlineExceeded,
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Parse(_) => ErrorKind::ParseError,
            IngestError::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
            IngestError::DuplicateColumn { .. } => ErrorKind::DuplicateColumn,
            IngestError::Connection(_) => ErrorKind::ConnectionError,
            IngestError::Schema { .. } => ErrorKind::SchemaError,
            IngestError::Insert { .. } => ErrorKind::InsertError,
            IngestError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
        }
    }
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::ParseError
            | ErrorKind::InvalidIdentifier
            | ErrorKind::DuplicateColumn => StatusCode::BAD_REQUEST,
            ErrorKind::ConnectionError => StatusCode::BAD_GATEWAY,
            ErrorKind::SchemaError => StatusCode::CONFLICT,
            ErrorKind::InsertError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// Request-level failures of the HTTP layer, before an ingestion run starts.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedFileType(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
