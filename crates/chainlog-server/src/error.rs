use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chainlog_ledger::{AppendError, AppendPhase, LedgerError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Append(#[from] AppendError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<AppendPhase>,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Append(e) => ledger_status(&e.source),
            Self::Ledger(e) => ledger_status(e),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Append(e) => e.source.kind(),
            Self::Ledger(e) => e.kind(),
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            phase: match self {
                Self::Append(e) => Some(e.phase),
                _ => None,
            },
        }
    }
}

fn ledger_status(error: &LedgerError) -> StatusCode {
    match error {
        LedgerError::NotInitialized => StatusCode::PRECONDITION_FAILED,
        LedgerError::AlreadyProvisioned => StatusCode::CONFLICT,
        LedgerError::PayloadTooLong { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        LedgerError::InvalidRange { .. } => StatusCode::BAD_REQUEST,
        LedgerError::StoreUnavailable(_) | LedgerError::ConflictRetriesExhausted { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        LedgerError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        LedgerError::IntegrityViolation { .. } | LedgerError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
