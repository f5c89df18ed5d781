use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    services::topics::TopicError,
    state::{session::JoinCodeError, state_machine::InvalidTransition},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No session matches the given id or join code, or the player is unknown.
    #[error("not found: {0}")]
    NotFound(String),
    /// The session has no host seated yet.
    #[error("session has no players yet")]
    NoPlayers,
    /// The roster reached the session capacity.
    #[error("session is full")]
    SessionFull,
    /// Another player already uses that name.
    #[error("player name `{0}` is already taken")]
    DuplicateName(String),
    /// A race needs at least two players.
    #[error("at least two players are required to start (got {0})")]
    NotEnoughPlayers(usize),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The topic selector failed.
    #[error("topic selection failed: {0}")]
    TopicSelection(#[from] TopicError),
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// The remote API could not be reached or answered unexpectedly.
    #[error("remote request failed: {0}")]
    Remote(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl ServiceError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Unavailable(_)
                | ServiceError::Degraded
                | ServiceError::Remote(_)
                | ServiceError::Timeout
        )
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<JoinCodeError> for ServiceError {
    fn from(err: JoinCodeError) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Stable, machine-readable error kind carried in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed request, join code or name.
    InvalidInput,
    /// Unknown session, join code or player.
    NotFound,
    /// The session has no host seated yet.
    NoPlayers,
    /// The session reached its capacity.
    SessionFull,
    /// The player name is taken; `detail` holds the name.
    DuplicateName,
    /// Too few players to start; `detail` holds the roster size.
    NotEnoughPlayers,
    /// The session is in the wrong phase.
    InvalidState,
    /// Storage backend unreachable.
    Unavailable,
    /// No storage backend installed.
    Degraded,
    /// Operation timed out.
    Timeout,
    /// An upstream dependency failed.
    BadGateway,
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Error kind.
    pub code: ErrorCode,
    /// Human readable message.
    pub message: String,
    /// Value the kind refers to, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorBody {
    /// Rebuild the service error a remote server reported.
    pub fn into_service_error(self) -> ServiceError {
        match self.code {
            ErrorCode::InvalidInput => ServiceError::InvalidInput(self.message),
            ErrorCode::NotFound => ServiceError::NotFound(self.message),
            ErrorCode::NoPlayers => ServiceError::NoPlayers,
            ErrorCode::SessionFull => ServiceError::SessionFull,
            ErrorCode::DuplicateName => {
                ServiceError::DuplicateName(self.detail.unwrap_or_default())
            }
            ErrorCode::NotEnoughPlayers => ServiceError::NotEnoughPlayers(
                self.detail
                    .and_then(|players| players.parse().ok())
                    .unwrap_or_default(),
            ),
            ErrorCode::InvalidState => ServiceError::InvalidState(self.message),
            ErrorCode::Unavailable | ErrorCode::Degraded => ServiceError::Degraded,
            ErrorCode::Timeout => ServiceError::Timeout,
            ErrorCode::BadGateway => ServiceError::Remote(self.message),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with the session rules or its current state.
    #[error("conflict: {message}")]
    Conflict {
        /// Which rule was violated.
        code: ErrorCode,
        /// Human readable message.
        message: String,
        /// Value the rule refers to.
        detail: Option<String>,
    },
    /// Service unavailable or degraded.
    #[error("service unavailable: {message}")]
    ServiceUnavailable {
        /// Unavailable, degraded or timeout.
        code: ErrorCode,
        /// Human readable message.
        message: String,
    },
    /// An upstream dependency failed.
    #[error("bad gateway: {0}")]
    BadGateway(String),
}

impl AppError {
    fn conflict(code: ErrorCode, err: &ServiceError, detail: Option<String>) -> Self {
        AppError::Conflict {
            code,
            message: err.to_string(),
            detail,
        }
    }

    fn unavailable(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError::ServiceUnavailable {
            code,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict {
                code: ErrorCode::InvalidState,
                message,
                detail: None,
            },
            ServiceError::NoPlayers => AppError::conflict(ErrorCode::NoPlayers, &err, None),
            ServiceError::SessionFull => AppError::conflict(ErrorCode::SessionFull, &err, None),
            ServiceError::DuplicateName(ref name) => {
                let name = name.clone();
                AppError::conflict(ErrorCode::DuplicateName, &err, Some(name))
            }
            ServiceError::NotEnoughPlayers(players) => {
                AppError::conflict(ErrorCode::NotEnoughPlayers, &err, Some(players.to_string()))
            }
            err @ ServiceError::TopicSelection(_) => AppError::BadGateway(err.to_string()),
            ServiceError::Unavailable(source) => {
                AppError::unavailable(ErrorCode::Unavailable, source.to_string())
            }
            ServiceError::Degraded => AppError::unavailable(ErrorCode::Degraded, "degraded mode"),
            ServiceError::Remote(message) => AppError::BadGateway(message),
            ServiceError::Timeout => {
                AppError::unavailable(ErrorCode::Timeout, "operation timed out")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: ErrorCode::InvalidInput,
                    message,
                    detail: None,
                },
            ),
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: ErrorCode::NotFound,
                    message,
                    detail: None,
                },
            ),
            AppError::Conflict {
                code,
                message,
                detail,
            } => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code,
                    message,
                    detail,
                },
            ),
            AppError::ServiceUnavailable { code, message } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    code,
                    message,
                    detail: None,
                },
            ),
            AppError::BadGateway(message) => (
                StatusCode::BAD_GATEWAY,
                ErrorBody {
                    code: ErrorCode::BadGateway,
                    message,
                    detail: None,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}
