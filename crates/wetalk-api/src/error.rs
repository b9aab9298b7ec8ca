use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use wetalk_db::DbError;
use wetalk_gateway::RelayError;
use wetalk_types::api::ApiResponse;

/// Every failure a REST caller can see. Rendered as the response envelope
/// with `isSuccess: false`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Missing or invalid access token")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NoSuchRequest(String),

    #[error("{0}")]
    AcceptFailed(String),

    #[error("Storage is unavailable, try again later")]
    StorageUnavailable,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::NoSuchRequest(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::AcceptFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ApiResponse::failure(self.to_string()))).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(_) => Self::NotFound(e.to_string()),
            DbError::InvalidRequest(msg) => Self::InvalidRequest(msg),
            DbError::Conflict(msg) => Self::Conflict(msg),
            DbError::NoSuchRequest { .. } => Self::NoSuchRequest(e.to_string()),
            DbError::AcceptFailed(_) => {
                error!("{}", e);
                Self::AcceptFailed(e.to_string())
            }
            DbError::Storage(_) | DbError::Poisoned => {
                error!("Storage error: {}", e);
                Self::StorageUnavailable
            }
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Db(e) => e.into(),
            RelayError::UnknownConnection(_) | RelayError::RoomNotFound(_) => {
                Self::NotFound(e.to_string())
            }
            RelayError::NotAMember { .. } | RelayError::Impersonation { .. } => {
                Self::Forbidden(e.to_string())
            }
            RelayError::Task(e) => {
                error!("Storage task failed: {}", e);
                Self::StorageUnavailable
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}
