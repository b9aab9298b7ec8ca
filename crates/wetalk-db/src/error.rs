use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("no pending request from {from} to {to}")]
    NoSuchRequest { from: Uuid, to: Uuid },

    /// A handshake sub-step failed; the transaction was rolled back.
    #[error("accept handshake failed: {0}")]
    AcceptFailed(#[source] Box<DbError>),

    #[error("storage unavailable: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    Poisoned,
}

impl DbError {
    pub(crate) fn user_not_found(id: Uuid) -> Self {
        Self::NotFound(format!("user {}", id))
    }

    pub(crate) fn room_not_found(id: Uuid) -> Self {
        Self::NotFound(format!("room {}", id))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
