use std::sync::Arc;

use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, error};

use wetalk_db::Database;
use wetalk_gateway::Relay;
use wetalk_types::api::Claims;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub relay: Relay,
    pub jwt_secret: String,
    /// Exact origins admitted to the live channel. Empty admits none.
    pub allowed_origins: Vec<String>,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, jwt_secret: String, allowed_origins: Vec<String>) -> Self {
        Self {
            relay: Relay::new(db.clone()),
            db,
            jwt_secret,
            allowed_origins,
        }
    }

    /// Verify a token signed by the auth service and return its claims.
    pub fn decode_token(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!("Rejected access token: {}", e);
            ApiError::Unauthorized
        })
    }

    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }

    /// Run a store operation on the blocking pool.
    pub(crate) async fn blocking<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> wetalk_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("Blocking task failed: {}", e);
                ApiError::StorageUnavailable
            })?
            .map_err(ApiError::from)
    }
}
