use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Header carrying the access token on REST calls.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// The authenticated caller, taken from the token subject.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl AuthUser {
    /// Mutations may only be made on the caller's own behalf.
    pub fn ensure_is(&self, acting_user: Uuid) -> Result<(), ApiError> {
        if self.0 == acting_user {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Token belongs to {}, cannot act for {}",
                self.0, acting_user
            )))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(ACCESS_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let claims = state.decode_token(token)?;
        Ok(AuthUser(claims.sub))
    }
}
