use axum::{
    Json,
    extract::{Path, State, rejection::PathRejection},
};
use uuid::Uuid;

use wetalk_types::api::ApiResponse;
use wetalk_types::models::{PublicUser, RoomSummary};

use crate::{auth::AuthUser, error::ApiError, state::AppState};

/// Most recently active room first. Only the user may list their own rooms.
pub async fn rooms(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Vec<RoomSummary>>>, ApiError> {
    let Path(user_id) = path?;
    auth.ensure_is(user_id)?;
    let rooms = state.blocking(move |db| db.list_rooms_for_member(user_id)).await?;
    Ok(Json(ApiResponse::ok("Rooms fetched successfully", rooms)))
}

/// Public profile. Readable without a token.
pub async fn profile(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let Path(user_id) = path?;

    let user = state
        .blocking(move |db| db.get_user(user_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {} not found", user_id)))?;

    Ok(Json(ApiResponse::ok("User fetched successfully", user)))
}
