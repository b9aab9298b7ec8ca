use axum::{
    Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
};
use uuid::Uuid;

use wetalk_types::api::{ApiResponse, SaveMessageRequest};
use wetalk_types::models::Message;

use crate::{auth::AuthUser, error::ApiError, state::AppState};

/// GET /room/{roomId}/conversations: the full log, oldest first. Members only.
pub async fn conversations(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Vec<Message>>>, ApiError> {
    let Path(room_id) = path?;

    let room = state
        .blocking(move |db| db.get_room(room_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("room {} not found", room_id)))?;

    if !room.members.iter().any(|m| m.user_id == auth.0) {
        return Err(ApiError::Forbidden(format!(
            "{} is not a member of room {}",
            auth.0, room_id
        )));
    }

    let messages = state.blocking(move |db| db.get_conversation(room_id)).await?;
    Ok(Json(ApiResponse::ok("Conversation fetched successfully", messages)))
}

/// POST /room/savemessage: the non-live path. The message is stored and then
/// relayed to whoever is joined to the room.
pub async fn save_message(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<SaveMessageRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let Json(req) = body?;
    auth.ensure_is(req.sender)?;

    state
        .relay
        .publish(req.room_id, Message::new(req.sender, req.message, req.timestamp))
        .await?;

    Ok(Json(ApiResponse::done("Message saved")))
}
