use axum::{
    Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
};
use tracing::info;
use uuid::Uuid;

use wetalk_db::requests::SendOutcome;
use wetalk_types::api::{
    AcceptRequest, AcceptResponse, ApiResponse, ConnectRequest, NetworkOverview, RejectRequest,
};
use wetalk_types::models::{FriendProfile, UserProfile};

use crate::{auth::AuthUser, error::ApiError, state::AppState};

/// GET /usernetwork/{id}: everyone the user could still connect with, plus
/// the user's own request status.
pub async fn overview(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<NetworkOverview>>, ApiError> {
    let Path(user_id) = path?;
    auth.ensure_is(user_id)?;

    let overview = state
        .blocking(move |db| {
            Ok(NetworkOverview {
                users: db.list_non_friends(user_id, true)?,
                requests: db.request_status(user_id)?,
            })
        })
        .await?;

    Ok(Json(ApiResponse::ok("Users fetched successfully", overview)))
}

pub async fn friends(
    State(state): State<AppState>,
    _auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Vec<FriendProfile>>>, ApiError> {
    let Path(user_id) = path?;
    let friends = state.blocking(move |db| db.list_friends(user_id)).await?;
    Ok(Json(ApiResponse::ok("Friends fetched successfully", friends)))
}

pub async fn connect(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let Json(req) = body?;
    auth.ensure_is(req.from_id)?;

    let outcome = state
        .blocking(move |db| db.send_request(req.from_id, req.to_id))
        .await?;

    let message = match outcome {
        SendOutcome::Pending => {
            info!("{} sent a connection request to {}", req.from_id, req.to_id);
            "Connection request sent"
        }
        SendOutcome::AlreadyFriends => "Already connected",
    };
    Ok(Json(ApiResponse::done(message)))
}

pub async fn pending_requests(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Vec<UserProfile>>>, ApiError> {
    let Path(user_id) = path?;
    auth.ensure_is(user_id)?;
    let pending = state.blocking(move |db| db.pending_requesters(user_id)).await?;
    Ok(Json(ApiResponse::ok("Pending requests fetched successfully", pending)))
}

pub async fn accept(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<AcceptRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AcceptResponse>>, ApiError> {
    let Json(req) = body?;
    auth.ensure_is(req.user_id)?;

    let outcome = state
        .blocking(move |db| {
            db.accept_request(
                req.user_id,
                req.from_id,
                &req.from_first_name,
                &req.from_last_name,
            )
        })
        .await?;

    Ok(Json(ApiResponse::ok(
        "Connection request accepted",
        AcceptResponse {
            room_id: outcome.room_id,
            room_created: outcome.room_created,
        },
    )))
}

pub async fn reject(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let Json(req) = body?;
    auth.ensure_is(req.user_id)?;

    state
        .blocking(move |db| db.reject_request(req.user_id, req.from_id))
        .await?;

    Ok(Json(ApiResponse::done("Connection request rejected")))
}
