use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{RequestStatus, UserProfile};

// -- JWT Claims --

/// Claims carried by tokens the external auth service signs with the shared
/// secret. Both the REST extractor and the live-channel upgrade read these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

// -- Envelope --

/// Every REST response is wrapped in this envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub is_success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            is_success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn done(message: impl Into<String>) -> Self {
        Self {
            is_success: true,
            message: message.into(),
            data: None,
        }
    }
}

// -- User network --

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectRequest {
    pub from_id: Uuid,
    pub to_id: Uuid,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AcceptRequest {
    /// The requester.
    pub from_id: Uuid,
    /// The acceptor.
    pub user_id: Uuid,
    pub from_first_name: String,
    pub from_last_name: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RejectRequest {
    pub from_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptResponse {
    pub room_id: Uuid,
    pub room_created: bool,
}

/// Payload of `GET /usernetwork/{id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct NetworkOverview {
    pub users: Vec<UserProfile>,
    pub requests: RequestStatus,
}

// -- Rooms --

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaveMessageRequest {
    pub room_id: Uuid,
    pub sender: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub message: String,
}
