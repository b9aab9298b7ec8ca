use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Directory entry shown in "suggested connections" and pending-request lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub is_verified: bool,
}

/// An accepted friend, with presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub is_online: bool,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_activity: Option<DateTime<Utc>>,
}

/// Public view of a single user, as served by the directory lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_verified: bool,
    pub is_online: bool,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_activity: Option<DateTime<Utc>>,
}

/// Pending requests of one user, split by direction.
/// `to` holds users this user asked; `from` holds users asking this user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub to: Vec<Uuid>,
    pub from: Vec<Uuid>,
}

/// Member snapshot stored with a room at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMetadata {
    pub last_message: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// Room projection used by listings: everything but the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: Uuid,
    pub is_group_chat: bool,
    pub members: Vec<RoomMember>,
    pub metadata: RoomMetadata,
}

/// A conversation entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "message")]
    pub text: String,
}

impl Message {
    pub fn new(sender: Uuid, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sender,
            timestamp,
            text: text.into(),
        }
    }
}
