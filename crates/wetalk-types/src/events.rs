use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marker carried inside presence events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PresenceKind {
    Login,
    Logout,
}

/// Events sent FROM server TO client over the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum GatewayEvent {
    /// First frame on every socket
    Connected { socket_id: Uuid },

    /// A message published to a joined room
    UserMessage {
        sender: Uuid,
        message: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
        room_id: Uuid,
    },

    LoginSuccess {
        user_id: Uuid,
        event: PresenceKind,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },

    LogoutSuccess {
        user_id: Uuid,
        event: PresenceKind,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },

    /// A command from this socket was refused
    Error { message: String },
}

impl GatewayEvent {
    pub fn presence(kind: PresenceKind, user_id: Uuid, timestamp: DateTime<Utc>) -> Self {
        match kind {
            PresenceKind::Login => Self::LoginSuccess {
                user_id,
                event: kind,
                timestamp,
            },
            PresenceKind::Logout => Self::LogoutSuccess {
                user_id,
                event: kind,
                timestamp,
            },
        }
    }
}

/// Commands sent FROM client TO server over the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum GatewayCommand {
    JoinRoom { room: Uuid },

    LeaveRoom { room: Uuid },

    SendMessageToRoom {
        room_id: Uuid,
        sender: Uuid,
        message: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },

    UserLogin { user_id: Uuid },

    UserLogout { user_id: Uuid },
}
