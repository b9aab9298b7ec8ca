use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use wetalk_db::{Database, DbError};
use wetalk_types::events::{GatewayEvent, PresenceKind};
use wetalk_types::models::Message;

/// Identifies one live socket. A user may hold several.
pub type ConnId = Uuid;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnId),

    #[error("room {0} not found")]
    RoomNotFound(Uuid),

    #[error("user {user} is not a member of room {room}")]
    NotAMember { user: Uuid, room: Uuid },

    #[error("socket is authenticated as {actual}, not {claimed}")]
    Impersonation { claimed: Uuid, actual: Uuid },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Routes live events to sockets: room-scoped messages to the room's
/// subscribers, presence to the user's friends.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    db: Arc<Database>,

    /// conn_id -> socket state
    connections: DashMap<ConnId, LiveConnection>,

    /// user_id -> that user's live sockets
    users: DashMap<Uuid, HashSet<ConnId>>,

    /// room_id -> subscribers. Entries are kept once created; rooms are never deleted.
    rooms: DashMap<Uuid, Arc<RoomChannel>>,
}

struct LiveConnection {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
    rooms: HashSet<Uuid>,
}

#[derive(Default)]
struct RoomChannel {
    subscribers: RwLock<HashSet<ConnId>>,

    /// Held across append + fan-out so delivery order matches log order.
    publish_order: Mutex<()>,
}

impl RoomChannel {
    fn read(&self) -> RwLockReadGuard<'_, HashSet<ConnId>> {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashSet<ConnId>> {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Relay {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                db,
                connections: DashMap::new(),
                users: DashMap::new(),
                rooms: DashMap::new(),
            }),
        }
    }

    /// Register a freshly upgraded socket. Returns (conn_id, outbound queue).
    pub fn register(&self, user_id: Uuid) -> (ConnId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        self.inner.connections.insert(
            conn_id,
            LiveConnection {
                user_id,
                tx,
                rooms: HashSet::new(),
            },
        );
        self.inner.users.entry(user_id).or_default().insert(conn_id);

        (conn_id, rx)
    }

    /// Drop a socket from every room. When it was the user's last socket the
    /// user goes offline and their friends are told.
    pub async fn unregister(&self, conn_id: ConnId) {
        let Some((_, conn)) = self.inner.connections.remove(&conn_id) else {
            return;
        };

        for room_id in &conn.rooms {
            if let Some(channel) = self.existing_channel(*room_id) {
                channel.write().remove(&conn_id);
            }
        }

        if let Some(mut sockets) = self.inner.users.get_mut(&conn.user_id) {
            sockets.remove(&conn_id);
        }

        // Emptiness is re-checked under the shard lock, so a socket registered
        // in between keeps the user online.
        let went_offline = self
            .inner
            .users
            .remove_if(&conn.user_id, |_, sockets| sockets.is_empty())
            .is_some();

        if went_offline {
            if let Err(e) = self.presence(conn.user_id, PresenceKind::Logout).await {
                warn!("Failed to mark {} offline: {}", conn.user_id, e);
            }
        }
    }

    /// Subscribe a socket to a room. Only recorded members are admitted.
    pub async fn join(&self, conn_id: ConnId, room_id: Uuid) -> Result<(), RelayError> {
        let user_id = self.user_of(conn_id)?;
        self.ensure_member(room_id, user_id).await?;

        // The socket may have closed while membership was checked
        let mut conn = self
            .inner
            .connections
            .get_mut(&conn_id)
            .ok_or(RelayError::UnknownConnection(conn_id))?;
        conn.rooms.insert(room_id);
        self.channel(room_id).write().insert(conn_id);

        debug!("Socket {} ({}) joined room {}", conn_id, user_id, room_id);
        Ok(())
    }

    pub fn leave(&self, conn_id: ConnId, room_id: Uuid) {
        if let Some(mut conn) = self.inner.connections.get_mut(&conn_id) {
            conn.rooms.remove(&room_id);
        }
        if let Some(channel) = self.existing_channel(room_id) {
            channel.write().remove(&conn_id);
        }
    }

    /// Persist a message, then deliver it to every socket joined to the room,
    /// the sender's own sockets included. Nothing is delivered unless the
    /// append succeeded. Returns the number of sockets reached.
    pub async fn publish(&self, room_id: Uuid, message: Message) -> Result<usize, RelayError> {
        self.ensure_member(room_id, message.sender).await?;

        let channel = self.channel(room_id);
        let _order = channel.publish_order.lock().await;

        let db = self.inner.db.clone();
        let stored = message.clone();
        tokio::task::spawn_blocking(move || db.append_message(room_id, &stored))
            .await?
            .map_err(|e| {
                error!("Failed to persist message for room {}: {}", room_id, e);
                e
            })?;

        let event = GatewayEvent::UserMessage {
            sender: message.sender,
            message: message.text,
            timestamp: message.timestamp,
            room_id,
        };

        let subscribers: Vec<ConnId> = channel.read().iter().copied().collect();
        let delivered = subscribers
            .into_iter()
            .filter(|conn_id| self.send_to(*conn_id, event.clone()))
            .count();

        debug!("Room {} message delivered to {} sockets", room_id, delivered);
        Ok(delivered)
    }

    /// Record a login/logout and tell the user's own sockets and their friends.
    pub async fn presence(&self, user_id: Uuid, kind: PresenceKind) -> Result<usize, RelayError> {
        let now = Utc::now();
        let db = self.inner.db.clone();
        let friends = tokio::task::spawn_blocking(move || {
            db.set_presence(user_id, kind == PresenceKind::Login, now)?;
            db.friend_ids(user_id)
        })
        .await??;

        let event = GatewayEvent::presence(kind, user_id, now);
        let delivered: usize = std::iter::once(user_id)
            .chain(friends)
            .map(|target| self.send_to_user(target, &event))
            .sum();

        info!("{} is {:?}, notified {} sockets", user_id, kind, delivered);
        Ok(delivered)
    }

    /// Queue an event for one socket. Returns false if it is gone.
    pub fn send_to(&self, conn_id: ConnId, event: GatewayEvent) -> bool {
        self.inner
            .connections
            .get(&conn_id)
            .is_some_and(|conn| conn.tx.send(event).is_ok())
    }

    pub fn subscriber_count(&self, room_id: Uuid) -> usize {
        self.existing_channel(room_id)
            .map_or(0, |channel| channel.read().len())
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    fn send_to_user(&self, user_id: Uuid, event: &GatewayEvent) -> usize {
        let sockets: Vec<ConnId> = self
            .inner
            .users
            .get(&user_id)
            .map(|sockets| sockets.iter().copied().collect())
            .unwrap_or_default();

        sockets
            .into_iter()
            .filter(|conn_id| self.send_to(*conn_id, event.clone()))
            .count()
    }

    fn user_of(&self, conn_id: ConnId) -> Result<Uuid, RelayError> {
        self.inner
            .connections
            .get(&conn_id)
            .map(|conn| conn.user_id)
            .ok_or(RelayError::UnknownConnection(conn_id))
    }

    async fn ensure_member(&self, room_id: Uuid, user_id: Uuid) -> Result<(), RelayError> {
        let db = self.inner.db.clone();
        let membership = tokio::task::spawn_blocking(move || -> Result<Option<bool>, DbError> {
            if db.is_member(room_id, user_id)? {
                return Ok(Some(true));
            }
            Ok(db.get_room(room_id)?.map(|_| false))
        })
        .await??;

        match membership {
            Some(true) => Ok(()),
            Some(false) => Err(RelayError::NotAMember {
                user: user_id,
                room: room_id,
            }),
            None => Err(RelayError::RoomNotFound(room_id)),
        }
    }

    fn channel(&self, room_id: Uuid) -> Arc<RoomChannel> {
        self.inner.rooms.entry(room_id).or_default().clone()
    }

    fn existing_channel(&self, room_id: Uuid) -> Option<Arc<RoomChannel>> {
        self.inner.rooms.get(&room_id).map(|channel| channel.clone())
    }
}
