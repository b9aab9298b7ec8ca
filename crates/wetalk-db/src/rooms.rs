//! Rooms: member snapshots, denormalized listing metadata, and the
//! append-only conversation log.

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use wetalk_types::models::{Message, RoomMember, RoomMetadata, RoomSummary};

use crate::models::{id_col, millis_col};
use crate::users::ensure_user;
use crate::{Database, DbError, Result};

/// Input for `create_room`.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub members: Vec<RoomMember>,
    pub is_group_chat: bool,
    pub metadata: RoomMetadata,
}

impl NewRoom {
    /// A two-member direct chat with empty metadata.
    pub fn direct(first: RoomMember, second: RoomMember) -> Self {
        Self {
            members: vec![first, second],
            is_group_chat: false,
            metadata: RoomMetadata::default(),
        }
    }
}

/// Key identifying the direct room of an unordered pair.
pub(crate) fn direct_key(a: Uuid, b: Uuid) -> String {
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}

impl Database {
    /// The room whose members are exactly {a, b}, if one exists.
    pub fn find_direct_room(&self, a: Uuid, b: Uuid) -> Result<Option<Uuid>> {
        self.with_conn(|conn| query_direct_room(conn, a, b))
    }

    pub fn create_room(&self, room: &NewRoom) -> Result<Uuid> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = insert_room(&tx, room)?;
            tx.commit()?;
            Ok(id)
        })
    }

    /// Push a message and refresh the listing metadata as one unit.
    pub fn append_message(&self, room_id: Uuid, message: &Message) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !query_room_exists(&tx, room_id)? {
                return Err(DbError::room_not_found(room_id));
            }

            let room = room_id.to_string();
            tx.execute(
                "INSERT INTO room_messages (room_id, sender_id, body, sent_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    &room,
                    message.sender.to_string(),
                    &message.text,
                    message.timestamp.timestamp_millis(),
                ],
            )?;
            tx.execute(
                "UPDATE rooms SET last_message = ?2, last_timestamp = ?3 WHERE id = ?1",
                rusqlite::params![&room, &message.text, message.timestamp.timestamp_millis()],
            )?;
            tx.commit()?;

            debug!("Appended message from {} to room {}", message.sender, room_id);
            Ok(())
        })
    }

    /// Summaries of every room `user_id` belongs to, most recently active first.
    pub fn list_rooms_for_member(&self, user_id: Uuid) -> Result<Vec<RoomSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id
                 FROM rooms r
                 JOIN room_members m ON m.room_id = r.id
                 WHERE m.user_id = ?1
                 ORDER BY COALESCE(r.last_timestamp, 0) DESC, r.rowid",
            )?;
            let ids = stmt
                .query_map([user_id.to_string()], |row| id_col(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut rooms = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(room) = query_room(conn, id)? {
                    rooms.push(room);
                }
            }
            Ok(rooms)
        })
    }

    pub fn get_room(&self, room_id: Uuid) -> Result<Option<RoomSummary>> {
        self.with_conn(|conn| query_room(conn, room_id))
    }

    /// Full conversation in append order.
    pub fn get_conversation(&self, room_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            if !query_room_exists(conn, room_id)? {
                return Err(DbError::room_not_found(room_id));
            }

            let mut stmt = conn.prepare(
                "SELECT sender_id, body, sent_at FROM room_messages
                 WHERE room_id = ?1
                 ORDER BY seq",
            )?;
            let messages = stmt
                .query_map([room_id.to_string()], |row| {
                    let sent_at: i64 = row.get(2)?;
                    let timestamp = chrono::DateTime::from_timestamp_millis(sent_at).ok_or(
                        rusqlite::Error::IntegralValueOutOfRange(2, sent_at),
                    )?;
                    Ok(Message {
                        sender: id_col(row, 0)?,
                        text: row.get(1)?,
                        timestamp,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(messages)
        })
    }

    pub fn is_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| query_is_member(conn, room_id, user_id))
    }
}

pub(crate) fn query_direct_room(conn: &Connection, a: Uuid, b: Uuid) -> Result<Option<Uuid>> {
    let id = conn
        .query_row(
            "SELECT id FROM rooms WHERE direct_key = ?1",
            [direct_key(a, b)],
            |row| id_col(row, 0),
        )
        .optional()?;
    Ok(id)
}

pub(crate) fn query_is_member(conn: &Connection, room_id: Uuid, user_id: Uuid) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM room_members WHERE room_id = ?1 AND user_id = ?2",
            [room_id.to_string(), user_id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn query_room_exists(conn: &Connection, room_id: Uuid) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM rooms WHERE id = ?1", [room_id.to_string()], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Callers must run this inside a transaction.
pub(crate) fn insert_room(conn: &Connection, room: &NewRoom) -> Result<Uuid> {
    if room.members.is_empty() {
        return Err(DbError::InvalidRequest("A room needs at least one member".into()));
    }
    for (i, member) in room.members.iter().enumerate() {
        if room.members[..i].iter().any(|m| m.user_id == member.user_id) {
            return Err(DbError::InvalidRequest(format!(
                "Duplicate room member {}",
                member.user_id
            )));
        }
        ensure_user(conn, member.user_id)?;
    }

    let key = match (room.is_group_chat, room.members.as_slice()) {
        (false, [a, b]) => Some(direct_key(a.user_id, b.user_id)),
        (false, _) => {
            return Err(DbError::InvalidRequest(
                "A direct room has exactly two members".into(),
            ));
        }
        (true, _) => None,
    };

    let id = Uuid::new_v4();
    let room_id = id.to_string();
    conn.execute(
        "INSERT INTO rooms (id, is_group_chat, direct_key, last_message, last_timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            &room_id,
            room.is_group_chat,
            key,
            room.metadata.last_message,
            room.metadata.last_timestamp.map(|t| t.timestamp_millis()),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DbError::Conflict("A direct room already exists for this pair".into())
        }
        e => e.into(),
    })?;

    for (position, member) in room.members.iter().enumerate() {
        conn.execute(
            "INSERT INTO room_members (room_id, user_id, first_name, last_name, position)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                &room_id,
                member.user_id.to_string(),
                &member.first_name,
                &member.last_name,
                position as i64,
            ],
        )?;
    }

    debug!("Created room {} with {} members", id, room.members.len());
    Ok(id)
}

fn query_room(conn: &Connection, room_id: Uuid) -> Result<Option<RoomSummary>> {
    let head = conn
        .query_row(
            "SELECT is_group_chat, last_message, last_timestamp FROM rooms WHERE id = ?1",
            [room_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    RoomMetadata {
                        last_message: row.get(1)?,
                        last_timestamp: millis_col(row, 2)?,
                    },
                ))
            },
        )
        .optional()?;

    let Some((is_group_chat, metadata)) = head else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT user_id, first_name, last_name FROM room_members
         WHERE room_id = ?1
         ORDER BY position",
    )?;
    let members = stmt
        .query_map([room_id.to_string()], |row| {
            Ok(RoomMember {
                user_id: id_col(row, 0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(RoomSummary {
        id: room_id,
        is_group_chat,
        members,
        metadata,
    }))
}
