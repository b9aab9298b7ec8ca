//! Pending friend requests, kept as one directed-edge row per request.
//!
//! A row `(from_id, to_id)` is simultaneously the sender's outgoing entry and
//! the recipient's incoming entry, so the two views cannot drift apart.

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use wetalk_types::models::{RequestStatus, UserProfile};

use crate::connections::query_are_friends;
use crate::models::id_col;
use crate::users::ensure_user;
use crate::{Database, DbError, Result};

/// What `send_request` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A pending row exists now (new or refreshed).
    Pending,
    /// The pair is already connected; nothing recorded.
    AlreadyFriends,
}

impl Database {
    /// Record a pending request. Re-sending while pending is a no-op success.
    pub fn send_request(&self, from: Uuid, to: Uuid) -> Result<SendOutcome> {
        if from == to {
            return Err(DbError::InvalidRequest(
                "Cannot send a connection request to yourself".into(),
            ));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            ensure_user(&tx, from)?;
            ensure_user(&tx, to)?;

            if query_are_friends(&tx, from, to)? {
                return Ok(SendOutcome::AlreadyFriends);
            }

            tx.execute(
                "INSERT OR IGNORE INTO friend_requests (from_id, to_id) VALUES (?1, ?2)",
                [from.to_string(), to.to_string()],
            )?;
            tx.commit()?;

            debug!("Pending request {} -> {}", from, to);
            Ok(SendOutcome::Pending)
        })
    }

    /// Ids of users with a pending request towards `user_id`.
    pub fn list_incoming(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| query_incoming(conn, user_id))
    }

    /// Ids of users `user_id` has asked.
    pub fn list_outgoing(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| query_outgoing(conn, user_id))
    }

    pub fn request_status(&self, user_id: Uuid) -> Result<RequestStatus> {
        self.with_conn(|conn| {
            ensure_user(conn, user_id)?;
            Ok(RequestStatus {
                to: query_outgoing(conn, user_id)?,
                from: query_incoming(conn, user_id)?,
            })
        })
    }

    /// Directory entries of everyone waiting on `user_id` to accept.
    pub fn pending_requesters(&self, user_id: Uuid) -> Result<Vec<UserProfile>> {
        self.with_conn(|conn| {
            ensure_user(conn, user_id)?;

            let mut stmt = conn.prepare(
                "SELECT u.id, u.first_name, u.last_name, u.is_verified
                 FROM friend_requests r
                 JOIN users u ON u.id = r.from_id
                 WHERE r.to_id = ?1
                 ORDER BY r.rowid",
            )?;

            let users = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(UserProfile {
                        id: id_col(row, 0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        is_verified: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(users)
        })
    }

    /// Drop `other_id` from both of `user_id`'s request views. Absent entries are fine.
    pub fn clear_requests(&self, user_id: Uuid, other_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            delete_requests(conn, user_id, other_id)?;
            Ok(())
        })
    }

    /// Turn down a pending request from `requester` to `user_id`.
    pub fn reject_request(&self, user_id: Uuid, requester: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !query_has_pending(&tx, requester, user_id)? {
                return Err(DbError::NoSuchRequest {
                    from: requester,
                    to: user_id,
                });
            }
            delete_requests(&tx, user_id, requester)?;
            delete_requests(&tx, requester, user_id)?;
            tx.commit()?;
            Ok(())
        })
    }
}

pub(crate) fn query_has_pending(conn: &Connection, from: Uuid, to: Uuid) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM friend_requests WHERE from_id = ?1 AND to_id = ?2 AND state = 'pending'",
            [from.to_string(), to.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Removes `other_id` from `user_id`'s outgoing and incoming entries.
pub(crate) fn delete_requests(conn: &Connection, user_id: Uuid, other_id: Uuid) -> Result<usize> {
    let (user, other) = (user_id.to_string(), other_id.to_string());
    let outgoing = conn.execute(
        "DELETE FROM friend_requests WHERE from_id = ?1 AND to_id = ?2",
        [&user, &other],
    )?;
    let incoming = conn.execute(
        "DELETE FROM friend_requests WHERE from_id = ?1 AND to_id = ?2",
        [&other, &user],
    )?;
    Ok(outgoing + incoming)
}

pub(crate) fn query_incoming(conn: &Connection, user_id: Uuid) -> Result<Vec<Uuid>> {
    query_ids(
        conn,
        "SELECT from_id FROM friend_requests WHERE to_id = ?1 ORDER BY rowid",
        user_id,
    )
}

pub(crate) fn query_outgoing(conn: &Connection, user_id: Uuid) -> Result<Vec<Uuid>> {
    query_ids(
        conn,
        "SELECT to_id FROM friend_requests WHERE from_id = ?1 ORDER BY rowid",
        user_id,
    )
}

fn query_ids(conn: &Connection, sql: &str, user_id: Uuid) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([user_id.to_string()], |row| id_col(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}
