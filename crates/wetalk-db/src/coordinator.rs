//! The accept handshake: friend edge, direct room and request cleanup applied
//! as one SQLite transaction.
//!
//! Every sub-step is idempotent, so re-running an accept (after a client
//! retry, or over state left by an older partial write) converges on the same
//! result: one edge in each direction, one direct room, no pending rows.

use rusqlite::Connection;
use tracing::{info, warn};
use uuid::Uuid;

use wetalk_types::models::RoomMember;

use crate::connections::{insert_friend_edge, query_are_friends};
use crate::requests::{delete_requests, query_has_pending};
use crate::rooms::{NewRoom, insert_room, query_direct_room};
use crate::users::query_display_name;
use crate::{Database, DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptOutcome {
    pub room_id: Uuid,
    /// False when an existing direct room was reused.
    pub room_created: bool,
}

impl Database {
    /// `acceptor` accepts the pending request sent by `requester`.
    /// The requester's display name is snapshotted into the room on creation.
    pub fn accept_request(
        &self,
        acceptor: Uuid,
        requester: Uuid,
        requester_first_name: &str,
        requester_last_name: &str,
    ) -> Result<AcceptOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let pending = query_has_pending(&tx, requester, acceptor)?;
            if !pending && !query_are_friends(&tx, acceptor, requester)? {
                return Err(DbError::NoSuchRequest {
                    from: requester,
                    to: acceptor,
                });
            }

            let requester_member = RoomMember {
                user_id: requester,
                first_name: requester_first_name.to_string(),
                last_name: requester_last_name.to_string(),
            };

            let outcome = run_handshake(&tx, acceptor, requester_member).map_err(|e| {
                warn!("Accept {} -> {} failed, rolling back: {}", requester, acceptor, e);
                DbError::AcceptFailed(Box::new(e))
            })?;

            tx.commit()
                .map_err(|e| DbError::AcceptFailed(Box::new(e.into())))?;

            info!(
                "{} accepted {} (room {}, created: {}, retry: {})",
                acceptor, requester, outcome.room_id, outcome.room_created, !pending
            );
            Ok(outcome)
        })
    }
}

fn run_handshake(conn: &Connection, acceptor: Uuid, requester: RoomMember) -> Result<AcceptOutcome> {
    let requester_id = requester.user_id;

    insert_friend_edge(conn, acceptor, requester_id)?;

    let outcome = match query_direct_room(conn, acceptor, requester_id)? {
        Some(room_id) => AcceptOutcome {
            room_id,
            room_created: false,
        },
        None => {
            let (first_name, last_name) =
                query_display_name(conn, acceptor)?.ok_or_else(|| DbError::user_not_found(acceptor))?;
            let acceptor_member = RoomMember {
                user_id: acceptor,
                first_name,
                last_name,
            };
            AcceptOutcome {
                room_id: insert_room(conn, &NewRoom::direct(requester, acceptor_member))?,
                room_created: true,
            }
        }
    };

    delete_requests(conn, acceptor, requester_id)?;
    delete_requests(conn, requester_id, acceptor)?;

    Ok(outcome)
}
