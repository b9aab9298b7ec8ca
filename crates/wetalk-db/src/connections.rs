//! Friend graph. Each edge is stored as two adjacency rows, always written
//! together inside one transaction.

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use wetalk_types::models::{FriendProfile, UserProfile};

use crate::models::{id_col, millis_col};
use crate::users::ensure_user;
use crate::{Database, DbError, Result};

impl Database {
    pub fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool> {
        self.with_conn(|conn| query_are_friends(conn, a, b))
    }

    /// Insert both directions of the edge. Re-adding an existing edge is a no-op.
    pub fn add_friend_edge(&self, a: Uuid, b: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_friend_edge(&tx, a, b)?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn friend_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| query_friend_ids(conn, user_id))
    }

    pub fn list_friends(&self, user_id: Uuid) -> Result<Vec<FriendProfile>> {
        self.with_conn(|conn| {
            ensure_user(conn, user_id)?;

            let mut stmt = conn.prepare(
                "SELECT u.id, u.first_name, u.last_name, u.is_online, u.last_activity
                 FROM friendships f
                 JOIN users u ON u.id = f.friend_id
                 WHERE f.user_id = ?1
                 ORDER BY u.rowid",
            )?;

            let friends = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(FriendProfile {
                        id: id_col(row, 0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        is_online: row.get(3)?,
                        last_activity: millis_col(row, 4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(friends)
        })
    }

    /// Everyone in the directory who is not yet a friend of `user_id`.
    pub fn list_non_friends(&self, user_id: Uuid, exclude_self: bool) -> Result<Vec<UserProfile>> {
        self.with_conn(|conn| {
            ensure_user(conn, user_id)?;

            let mut stmt = conn.prepare(
                "SELECT u.id, u.first_name, u.last_name, u.is_verified
                 FROM users u
                 WHERE NOT EXISTS (
                     SELECT 1 FROM friendships f WHERE f.user_id = ?1 AND f.friend_id = u.id
                 )
                 AND (?2 = 0 OR u.id != ?1)
                 ORDER BY u.rowid",
            )?;

            let users = stmt
                .query_map(rusqlite::params![user_id.to_string(), exclude_self], |row| {
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
}

pub(crate) fn query_are_friends(conn: &Connection, a: Uuid, b: Uuid) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
            [a.to_string(), b.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn query_friend_ids(conn: &Connection, user_id: Uuid) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare("SELECT friend_id FROM friendships WHERE user_id = ?1")?;
    let ids = stmt
        .query_map([user_id.to_string()], |row| id_col(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Callers must run this inside a transaction.
pub(crate) fn insert_friend_edge(conn: &Connection, a: Uuid, b: Uuid) -> Result<()> {
    if a == b {
        return Err(DbError::InvalidRequest("A user cannot befriend themselves".into()));
    }
    ensure_user(conn, a)?;
    ensure_user(conn, b)?;

    let (a, b) = (a.to_string(), b.to_string());
    conn.execute(
        "INSERT OR IGNORE INTO friendships (user_id, friend_id) VALUES (?1, ?2)",
        [&a, &b],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO friendships (user_id, friend_id) VALUES (?1, ?2)",
        [&b, &a],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seed_user;

    #[test]
    fn friend_edge_is_symmetric_and_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "Ada", "Lovelace");
        let b = seed_user(&db, "Bob", "Stone");

        assert!(!db.are_friends(a, b).unwrap());

        db.add_friend_edge(a, b).unwrap();
        db.add_friend_edge(b, a).unwrap();

        assert!(db.are_friends(a, b).unwrap());
        assert!(db.are_friends(b, a).unwrap());
        assert_eq!(db.friend_ids(a).unwrap(), vec![b]);
        assert_eq!(db.friend_ids(b).unwrap(), vec![a]);
    }

    #[test]
    fn edge_to_unknown_user_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "Ada", "Lovelace");
        let ghost = Uuid::new_v4();

        let result = db.add_friend_edge(a, ghost);
        assert!(matches!(result, Err(DbError::NotFound(_))));
        assert!(db.friend_ids(a).unwrap().is_empty());
    }

    #[test]
    fn non_friends_exclude_self_and_existing_friends() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "Ada", "Lovelace");
        let b = seed_user(&db, "Bob", "Stone");
        let c = seed_user(&db, "Cy", "Young");
        db.add_friend_edge(a, b).unwrap();

        let ids: Vec<Uuid> = db
            .list_non_friends(a, true)
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, vec![c]);

        let with_self: Vec<Uuid> = db
            .list_non_friends(a, false)
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(with_self, vec![a, c]);
    }

    #[test]
    fn friends_listing_carries_presence() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "Ada", "Lovelace");
        let b = seed_user(&db, "Bob", "Stone");
        db.add_friend_edge(a, b).unwrap();
        db.set_presence(b, true, chrono::Utc::now()).unwrap();

        let friends = db.list_friends(a).unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].id, b);
        assert_eq!(friends[0].first_name, "Bob");
        assert!(friends[0].is_online);
        assert!(friends[0].last_activity.is_some());
    }
}
