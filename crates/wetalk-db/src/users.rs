//! Read side of the user directory, plus the presence fields the relay owns.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use wetalk_types::models::PublicUser;

use crate::models::{NewUser, id_col, millis_col};
use crate::{Database, DbError, Result};

impl Database {
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, first_name, last_name, email, is_verified)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    user.id.to_string(),
                    user.first_name,
                    user.last_name,
                    user.email.to_lowercase(),
                    user.is_verified,
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    DbError::Conflict("User already exists".into())
                }
                e => e.into(),
            })?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<PublicUser>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT id, first_name, last_name, email, is_verified, is_online, last_activity
                     FROM users WHERE id = ?1",
                    [id.to_string()],
                    |row| {
                        Ok(PublicUser {
                            id: id_col(row, 0)?,
                            first_name: row.get(1)?,
                            last_name: row.get(2)?,
                            email: row.get(3)?,
                            is_verified: row.get(4)?,
                            is_online: row.get(5)?,
                            last_activity: millis_col(row, 6)?,
                        })
                    },
                )
                .optional()?;
            Ok(user)
        })
    }

    /// Record a presence transition and stamp `last_activity`.
    pub fn set_presence(&self, id: Uuid, online: bool, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET is_online = ?2, last_activity = ?3 WHERE id = ?1",
                rusqlite::params![id.to_string(), online, at.timestamp_millis()],
            )?;
            if updated == 0 {
                return Err(DbError::user_not_found(id));
            }
            Ok(())
        })
    }
}

fn query_user_exists(conn: &Connection, id: Uuid) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", [id.to_string()], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn ensure_user(conn: &Connection, id: Uuid) -> Result<()> {
    if query_user_exists(conn, id)? {
        Ok(())
    } else {
        Err(DbError::user_not_found(id))
    }
}

/// (first_name, last_name) for a user.
pub(crate) fn query_display_name(conn: &Connection, id: Uuid) -> Result<Option<(String, String)>> {
    let name = conn
        .query_row(
            "SELECT first_name, last_name FROM users WHERE id = ?1",
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::test_support::seed_user;

    #[test]
    fn presence_updates_online_flag_and_activity() {
        let db = Database::open_in_memory().unwrap();
        let jane = seed_user(&db, "Jane", "Doe");

        let before = db.get_user(jane).unwrap().unwrap();
        assert!(!before.is_online);
        assert_eq!(before.last_activity, None);

        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        db.set_presence(jane, true, at).unwrap();

        let after = db.get_user(jane).unwrap().unwrap();
        assert!(after.is_online);
        assert_eq!(after.last_activity, Some(at));
    }

    #[test]
    fn presence_for_unknown_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let result = db.set_presence(Uuid::new_v4(), true, Utc::now());
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let db = Database::open_in_memory().unwrap();
        let user = |id| NewUser {
            id,
            first_name: "Jane",
            last_name: "Doe",
            email: "Jane@Example.test",
            is_verified: false,
        };

        db.create_user(&user(Uuid::new_v4())).unwrap();
        let result = db.create_user(&user(Uuid::new_v4()));
        assert!(matches!(result, Err(DbError::Conflict(_))));
    }
}
