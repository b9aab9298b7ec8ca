pub mod connections;
pub mod coordinator;
pub mod error;
pub mod migrations;
pub mod models;
pub mod requests;
pub mod rooms;
pub mod users;

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub use coordinator::AcceptOutcome;
pub use error::{DbError, Result};
pub use models::NewUser;
pub use rooms::NewRoom;

/// Single-writer SQLite store. Every operation, including the multi-row accept
/// handshake, runs under the one connection lock, so writes are serialized.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self::init(conn)?;

        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Private in-memory database, used by tests across the workspace.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        f(&conn)
    }

    /// Like `with_conn`, but hands out `&mut` so the closure can open a transaction.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        f(&mut conn)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use uuid::Uuid;

    use crate::{Database, NewUser};

    pub fn seed_user(db: &Database, first_name: &str, last_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&NewUser {
            id,
            first_name,
            last_name,
            email: &format!("{}.{}@example.test", first_name.to_lowercase(), id.simple()),
            is_verified: true,
        })
        .unwrap();
        id
    }
}
