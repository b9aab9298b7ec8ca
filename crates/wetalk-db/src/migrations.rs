use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, network, rooms)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                first_name      TEXT NOT NULL DEFAULT '',
                last_name       TEXT NOT NULL DEFAULT '',
                email           TEXT NOT NULL UNIQUE,
                is_verified     INTEGER NOT NULL DEFAULT 0,
                is_online       INTEGER NOT NULL DEFAULT 0,
                last_activity   INTEGER,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Friend edges, one row per direction
            CREATE TABLE friendships (
                user_id     TEXT NOT NULL REFERENCES users(id),
                friend_id   TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (user_id, friend_id)
            );

            CREATE TABLE friend_requests (
                from_id     TEXT NOT NULL REFERENCES users(id),
                to_id       TEXT NOT NULL REFERENCES users(id),
                state       TEXT NOT NULL DEFAULT 'pending' CHECK (state = 'pending'),
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (from_id, to_id)
            );

            CREATE INDEX idx_friend_requests_to
                ON friend_requests(to_id);

            -- direct_key is set for two-member direct rooms only
            CREATE TABLE rooms (
                id              TEXT PRIMARY KEY,
                is_group_chat   INTEGER NOT NULL DEFAULT 0,
                direct_key      TEXT UNIQUE,
                last_message    TEXT,
                last_timestamp  INTEGER,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE room_members (
                room_id     TEXT NOT NULL REFERENCES rooms(id),
                user_id     TEXT NOT NULL REFERENCES users(id),
                first_name  TEXT NOT NULL DEFAULT '',
                last_name   TEXT NOT NULL DEFAULT '',
                position    INTEGER NOT NULL,
                PRIMARY KEY (room_id, user_id)
            );

            CREATE INDEX idx_room_members_user
                ON room_members(user_id);

            CREATE TABLE room_messages (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id     TEXT NOT NULL REFERENCES rooms(id),
                sender_id   TEXT NOT NULL REFERENCES users(id),
                body        TEXT NOT NULL,
                sent_at     INTEGER NOT NULL
            );

            CREATE INDEX idx_room_messages_room
                ON room_messages(room_id, seq);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
