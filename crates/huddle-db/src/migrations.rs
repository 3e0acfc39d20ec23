use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (social graph + group messages)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE friend_requests (
                id          TEXT PRIMARY KEY,
                sender_id   TEXT NOT NULL REFERENCES users(id),
                receiver_id TEXT NOT NULL REFERENCES users(id),
                status      TEXT NOT NULL CHECK (status IN ('pending', 'accepted', 'rejected')),
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                CHECK (sender_id <> receiver_id)
            );

            -- One live (pending or rejected) request per ordered pair.
            -- Accepted rows are history and may repeat after an unfriend.
            CREATE UNIQUE INDEX idx_friend_requests_active
                ON friend_requests(sender_id, receiver_id)
                WHERE status <> 'accepted';

            CREATE INDEX idx_friend_requests_receiver
                ON friend_requests(receiver_id, status);

            CREATE TABLE friendships (
                user_id     TEXT NOT NULL REFERENCES users(id),
                friend_id   TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (user_id, friend_id),
                CHECK (user_id <> friend_id)
            );

            CREATE TABLE chat_groups (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL CHECK (length(trim(name)) > 0),
                description TEXT NOT NULL DEFAULT '',
                creator_id  TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE group_members (
                group_id    TEXT NOT NULL REFERENCES chat_groups(id),
                user_id     TEXT NOT NULL REFERENCES users(id),
                role        TEXT NOT NULL CHECK (role IN ('admin', 'member')),
                joined_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (group_id, user_id)
            );

            CREATE INDEX idx_group_members_user
                ON group_members(user_id);

            -- AUTOINCREMENT: ids are never reused, so they stay valid cursors
            CREATE TABLE group_messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id        TEXT NOT NULL REFERENCES chat_groups(id),
                sender_id       TEXT NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL,
                message_type    TEXT NOT NULL DEFAULT 'text',
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_group_messages_group
                ON group_messages(group_id, id);

            -- Owner of the lobby; the password is not a valid argon2 hash
            INSERT INTO users (id, username, password)
                VALUES ('00000000-0000-0000-0000-000000000002', 'system', '!');

            -- Archive scope for gateway chat
            INSERT INTO chat_groups (id, name, description, creator_id)
                VALUES ('00000000-0000-0000-0000-000000000001', 'lobby',
                        'Archive of gateway chat', '00000000-0000-0000-0000-000000000002');

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
