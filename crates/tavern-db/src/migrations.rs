use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                      TEXT PRIMARY KEY,
                name                    TEXT NOT NULL,
                email                   TEXT,
                tier                    TEXT NOT NULL DEFAULT 'basic',
                subscription_status     TEXT NOT NULL DEFAULT 'active',
                subscription_expires_at TEXT,
                last_login              TEXT,
                created_at              TEXT NOT NULL
            );

            CREATE TABLE access_tokens (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                token_hash  TEXT NOT NULL UNIQUE,
                expires_at  TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1,
                last_used   TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE conversations (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                title       TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_conversations_user
                ON conversations(user_id, updated_at);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                user_id         TEXT NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL,
                sender          TEXT NOT NULL CHECK (sender IN ('user', 'bot')),
                tokens_used     INTEGER,
                metadata        TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);

            CREATE TABLE usage_stats (
                id                    TEXT PRIMARY KEY,
                user_id               TEXT NOT NULL REFERENCES users(id),
                date                  TEXT NOT NULL,
                messages_sent         INTEGER NOT NULL DEFAULT 0,
                tokens_used           INTEGER NOT NULL DEFAULT 0,
                conversations_started INTEGER NOT NULL DEFAULT 0,
                UNIQUE(user_id, date)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
