use crate::models::{
    ConversationRow, MessageRow, NewMessage, TokenLookupRow, UsageStatRow, UserProfile, UserRow,
    UserStatsRow,
};
use crate::{Database, now_ts};
use anyhow::Result;
use chrono::{Days, NaiveDate};
use rusqlite::{Connection, Row};
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, name, email, tier, subscription_status, subscription_expires_at, last_login, created_at";

impl Database {
    // -- Users --

    /// Create the user on first sight, otherwise refresh the entitlement
    /// fields. Either way `last_login` is set to now.
    pub fn upsert_user(&self, profile: &UserProfile<'_>) -> Result<()> {
        let now = now_ts();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, tier, subscription_status, subscription_expires_at, last_login, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    email = COALESCE(excluded.email, users.email),
                    tier = excluded.tier,
                    subscription_status = excluded.subscription_status,
                    subscription_expires_at = excluded.subscription_expires_at,
                    last_login = excluded.last_login",
                rusqlite::params![
                    profile.id,
                    profile.name,
                    profile.email,
                    profile.tier,
                    profile.subscription_status,
                    profile.subscription_expires_at,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
            let row = conn.query_row(&sql, [id], |row| user_from_row(row, 0)).optional()?;
            Ok(row)
        })
    }

    pub fn touch_last_login(&self, id: &str) -> Result<()> {
        let now = now_ts();
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE users SET last_login = ?1 WHERE id = ?2", (now, id))?;
            Ok(())
        })
    }

    // -- Access tokens --

    pub fn create_access_token(&self, user_id: &str, token_hash: &str, expires_at: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = now_ts();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO access_tokens (id, user_id, token_hash, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (&id, user_id, token_hash, expires_at, now),
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    /// Look up a token by hash regardless of expiry or active flag; the
    /// caller decides which of those make it unusable.
    pub fn find_access_token(&self, token_hash: &str) -> Result<Option<TokenLookupRow>> {
        self.with_conn(|conn| query_token(conn, token_hash))
    }

    pub fn touch_access_token(&self, id: &str) -> Result<()> {
        let now = now_ts();
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE access_tokens SET last_used = ?1 WHERE id = ?2", (now, id))?;
            Ok(())
        })
    }

    pub fn deactivate_access_token(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE access_tokens SET is_active = 0 WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Conversations --

    pub fn create_conversation(&self, user_id: &str, title: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = now_ts();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, user_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                (&id, user_id, title, now),
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, title, is_active, created_at, updated_at
                     FROM conversations WHERE id = ?1",
                    [id],
                    conversation_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Active conversations of a user, most recently updated first.
    pub fn list_conversations(&self, user_id: &str, limit: u32) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, is_active, created_at, updated_at
                 FROM conversations
                 WHERE user_id = ?1 AND is_active = 1
                 ORDER BY updated_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn touch_conversation(&self, id: &str) -> Result<()> {
        let now = now_ts();
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE conversations SET updated_at = ?1 WHERE id = ?2", (now, id))?;
            Ok(())
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = now_ts();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, user_id, content, sender, tokens_used, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id,
                    msg.conversation_id,
                    msg.user_id,
                    msg.content,
                    msg.sender,
                    msg.tokens_used,
                    msg.metadata,
                    now,
                ],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    /// The `limit` most recent messages of a conversation, oldest first.
    pub fn get_messages(&self, conversation_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, conversation_id, limit))
    }

    // -- Usage stats --

    pub fn get_usage_stat(&self, user_id: &str, date: NaiveDate) -> Result<Option<UsageStatRow>> {
        let day = date.to_string();
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, date, messages_sent, tokens_used, conversations_started
                     FROM usage_stats WHERE user_id = ?1 AND date = ?2",
                    (user_id, &day),
                    |row| {
                        Ok(UsageStatRow {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            date: row.get(2)?,
                            messages_sent: row.get(3)?,
                            tokens_used: row.get(4)?,
                            conversations_started: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn insert_usage_stat(
        &self,
        user_id: &str,
        date: NaiveDate,
        messages_sent: i64,
        tokens_used: i64,
        conversations_started: i64,
    ) -> Result<()> {
        let id = Uuid::new_v4().to_string();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO usage_stats (id, user_id, date, messages_sent, tokens_used, conversations_started)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, user_id, date.to_string(), messages_sent, tokens_used, conversations_started],
            )?;
            Ok(())
        })
    }

    /// Overwrite a row's counters with precomputed totals.
    pub fn update_usage_stat(
        &self,
        id: &str,
        messages_sent: i64,
        tokens_used: i64,
        conversations_started: i64,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE usage_stats
                 SET messages_sent = ?1, tokens_used = ?2, conversations_started = ?3
                 WHERE id = ?4",
                rusqlite::params![messages_sent, tokens_used, conversations_started, id],
            )?;
            Ok(())
        })
    }

    /// Totals over the `days` calendar days ending with `today`, so
    /// `days = 1` is today alone and `days = 0` is an empty window.
    pub fn user_stats(&self, user_id: &str, days: u32, today: NaiveDate) -> Result<UserStatsRow> {
        if days == 0 {
            return Ok(UserStatsRow::default());
        }
        let since = today
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .unwrap_or(NaiveDate::MIN)
            .to_string();
        let until = today.to_string();
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT COALESCE(SUM(messages_sent), 0),
                        COALESCE(SUM(tokens_used), 0),
                        COALESCE(SUM(conversations_started), 0),
                        COUNT(*)
                 FROM usage_stats
                 WHERE user_id = ?1 AND date >= ?2 AND date <= ?3",
                (user_id, &since, &until),
                |row| {
                    Ok(UserStatsRow {
                        messages_sent: row.get(0)?,
                        tokens_used: row.get(1)?,
                        conversations_started: row.get(2)?,
                        active_days: row.get(3)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }
}

fn user_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        email: row.get(offset + 2)?,
        tier: row.get(offset + 3)?,
        subscription_status: row.get(offset + 4)?,
        subscription_expires_at: row.get(offset + 5)?,
        last_login: row.get(offset + 6)?,
        created_at: row.get(offset + 7)?,
    })
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        is_active: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn query_token(conn: &Connection, token_hash: &str) -> Result<Option<TokenLookupRow>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.expires_at, t.is_active,
                u.id, u.name, u.email, u.tier, u.subscription_status,
                u.subscription_expires_at, u.last_login, u.created_at
         FROM access_tokens t
         JOIN users u ON t.user_id = u.id
         WHERE t.token_hash = ?1",
    )?;

    let row = stmt
        .query_row([token_hash], |row| {
            Ok(TokenLookupRow {
                token_id: row.get(0)?,
                expires_at: row.get(1)?,
                is_active: row.get(2)?,
                user: user_from_row(row, 3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(conn: &Connection, conversation_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
    // Newest `limit` rows, rowid breaks ties between same-millisecond inserts
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, user_id, content, sender, tokens_used, metadata, created_at
         FROM messages
         WHERE conversation_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2",
    )?;

    let mut rows = stmt
        .query_map(rusqlite::params![conversation_id, limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                user_id: row.get(2)?,
                content: row.get(3)?,
                sender: row.get(4)?,
                tokens_used: row.get(5)?,
                metadata: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.reverse();
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
