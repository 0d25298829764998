/// Row types mapped directly from SQLite.
/// Distinct from tavern-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub tier: String,
    pub subscription_status: String,
    pub subscription_expires_at: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
}

/// Fields written when a user is created or refreshed from an identity source.
pub struct UserProfile<'a> {
    pub id: &'a str,
    pub name: &'a str,
    /// `None` keeps whatever email is already stored.
    pub email: Option<&'a str>,
    pub tier: &'a str,
    pub subscription_status: &'a str,
    pub subscription_expires_at: Option<&'a str>,
}

/// An access token joined to the user it belongs to.
pub struct TokenLookupRow {
    pub token_id: String,
    pub expires_at: String,
    pub is_active: bool,
    pub user: UserRow,
}

pub struct ConversationRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub content: String,
    pub sender: String,
    pub tokens_used: Option<i64>,
    pub metadata: Option<String>,
    pub created_at: String,
}

pub struct NewMessage<'a> {
    pub conversation_id: &'a str,
    pub user_id: &'a str,
    pub content: &'a str,
    pub sender: &'a str,
    pub tokens_used: Option<i64>,
    pub metadata: Option<&'a str>,
}

pub struct UsageStatRow {
    pub id: String,
    pub user_id: String,
    pub date: String,
    pub messages_sent: i64,
    pub tokens_used: i64,
    pub conversations_started: i64,
}

/// Aggregate over a user's `usage_stats` rows in a day window.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UserStatsRow {
    pub messages_sent: i64,
    pub tokens_used: i64,
    pub conversations_started: i64,
    pub active_days: i64,
}
