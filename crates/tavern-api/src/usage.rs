use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use tavern_db::Database;

use crate::state::db_call;

/// Add one turn to the user's counters for `day`.
///
/// Read-then-write in two separate store calls: two concurrent turns for
/// the same user and day can both read the same row and one increment is
/// lost, or both miss it and the second insert hits the unique key.
pub async fn record_turn(
    db: &Arc<Database>,
    user_id: &str,
    tokens_used: u32,
    new_conversation: bool,
    day: NaiveDate,
) -> anyhow::Result<()> {
    let tokens = i64::from(tokens_used);
    let started = i64::from(new_conversation);

    let uid = user_id.to_string();
    let existing = db_call(db, move |db| db.get_usage_stat(&uid, day)).await?;

    match existing {
        Some(row) => {
            debug!("Updating usage for {} on {}", row.user_id, row.date);
            db_call(db, move |db| {
                db.update_usage_stat(
                    &row.id,
                    row.messages_sent + 1,
                    row.tokens_used + tokens,
                    row.conversations_started + started,
                )
            })
            .await
        }
        None => {
            let uid = user_id.to_string();
            db_call(db, move |db| db.insert_usage_stat(&uid, day, 1, tokens, started)).await
        }
    }
}
