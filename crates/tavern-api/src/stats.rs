use axum::{
    Extension, Json,
    extract::{Query, State},
};
use chrono::Utc;

use tavern_types::api::{StatsQuery, StatsResponse};
use tavern_types::models::AuthenticatedUser;

use crate::error::ApiError;
use crate::state::{AppState, db_call};

const DEFAULT_WINDOW_DAYS: u32 = 30;
const MAX_WINDOW_DAYS: u32 = 365;

/// GET /api/stats?days=N: usage totals over the last N calendar days, today being the last.
pub async fn get_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let days = match query.days.as_deref() {
        None => DEFAULT_WINDOW_DAYS,
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| ApiError::Validation(format!("days must be a non-negative integer, got {:?}", raw)))?
            .min(MAX_WINDOW_DAYS),
    };
    let today = Utc::now().date_naive();

    let uid = user.id.clone();
    let stats = db_call(&state.db, move |db| db.user_stats(&uid, days, today))
        .await
        .map_err(|e| state.internal("failed to load usage stats", e))?;

    Ok(Json(StatsResponse {
        days,
        messages_sent: stats.messages_sent,
        tokens_used: stats.tokens_used,
        conversations_started: stats.conversations_started,
        active_days: stats.active_days,
    }))
}
