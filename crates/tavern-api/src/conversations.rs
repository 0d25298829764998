use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::warn;

use tavern_types::api::{ConversationSummary, StoredMessage};
use tavern_types::models::{AuthenticatedUser, Sender};

use crate::error::ApiError;
use crate::state::{AppState, db_call};

const CONVERSATION_PAGE: u32 = 50;
const MESSAGE_PAGE: u32 = 100;

/// GET /api/conversations: the caller's active conversations, newest activity first.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let uid = user.id.clone();
    let rows = db_call(&state.db, move |db| db.list_conversations(&uid, CONVERSATION_PAGE))
        .await
        .map_err(|e| state.internal("failed to list conversations", e))?;

    Ok(Json(
        rows.into_iter()
            .map(|row| ConversationSummary {
                id: row.id,
                title: row.title,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect(),
    ))
}

/// GET /api/conversations/{conversation_id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    let cid = conversation_id.clone();
    let conversation = db_call(&state.db, move |db| db.get_conversation(&cid))
        .await
        .map_err(|e| state.internal("failed to load conversation", e))?;

    // Someone else's conversation looks the same as a missing one
    if !conversation.is_some_and(|c| c.user_id == user.id && c.is_active) {
        return Err(ApiError::NotFound(format!("conversation {} not found", conversation_id)));
    }

    let rows = db_call(&state.db, move |db| db.get_messages(&conversation_id, MESSAGE_PAGE))
        .await
        .map_err(|e| state.internal("failed to load messages", e))?;

    let messages = rows
        .into_iter()
        .filter_map(|row| {
            let sender = match row.sender.parse::<Sender>() {
                Ok(sender) => sender,
                Err(e) => {
                    warn!("Skipping message {} with {}", row.id, e);
                    return None;
                }
            };
            let metadata = row.metadata.as_deref().and_then(|raw| {
                serde_json::from_str(raw)
                    .map_err(|e| warn!("Corrupt metadata on message '{}': {}", row.id, e))
                    .ok()
            });
            Some(StoredMessage {
                id: row.id,
                content: row.content,
                sender,
                tokens_used: row.tokens_used,
                metadata,
                created_at: row.created_at,
            })
        })
        .collect();

    Ok(Json(messages))
}
