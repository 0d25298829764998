use axum::{Json, body::Bytes, extract::State};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use tavern_completion::prompt::{HISTORY_LIMIT, assemble};
use tavern_db::models::{MessageRow, NewMessage};
use tavern_types::api::{ChatRequest, ChatResponse, HistoryEntry};
use tavern_types::models::{HistoryMessage, Sender};

use crate::auth::auth_error;
use crate::error::{ApiError, parse_json};
use crate::state::{AppState, db_call};
use crate::usage;

/// POST /api/chat: run one turn.
///
/// Strictly sequential: validate token, load or create the conversation,
/// persist the user's message, ask the provider, persist the reply, bump
/// usage counters. The user's message stays persisted when the provider
/// fails; no bot row is written in that case.
pub async fn chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatResponse>, ApiError> {
    let req: ChatRequest = parse_json(&body)?;
    let required = || ApiError::Validation("message and userToken are required".to_string());
    let message = req.message.filter(|m| !m.trim().is_empty()).ok_or_else(required)?;
    let token = req.user_token.filter(|t| !t.trim().is_empty()).ok_or_else(required)?;

    let user = state
        .validator
        .validate(&state.db, &token)
        .await
        .map_err(|e| auth_error(&state, e))?;

    // A blank id means "no conversation yet", same as an absent one
    let requested = req.conversation_id.filter(|c| !c.trim().is_empty());
    let (conversation_id, history, created) = match requested {
        Some(conversation_id) => {
            let cid = conversation_id.clone();
            let conversation = db_call(&state.db, move |db| db.get_conversation(&cid))
                .await
                .map_err(|e| state.internal("failed to load conversation", e))?;

            if !conversation.is_some_and(|c| c.user_id == user.id) {
                return Err(ApiError::Validation(format!(
                    "unknown conversation {}",
                    conversation_id
                )));
            }

            let cid = conversation_id.clone();
            let rows = db_call(&state.db, move |db| db.get_messages(&cid, HISTORY_LIMIT as u32))
                .await
                .map_err(|e| state.internal("failed to load conversation history", e))?;

            (conversation_id, history_from_rows(rows), false)
        }
        None => {
            let uid = user.id.clone();
            let title = format!("Conversation {}", Utc::now().date_naive());
            let conversation_id = db_call(&state.db, move |db| db.create_conversation(&uid, &title))
                .await
                .map_err(|e| state.internal("failed to create conversation", e))?;
            info!("Started conversation {} for {}", conversation_id, user.id);

            (conversation_id, history_from_client(req.history.unwrap_or_default()), true)
        }
    };
    debug!("Loaded {} history messages for {}", history.len(), conversation_id);

    append(&state, &conversation_id, &user.id, &message, Sender::User, None, None)
        .await
        .map_err(|e| state.internal("failed to save message", e))?;

    let prompt = assemble(&history, &message);
    let completion = state
        .completion
        .complete(&prompt)
        .await
        .map_err(|e| state.internal("failed to generate a reply", e))?;

    let metadata = json!({
        "model": completion.model,
        "timestamp": Utc::now(),
    })
    .to_string();
    append(
        &state,
        &conversation_id,
        &user.id,
        &completion.content,
        Sender::Bot,
        Some(i64::from(completion.tokens_used)),
        Some(metadata),
    )
    .await
    .map_err(|e| state.internal("failed to save reply", e))?;

    if let Err(e) = usage::record_turn(
        &state.db,
        &user.id,
        completion.tokens_used,
        created,
        Utc::now().date_naive(),
    )
    .await
    {
        warn!("Failed to update usage stats for {}: {}", user.id, e);
    }

    Ok(Json(ChatResponse {
        success: true,
        response: completion.content,
        conversation_id: Some(conversation_id),
        timestamp: Utc::now(),
        tokens_used: Some(completion.tokens_used),
    }))
}

/// Insert a message, then refresh the conversation's `updated_at` as a
/// second, separate write.
async fn append(
    state: &AppState,
    conversation_id: &str,
    user_id: &str,
    content: &str,
    sender: Sender,
    tokens_used: Option<i64>,
    metadata: Option<String>,
) -> anyhow::Result<()> {
    let cid = conversation_id.to_string();
    let uid = user_id.to_string();
    let content = content.to_string();
    db_call(&state.db, move |db| {
        db.insert_message(&NewMessage {
            conversation_id: &cid,
            user_id: &uid,
            content: &content,
            sender: sender.as_str(),
            tokens_used,
            metadata: metadata.as_deref(),
        })
    })
    .await?;

    let cid = conversation_id.to_string();
    db_call(&state.db, move |db| db.touch_conversation(&cid)).await
}

fn history_from_rows(rows: Vec<MessageRow>) -> Vec<HistoryMessage> {
    rows.into_iter()
        .filter_map(|row| match row.sender.parse::<Sender>() {
            Ok(sender) => Some(HistoryMessage {
                sender,
                content: row.content,
            }),
            Err(e) => {
                warn!("Skipping message {} with {}", row.id, e);
                None
            }
        })
        .collect()
}

/// Client transcripts may contain error bubbles; those never reach the provider.
fn history_from_client(entries: Vec<HistoryEntry>) -> Vec<HistoryMessage> {
    let mut history: Vec<HistoryMessage> = entries
        .into_iter()
        .filter(|e| !e.is_error)
        .map(|e| HistoryMessage {
            sender: e.sender,
            content: e.text,
        })
        .collect();

    let excess = history.len().saturating_sub(HISTORY_LIMIT);
    history.drain(..excess);
    history
}
