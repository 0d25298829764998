use axum::{Json, body::Bytes, extract::State};
use chrono::Utc;
use tracing::info;

use tavern_types::api::{AuthRequest, AuthResponse, AuthUser};

use crate::error::{ApiError, parse_json};
use crate::state::{AppState, AppStateInner};
use crate::validator::AuthError;

/// POST /api/auth: exchange a bearer token for the user it identifies.
pub async fn authenticate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AuthResponse>, ApiError> {
    let req: AuthRequest = parse_json(&body)?;
    let token = req
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("token is required".to_string()))?;

    let user = state
        .validator
        .validate(&state.db, &token)
        .await
        .map_err(|e| auth_error(&state, e))?;

    info!("User {} authenticated ({})", user.id, user.tier);

    Ok(Json(AuthResponse {
        success: true,
        user: AuthUser {
            id: user.id,
            name: user.name,
            tier: user.tier,
            valid_until: user.valid_until,
        },
        timestamp: Utc::now(),
    }))
}

/// Rejections become 401 with the reason; infrastructure failures become 500.
pub fn auth_error(state: &AppStateInner, err: AuthError) -> ApiError {
    match err {
        AuthError::NotRecognized | AuthError::Expired | AuthError::Inactive => {
            ApiError::Unauthorized(err.to_string())
        }
        AuthError::Hash(_) | AuthError::Store(_) | AuthError::Entitlement(_) => {
            state.internal("failed to validate token", err)
        }
    }
}
