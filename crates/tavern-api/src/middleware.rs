use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::auth_error;
use crate::error::ApiError;
use crate::state::AppState;

/// Validate the bearer token on read endpoints and stash the resolved
/// `AuthenticatedUser` in request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?
        .to_string();

    let user = state
        .validator
        .validate(&state.db, &token)
        .await
        .map_err(|e| auth_error(&state, e))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
