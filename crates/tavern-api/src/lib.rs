pub mod auth;
pub mod chat;
pub mod conversations;
pub mod entitlement;
pub mod error;
pub mod middleware;
pub mod state;
pub mod stats;
pub mod usage;
pub mod validator;

use axum::{
    Json, Router,
    http::{Method, StatusCode, header::{AUTHORIZATION, CONTENT_TYPE}},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::middleware::require_auth;

pub use crate::state::{AppState, AppStateInner};

/// Build the full HTTP surface. CORS headers go on every response and any
/// `OPTIONS` request is answered with an empty 200.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route(
            "/api/auth",
            post(auth::authenticate).options(preflight).fallback(method_not_allowed),
        )
        .route(
            "/api/chat",
            post(chat::chat).options(preflight).fallback(method_not_allowed),
        )
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/api/conversations", get(conversations::list_conversations))
        .route("/api/conversations/{conversation_id}/messages", get(conversations::list_messages))
        .route("/api/stats", get(stats::get_stats))
        .layer(from_fn_with_state(state.clone(), require_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
