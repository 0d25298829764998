#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    routing::{get, post},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use tavern_api::validator::TokenValidator;
use tavern_api::{AppState, AppStateInner};
use tavern_completion::{CompletionClient, CompletionConfig};
use tavern_db::Database;

pub const PEPPER: &[u8] = b"integration-pepper";

/// Bodies the fake completion provider has received.
pub type Seen = Arc<Mutex<Vec<Value>>>;

/// Fake provider that answers every request with `status` and `reply`.
pub async fn spawn_provider(status: StatusCode, reply: Value) -> (String, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/v1/chat/completions",
            post(move |State(seen): State<Seen>, Json(body): Json<Value>| {
                let reply = reply.clone();
                async move {
                    seen.lock().unwrap().push(body);
                    (status, Json(reply))
                }
            }),
        )
        .with_state(seen.clone());

    let addr = serve(app).await;
    (format!("http://{}/v1/chat/completions", addr), seen)
}

pub fn reply(content: &str, total_tokens: u32) -> Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"total_tokens": total_tokens}
    })
}

/// Fake entitlement authority accepting exactly one token.
pub async fn spawn_authority(accepted: &'static str, identity: Value) -> String {
    let app = Router::new().route(
        "/identity",
        get(move |headers: HeaderMap| {
            let identity = identity.clone();
            async move {
                let presented = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("Bearer "));
                if presented == Some(accepted) {
                    (StatusCode::OK, Json(identity))
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({"error": "unknown"})))
                }
            }
        }),
    );
    let addr = serve(app).await;
    format!("http://{}/identity", addr)
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub struct TestApp {
    pub router: Router,
    pub db: Arc<Database>,
}

pub fn build(endpoint: &str, validator: TokenValidator, expose_error_details: bool) -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let completion = CompletionClient::new(CompletionConfig {
        endpoint: endpoint.to_string(),
        api_key: Some("sk-test".into()),
        ..CompletionConfig::default()
    });
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        validator,
        completion,
        expose_error_details,
    });
    TestApp {
        router: tavern_api::router(state),
        db,
    }
}

pub fn app(endpoint: &str) -> TestApp {
    build(endpoint, TokenValidator::new(PEPPER.to_vec()).with_dev_tokens(), true)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub raw: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.raw).unwrap()
    }
}

pub async fn send(router: &Router, req: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let raw = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    TestResponse { status, headers, raw }
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn count(db: &Database, table: &str) -> i64 {
    db.with_conn(|conn| {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
    })
    .unwrap()
}
