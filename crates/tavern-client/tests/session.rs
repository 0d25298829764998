use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde_json::{Value, json};

use tavern_api::validator::TokenValidator;
use tavern_api::{AppState, AppStateInner};
use tavern_client::{ChatClient, ChatSession, ClientError};
use tavern_completion::{CompletionClient, CompletionConfig};
use tavern_db::Database;
use tavern_types::models::Sender;

type Hits = Arc<Mutex<Vec<Value>>>;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Real API server in front of a fake completion provider.
async fn spawn_stack(status: StatusCode, content: &'static str) -> (ChatClient, Hits) {
    let hits: Hits = Arc::new(Mutex::new(Vec::new()));
    let provider = Router::new()
        .route(
            "/v1/chat/completions",
            post(move |State(hits): State<Hits>, Json(body): Json<Value>| async move {
                hits.lock().unwrap().push(body);
                let reply = json!({
                    "choices": [{"message": {"role": "assistant", "content": content}}],
                    "usage": {"total_tokens": 12}
                });
                (status, Json(reply))
            }),
        )
        .with_state(hits.clone());
    let provider_addr = serve(provider).await;

    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        validator: TokenValidator::new(b"client-tests".to_vec()).with_dev_tokens(),
        completion: CompletionClient::new(CompletionConfig {
            endpoint: format!("http://{}/v1/chat/completions", provider_addr),
            api_key: Some("sk-test".into()),
            ..CompletionConfig::default()
        }),
        expose_error_details: true,
    });
    let api_addr = serve(tavern_api::router(state)).await;

    (ChatClient::new(format!("http://{}/", api_addr)), hits)
}

#[tokio::test]
async fn login_then_two_turns_share_a_conversation() {
    let (client, hits) = spawn_stack(StatusCode::OK, "A goblin waves.").await;
    let mut session = ChatSession::new();

    assert!(client.login(&mut session, "  test-token-123 ").await.unwrap());
    assert_eq!(session.user().unwrap().name, "Test User");

    assert!(client.send(&mut session, "Hello there").await);
    let conversation_id = session.conversation_id().unwrap().to_string();
    let last = session.messages().last().unwrap();
    assert_eq!(last.text, "A goblin waves.");
    assert_eq!(last.sender, Sender::Bot);
    assert!(!session.is_typing());

    assert!(client.send(&mut session, "Wave back").await);
    assert_eq!(session.conversation_id(), Some(conversation_id.as_str()));
    // greeting + two user messages + two replies
    assert_eq!(session.messages().len(), 5);
    assert_eq!(hits.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn blank_input_never_reaches_the_network() {
    let (client, hits) = spawn_stack(StatusCode::OK, "unused").await;
    let mut session = ChatSession::new();

    assert!(!client.login(&mut session, "   ").await.unwrap());
    assert!(!session.is_authenticated());

    client.login(&mut session, "test-token-123").await.unwrap();
    assert!(!client.send(&mut session, "").await);
    assert!(!client.send(&mut session, " \n ").await);

    assert_eq!(session.messages().len(), 1);
    assert!(hits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rejected_login_surfaces_server_error() {
    let (client, _) = spawn_stack(StatusCode::OK, "unused").await;
    let mut session = ChatSession::new();

    let err = client.login(&mut session, "not-a-token").await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "invalid or expired token");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn provider_failure_shows_error_bubble() {
    let (client, _) = spawn_stack(StatusCode::BAD_GATEWAY, "unused").await;
    let mut session = ChatSession::new();
    client.login(&mut session, "premium-token-456").await.unwrap();

    assert!(client.send(&mut session, "Anyone here?").await);

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].text, "Anyone here?");
    assert!(messages[2].is_error);
    assert!(messages[2].text.contains("failed to generate a reply"));
    assert!(!session.is_typing());
    assert!(session.conversation_id().is_none());
}
