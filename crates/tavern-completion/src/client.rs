use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CompletionError;
use crate::prompt::PromptMessage;

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "cognitivecomputations/dolphin-mistral-24b-venice-edition:free";

// Fixed decoding parameters
const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.8;
const TOP_P: f32 = 0.9;
const FREQUENCY_PENALTY: f32 = 0.1;
const PRESENCE_PENALTY: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Sent as `HTTP-Referer`, used by the provider for attribution.
    pub referer: String,
    /// Sent as `X-Title`.
    pub title: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            referer: "https://tavern.local".to_string(),
            title: "Tavern Roleplay Chat".to_string(),
        }
    }
}

/// A generated reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    /// Zero when the provider omits `usage`.
    pub tokens_used: u32,
    pub model: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u32>,
}

/// Single-shot client for an OpenAI-compatible chat completions endpoint.
/// No retries, no fallback model.
#[derive(Clone)]
pub struct CompletionClient {
    http: Client,
    config: CompletionConfig,
}

impl CompletionClient {
    pub fn new(config: CompletionConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    pub async fn complete(&self, messages: &[PromptMessage]) -> Result<Completion, CompletionError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(CompletionError::MissingApiKey)?;

        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            frequency_penalty: FREQUENCY_PENALTY,
            presence_penalty: PRESENCE_PENALTY,
        };

        debug!(
            "Requesting completion from {} with {} messages",
            self.config.endpoint,
            messages.len()
        );

        let response = self
            .http
            .post(&self.config.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;

        if !(200..300).contains(&status) {
            warn!("Completion provider returned {}", status);
            return Err(CompletionError::Status { status, body: text });
        }

        parse_completion(status, text, &self.config.model)
    }
}

fn parse_completion(status: u16, text: String, model: &str) -> Result<Completion, CompletionError> {
    let parsed: CompletionResponse = match serde_json::from_str(&text) {
        Ok(parsed) => parsed,
        Err(_) => return Err(CompletionError::MalformedResponse { status, body: text }),
    };

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content);

    match content {
        Some(content) => Ok(Completion {
            content,
            tokens_used: parsed.usage.and_then(|u| u.total_tokens).unwrap_or(0),
            model: model.to_string(),
        }),
        None => Err(CompletionError::MalformedResponse { status, body: text }),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, extract::State, http::HeaderMap, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    use super::*;
    use crate::prompt::{Role, SYSTEM_DIRECTIVE};

    type Seen = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

    async fn spawn_provider(status: StatusCode, reply: Value) -> (SocketAddr, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(
                    move |State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| {
                        let reply = reply.clone();
                        async move {
                            seen.lock().unwrap().push((headers, body));
                            (status, Json(reply))
                        }
                    },
                ),
            )
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, seen)
    }

    fn client_for(addr: SocketAddr) -> CompletionClient {
        CompletionClient::new(CompletionConfig {
            endpoint: format!("http://{}/v1/chat/completions", addr),
            api_key: Some("sk-test".into()),
            ..CompletionConfig::default()
        })
    }

    fn prompt() -> Vec<PromptMessage> {
        vec![
            PromptMessage::new(Role::System, SYSTEM_DIRECTIVE),
            PromptMessage::new(Role::User, "hi"),
        ]
    }

    #[tokio::test]
    async fn sends_fixed_parameters_and_extracts_reply() {
        let (addr, seen) = spawn_provider(
            StatusCode::OK,
            json!({
                "choices": [{"message": {"role": "assistant", "content": "Greetings, traveller."}}],
                "usage": {"total_tokens": 42}
            }),
        )
        .await;

        let completion = client_for(addr).complete(&prompt()).await.unwrap();
        assert_eq!(completion.content, "Greetings, traveller.");
        assert_eq!(completion.tokens_used, 42);
        assert_eq!(completion.model, DEFAULT_MODEL);

        let seen = seen.lock().unwrap();
        let (headers, body) = &seen[0];
        assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-test");
        assert!(headers.get("x-title").is_some());
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[tokio::test]
    async fn missing_usage_counts_as_zero() {
        let (addr, _) = spawn_provider(
            StatusCode::OK,
            json!({"choices": [{"message": {"content": "ok"}}]}),
        )
        .await;

        let completion = client_for(addr).complete(&prompt()).await.unwrap();
        assert_eq!(completion.tokens_used, 0);
    }

    #[tokio::test]
    async fn upstream_error_carries_status_and_body() {
        let (addr, _) = spawn_provider(
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error": {"message": "rate limited"}}),
        )
        .await;

        let err = client_for(addr).complete(&prompt()).await.unwrap_err();
        match &err {
            CompletionError::Status { status, body } => {
                assert_eq!(*status, 429);
                assert!(body.contains("rate limited"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test]
    async fn reply_without_message_is_malformed() {
        let (addr, _) = spawn_provider(StatusCode::OK, json!({"choices": []})).await;

        let err = client_for(addr).complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse { status: 200, .. }));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let (addr, seen) = spawn_provider(StatusCode::OK, json!({})).await;
        let client = CompletionClient::new(CompletionConfig {
            endpoint: format!("http://{}/v1/chat/completions", addr),
            api_key: None,
            ..CompletionConfig::default()
        });

        let err = client.complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, CompletionError::MissingApiKey));
        assert!(seen.lock().unwrap().is_empty());
    }
}
