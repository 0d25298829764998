use reqwest::Client;
use tracing::{debug, warn};

use tavern_types::api::{AuthRequest, AuthResponse, ChatRequest, ChatResponse, ErrorBody};

use crate::session::ChatSession;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not reach the server: {0}")]
    Transport(#[from] reqwest::Error),
    /// Non-2xx answer; `message` is the server's `error` field when present.
    #[error("{message}")]
    Api { status: u16, message: String },
}

/// HTTP side of the chat window.
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn authenticate(&self, token: &str) -> Result<AuthResponse, ClientError> {
        let body = AuthRequest {
            token: Some(token.to_string()),
        };
        let res = self
            .http
            .post(format!("{}/api/auth", self.base_url))
            .json(&body)
            .send()
            .await?;
        decode(res).await
    }

    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let res = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(req)
            .send()
            .await?;
        decode(res).await
    }

    /// Log in with a pasted token. Blank input is ignored without a request.
    /// Returns whether the session is now authenticated.
    pub async fn login(&self, session: &mut ChatSession, token: &str) -> Result<bool, ClientError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(false);
        }
        let auth = self.authenticate(token).await?;
        debug!("Logged in as {}", auth.user.id);
        session.logged_in(token.to_string(), auth);
        Ok(true)
    }

    /// Run one turn through the session. Returns false when the session
    /// refused to start a turn and nothing was sent.
    pub async fn send(&self, session: &mut ChatSession, input: &str) -> bool {
        let Some(req) = session.begin_turn(input) else {
            return false;
        };
        let result = self.chat(&req).await;
        if let Err(e) = &result {
            warn!("Chat turn failed: {}", e);
        }
        session.finish_turn(result);
        true
    }
}

async fn decode<T: serde::de::DeserializeOwned>(res: reqwest::Response) -> Result<T, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res.json::<T>().await?);
    }

    let text = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or_else(|_| format!("server returned {}", status.as_u16()));
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
