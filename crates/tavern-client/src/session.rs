use chrono::{DateTime, Utc};

use tavern_types::api::{AuthResponse, AuthUser, ChatRequest, ChatResponse, HistoryEntry};
use tavern_types::models::Sender;

/// One bubble in the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMessage {
    pub id: u64,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    /// Rendered distinctly; never replayed to the model.
    pub is_error: bool,
}

#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<DisplayMessage>,
    token: Option<String>,
    user: Option<AuthUser>,
    conversation_id: Option<String>,
    typing: bool,
    next_id: u64,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// True while a turn is awaiting the server.
    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn logged_in(&mut self, token: String, auth: AuthResponse) {
        let greeting = format!(
            "Hello, {}! Welcome to your immersive roleplay chatbot. How can I help you today?",
            auth.user.name
        );
        self.token = Some(token);
        self.user = Some(auth.user);
        self.conversation_id = None;
        self.messages.clear();
        self.push(Sender::Bot, greeting, false);
    }

    pub fn logout(&mut self) {
        *self = Self {
            next_id: self.next_id,
            ..Self::default()
        };
    }

    /// Start over locally. The next turn opens a new server-side conversation.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.conversation_id = None;
        self.push(
            Sender::Bot,
            "Chat cleared! Let's start a new conversation. How can I help you?".to_string(),
            false,
        );
    }

    /// Optimistically append the user's message and show the typing
    /// indicator. Returns the request to send, or `None` when nothing
    /// should go over the wire: blank input, no login, or a turn already
    /// in flight.
    pub fn begin_turn(&mut self, input: &str) -> Option<ChatRequest> {
        if input.trim().is_empty() || self.typing {
            return None;
        }
        let token = self.token.clone()?;

        let history = self
            .messages
            .iter()
            .map(|m| HistoryEntry {
                sender: m.sender,
                text: m.text.clone(),
                is_error: m.is_error,
            })
            .collect();

        self.push(Sender::User, input.to_string(), false);
        self.typing = true;

        Some(ChatRequest {
            message: Some(input.to_string()),
            history: Some(history),
            conversation_id: self.conversation_id.clone(),
            user_token: Some(token),
        })
    }

    /// Replace the typing indicator with the reply, or with an error bubble.
    /// Failed turns are not retried; the user has to send again.
    pub fn finish_turn<E: std::fmt::Display>(&mut self, result: Result<ChatResponse, E>) {
        self.typing = false;
        match result {
            Ok(reply) => {
                if reply.conversation_id.is_some() {
                    self.conversation_id = reply.conversation_id;
                }
                self.push(Sender::Bot, reply.response, false);
            }
            Err(e) => {
                let text = format!("Sorry, an error occurred: {}. Please try again.", e);
                self.push(Sender::Bot, text, true);
            }
        }
    }

    fn push(&mut self, sender: Sender, text: String, is_error: bool) {
        self.next_id += 1;
        self.messages.push(DisplayMessage {
            id: self.next_id,
            text,
            sender,
            timestamp: Utc::now(),
            is_error,
        });
    }
}
