use serde::{Deserialize, Serialize};

use tavern_types::models::{HistoryMessage, Sender};

/// Most prior messages that are ever replayed to the provider.
pub const HISTORY_LIMIT: usize = 50;

/// Persona sent as the first entry of every prompt.
pub const SYSTEM_DIRECTIVE: &str = "You are an immersive and creative roleplay assistant. Your role is to:

1. Take part in roleplays of any genre (fantasy, science fiction, historical, modern, etc.)
2. Create convincing and engaging characters
3. Keep the narrative consistent throughout the conversation
4. Adapt to the tone and style the user wants
5. Be creative and detailed in your descriptions
6. Respect the user's limits and preferences

You can play any kind of character and setting. Be expressive and detailed, and keep the roleplay interesting and immersive.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl From<Sender> for Role {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => Role::User,
            Sender::Bot => Role::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Build the instruction sequence: system directive, then prior turns in
/// order, then the new user message. Only the last [`HISTORY_LIMIT`]
/// history entries are kept.
pub fn assemble(history: &[HistoryMessage], new_message: &str) -> Vec<PromptMessage> {
    let start = history.len().saturating_sub(HISTORY_LIMIT);
    let window = &history[start..];

    let mut messages = Vec::with_capacity(window.len() + 2);
    messages.push(PromptMessage::new(Role::System, SYSTEM_DIRECTIVE));
    messages.extend(
        window
            .iter()
            .map(|msg| PromptMessage::new(msg.sender.into(), msg.content.clone())),
    );
    messages.push(PromptMessage::new(Role::User, new_message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(sender: Sender, content: &str) -> HistoryMessage {
        HistoryMessage {
            sender,
            content: content.to_string(),
        }
    }

    #[test]
    fn alternates_roles_in_order() {
        let history = vec![turn(Sender::User, "A"), turn(Sender::Bot, "B")];
        let prompt = assemble(&history, "C");

        assert_eq!(
            prompt,
            vec![
                PromptMessage::new(Role::System, SYSTEM_DIRECTIVE),
                PromptMessage::new(Role::User, "A"),
                PromptMessage::new(Role::Assistant, "B"),
                PromptMessage::new(Role::User, "C"),
            ]
        );
    }

    #[test]
    fn empty_history_yields_system_and_user() {
        let prompt = assemble(&[], "hello");
        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[0].role, Role::System);
        assert_eq!(prompt[1], PromptMessage::new(Role::User, "hello"));
    }

    #[test]
    fn caps_history_to_most_recent_window() {
        let history: Vec<HistoryMessage> = (0..75)
            .map(|i| turn(Sender::User, &format!("m{}", i)))
            .collect();
        let prompt = assemble(&history, "last");

        assert_eq!(prompt.len(), HISTORY_LIMIT + 2);
        assert_eq!(
            prompt.iter().filter(|m| m.role == Role::System).count(),
            1
        );
        assert_eq!(prompt[1].content, "m25");
        assert_eq!(prompt[HISTORY_LIMIT].content, "m74");
        assert_eq!(prompt[HISTORY_LIMIT + 1].content, "last");
    }

    #[test]
    fn roles_serialize_for_the_wire() {
        let json = serde_json::to_value(PromptMessage::new(Role::Assistant, "x")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "x"}));
    }
}
