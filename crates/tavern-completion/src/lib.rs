//! Prompt assembly and the completion-provider HTTP client.

pub mod client;
pub mod error;
pub mod prompt;

pub use client::{Completion, CompletionClient, CompletionConfig};
pub use error::CompletionError;
pub use prompt::{PromptMessage, Role, assemble};
