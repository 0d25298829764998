//! Headless model of the browser chat window.
//!
//! [`ChatSession`] holds the transcript the user sees; it is a local view,
//! not the source of truth. [`ChatClient`] talks to `/api/auth` and
//! `/api/chat` and drives a session through one turn at a time.

pub mod client;
pub mod session;

pub use client::{ChatClient, ClientError};
pub use session::{ChatSession, DisplayMessage};
