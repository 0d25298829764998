use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion provider API key is not configured")]
    MissingApiKey,

    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion provider returned an unexpected payload ({status}): {body}")]
    MalformedResponse { status: u16, body: String },
}

impl CompletionError {
    /// Upstream HTTP status, when the provider answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::MalformedResponse { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::MissingApiKey => None,
        }
    }
}
