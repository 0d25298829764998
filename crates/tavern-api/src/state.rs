use std::fmt::Display;
use std::sync::Arc;

use anyhow::anyhow;
use tavern_completion::CompletionClient;
use tavern_db::Database;
use tracing::error;

use crate::error::ApiError;
use crate::validator::TokenValidator;

pub type AppState = Arc<AppStateInner>;

/// Everything a request handler needs. Built once at startup; handlers
/// hold no other state between requests.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub validator: TokenValidator,
    pub completion: CompletionClient,
    /// Attach upstream error text to 500 responses. Off in production.
    pub expose_error_details: bool,
}

impl AppStateInner {
    /// Log a failure at the handler boundary and turn it into a 500.
    pub fn internal(&self, message: &str, cause: impl Display) -> ApiError {
        error!("{}: {}", message, cause);
        ApiError::Internal {
            message: message.to_string(),
            details: self.expose_error_details.then(|| cause.to_string()),
        }
    }
}

/// Run a blocking store call off the async runtime.
pub async fn db_call<F, T>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
}
