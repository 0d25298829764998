use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use tavern_types::api::EntitlementIdentity;

#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("entitlement request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("entitlement authority returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Asks the subscription platform who a bearer token belongs to.
#[derive(Clone)]
pub struct EntitlementClient {
    http: Client,
    url: String,
}

impl EntitlementClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }

    /// `Ok(None)` when the authority rejects the token.
    pub async fn identify(&self, token: &str) -> Result<Option<EntitlementIdentity>, EntitlementError> {
        let response = self.http.get(&self.url).bearer_auth(token).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!("Entitlement authority rejected token ({})", status);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Entitlement authority returned {}", status);
            return Err(EntitlementError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Some(response.json::<EntitlementIdentity>().await?))
    }
}
