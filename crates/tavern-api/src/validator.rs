use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use tavern_crypto::token::TokenHashError;
use tavern_db::Database;
use tavern_db::models::{TokenLookupRow, UserProfile};
use tavern_types::api::EntitlementIdentity;
use tavern_types::models::{AuthenticatedUser, SubscriptionStatus, Tier};

use crate::entitlement::{EntitlementClient, EntitlementError};
use crate::state::db_call;

/// Validity window reported for allow-listed development users.
const DEV_VALIDITY_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token not recognized")]
    NotRecognized,

    #[error("expired")]
    Expired,

    /// The entitlement authority knows the token but the subscription is not active.
    #[error("subscription inactive")]
    Inactive,

    #[error(transparent)]
    Hash(#[from] TokenHashError),

    #[error("token store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error(transparent)]
    Entitlement(#[from] EntitlementError),
}

#[derive(Debug, Clone)]
pub struct DevUser {
    pub id: String,
    pub name: String,
    pub tier: Tier,
}

/// Maps a bearer token to a user. Sources are tried in order: the static
/// development allow-list, the hashed `access_tokens` table, and finally
/// the entitlement authority when one is configured.
pub struct TokenValidator {
    dev_tokens: HashMap<String, DevUser>,
    pepper: Vec<u8>,
    entitlement: Option<EntitlementClient>,
}

impl TokenValidator {
    pub fn new(pepper: impl Into<Vec<u8>>) -> Self {
        Self {
            dev_tokens: HashMap::new(),
            pepper: pepper.into(),
            entitlement: None,
        }
    }

    /// Enable the two built-in development tokens.
    pub fn with_dev_tokens(self) -> Self {
        self.with_dev_token("test-token-123", "user_123", "Test User", Tier::Basic)
            .with_dev_token("premium-token-456", "user_456", "Premium User", Tier::Premium)
    }

    pub fn with_dev_token(mut self, token: &str, id: &str, name: &str, tier: Tier) -> Self {
        self.dev_tokens.insert(
            token.to_string(),
            DevUser {
                id: id.to_string(),
                name: name.to_string(),
                tier,
            },
        );
        self
    }

    pub fn with_entitlement(mut self, client: EntitlementClient) -> Self {
        self.entitlement = Some(client);
        self
    }

    pub fn hash(&self, token: &str) -> Result<String, TokenHashError> {
        tavern_crypto::token::hash_token(&self.pepper, token)
    }

    pub async fn validate(&self, db: &Arc<Database>, token: &str) -> Result<AuthenticatedUser, AuthError> {
        if let Some(dev) = self.dev_tokens.get(token) {
            debug!("Token matched development allow-list ({})", dev.id);
            let user = AuthenticatedUser {
                id: dev.id.clone(),
                name: dev.name.clone(),
                tier: dev.tier,
                subscription_status: SubscriptionStatus::Active,
                valid_until: Utc::now() + Duration::days(DEV_VALIDITY_DAYS),
            };
            record_login(db, &user, None, false).await?;
            return Ok(user);
        }

        let token_hash = self.hash(token)?;
        let lookup = db_call(db, move |db| db.find_access_token(&token_hash)).await?;

        match lookup {
            Some(row) if row.is_active => return from_store(db, row).await,
            Some(_) => debug!("Token is deactivated"),
            None => debug!("Token not found in store"),
        }

        if let Some(entitlement) = &self.entitlement {
            if let Some(identity) = entitlement.identify(token).await? {
                let email = identity.email.clone();
                let user = from_identity(identity)?;
                record_login(db, &user, email.as_deref(), true).await?;
                return Ok(user);
            }
        }

        Err(AuthError::NotRecognized)
    }
}

async fn from_store(db: &Arc<Database>, row: TokenLookupRow) -> Result<AuthenticatedUser, AuthError> {
    let expires_at = tavern_db::parse_ts(&row.expires_at)?;
    if expires_at <= Utc::now() {
        debug!("Token {} expired at {}", row.token_id, row.expires_at);
        return Err(AuthError::Expired);
    }

    let tier = row.user.tier.parse().unwrap_or_else(|e| {
        warn!("User {} has {}; treating as basic", row.user.id, e);
        Tier::Basic
    });
    let subscription_status = row.user.subscription_status.parse().unwrap_or_else(|e| {
        warn!("User {} has {}; treating as inactive", row.user.id, e);
        SubscriptionStatus::Inactive
    });
    let valid_until = row
        .user
        .subscription_expires_at
        .as_deref()
        .and_then(|raw| tavern_db::parse_ts(raw).ok())
        .unwrap_or(expires_at);

    let user = AuthenticatedUser {
        id: row.user.id,
        name: row.user.name,
        tier,
        subscription_status,
        valid_until,
    };

    let token_id = row.token_id;
    let user_id = user.id.clone();
    if let Err(e) = db_call(db, move |db| {
        db.touch_access_token(&token_id)?;
        db.touch_last_login(&user_id)
    })
    .await
    {
        warn!("Failed to record token use for {}: {}", user.id, e);
    }

    Ok(user)
}

/// A 200 from the authority only counts while the subscription is active and
/// unexpired. A missing status means active.
fn from_identity(identity: EntitlementIdentity) -> Result<AuthenticatedUser, AuthError> {
    let subscription_status = identity
        .subscription_status
        .unwrap_or(SubscriptionStatus::Active);
    if subscription_status != SubscriptionStatus::Active {
        debug!("Authority reports {} as {}", identity.id, subscription_status.as_str());
        return Err(AuthError::Inactive);
    }
    if identity.valid_until <= Utc::now() {
        debug!("Authority reports {} lapsed at {}", identity.id, identity.valid_until);
        return Err(AuthError::Expired);
    }

    Ok(AuthenticatedUser {
        id: identity.id,
        name: identity.name,
        tier: identity.tier,
        subscription_status,
        valid_until: identity.valid_until,
    })
}

/// Create or refresh the `users` row for an identity that did not come
/// from the store.
async fn record_login(
    db: &Arc<Database>,
    user: &AuthenticatedUser,
    email: Option<&str>,
    with_expiry: bool,
) -> anyhow::Result<()> {
    let id = user.id.clone();
    let name = user.name.clone();
    let email = email.map(str::to_string);
    let tier = user.tier;
    let status = user.subscription_status;
    let expires = with_expiry.then(|| tavern_db::format_ts(user.valid_until));
    db_call(db, move |db| {
        db.upsert_user(&UserProfile {
            id: &id,
            name: &name,
            email: email.as_deref(),
            tier: tier.as_str(),
            subscription_status: status.as_str(),
            subscription_expires_at: expires.as_deref(),
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<Database>, TokenValidator) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let validator = TokenValidator::new(b"test-pepper".to_vec()).with_dev_tokens();
        (db, validator)
    }

    fn issue(db: &Database, validator: &TokenValidator, token: &str, expires_in: Duration) -> String {
        db.upsert_user(&UserProfile {
            id: "stored_user",
            name: "Stored User",
            email: None,
            tier: "premium",
            subscription_status: "active",
            subscription_expires_at: None,
        })
        .unwrap();
        let expires = tavern_db::format_ts(Utc::now() + expires_in);
        db.create_access_token("stored_user", &validator.hash(token).unwrap(), &expires)
            .unwrap()
    }

    #[tokio::test]
    async fn dev_tokens_return_fixed_identities() {
        let (db, validator) = setup();

        let basic = validator.validate(&db, "test-token-123").await.unwrap();
        assert_eq!(basic.id, "user_123");
        assert_eq!(basic.tier, Tier::Basic);

        let premium = validator.validate(&db, "premium-token-456").await.unwrap();
        assert_eq!(premium.id, "user_456");
        assert_eq!(premium.tier, Tier::Premium);

        // first validation creates the user row
        assert!(db.get_user("user_123").unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_tokens_are_rejected() {
        let (db, validator) = setup();
        for token in ["", "test-token-12", "TEST-TOKEN-123", "random"] {
            let err = validator.validate(&db, token).await.unwrap_err();
            assert!(matches!(err, AuthError::NotRecognized), "{token}");
        }
    }

    #[tokio::test]
    async fn stored_token_resolves_user_and_records_use() {
        let (db, validator) = setup();
        issue(&db, &validator, "tvn_stored", Duration::days(7));

        let user = validator.validate(&db, "tvn_stored").await.unwrap();
        assert_eq!(user.id, "stored_user");
        assert_eq!(user.tier, Tier::Premium);
        assert_eq!(user.subscription_status, SubscriptionStatus::Active);

        let hash = validator.hash("tvn_stored").unwrap();
        let row = db.find_access_token(&hash).unwrap().unwrap();
        assert!(row.user.last_login.is_some());
    }

    #[tokio::test]
    async fn expired_and_deactivated_tokens_fail() {
        let (db, validator) = setup();
        issue(&db, &validator, "tvn_old", -Duration::hours(1));
        let err = validator.validate(&db, "tvn_old").await.unwrap_err();
        assert!(matches!(err, AuthError::Expired));
        assert_eq!(err.to_string(), "expired");

        let id = issue(&db, &validator, "tvn_revoked", Duration::days(1));
        db.deactivate_access_token(&id).unwrap();
        let err = validator.validate(&db, "tvn_revoked").await.unwrap_err();
        assert!(matches!(err, AuthError::NotRecognized));
    }

    fn identity(status: Option<SubscriptionStatus>, valid_until: chrono::DateTime<Utc>) -> EntitlementIdentity {
        EntitlementIdentity {
            id: "patron_1".into(),
            name: "Patron".into(),
            tier: Tier::Premium,
            valid_until,
            subscription_status: status,
            email: None,
        }
    }

    #[test]
    fn authority_identity_must_be_active_and_current() {
        let later = Utc::now() + Duration::days(30);
        let earlier = Utc::now() - Duration::days(1);

        let user = from_identity(identity(None, later)).unwrap();
        assert_eq!(user.subscription_status, SubscriptionStatus::Active);
        assert!(from_identity(identity(Some(SubscriptionStatus::Active), later)).is_ok());

        for status in [SubscriptionStatus::Cancelled, SubscriptionStatus::Inactive] {
            let err = from_identity(identity(Some(status), later)).unwrap_err();
            assert!(matches!(err, AuthError::Inactive));
        }

        let err = from_identity(identity(Some(SubscriptionStatus::Active), earlier)).unwrap_err();
        assert!(matches!(err, AuthError::Expired));
    }

    #[tokio::test]
    async fn dev_tokens_are_opt_in() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let validator = TokenValidator::new(b"test-pepper".to_vec());
        let err = validator.validate(&db, "test-token-123").await.unwrap_err();
        assert!(matches!(err, AuthError::NotRecognized));
    }
}
