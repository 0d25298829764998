use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum TokenHashError {
    #[error("token pepper must not be empty")]
    EmptyPepper,
    #[error("invalid token pepper: {0}")]
    InvalidKey(#[from] hmac::digest::InvalidLength),
}

/// Prefix on issued tokens so they are recognisable in logs and config files.
pub const TOKEN_PREFIX: &str = "tvn_";

/// Generate a fresh bearer token: prefix + 256 random bits, base64url.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("{}{}", TOKEN_PREFIX, BASE64.encode(bytes))
}

/// Keyed one-way digest of a bearer token, hex encoded.
///
/// Deterministic for a given pepper so `access_tokens.token_hash` can be
/// looked up by equality.
pub fn hash_token(pepper: &[u8], token: &str) -> Result<String, TokenHashError> {
    if pepper.is_empty() {
        return Err(TokenHashError::EmptyPepper);
    }
    let mut mac = HmacSha256::new_from_slice(pepper)?;
    mac.update(token.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
