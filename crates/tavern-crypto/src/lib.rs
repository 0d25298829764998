/// Tavern Crypto Library
///
/// Bearer tokens are opaque random strings handed to the client once.
/// The store only ever sees their keyed SHA-256 digest, so a leaked
/// `access_tokens` table cannot be replayed without the server pepper.

pub mod token;
