// Correlation tokens for provider callbacks
// Decision: Tokens are prefixed with "cbt_" for identification in provider configs
// Decision: Stored alongside a SHA-256 hash; lookups go through the hash, then a
// constant-time comparison against the stored token
//
// The token is the only credential the callback route accepts, so it carries
// 256 bits from the OS CSPRNG.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Token prefix for identification
pub const TOKEN_PREFIX: &str = "cbt_";
const TOKEN_BYTES: usize = 32; // 32 random bytes = 64 hex chars

/// Freshly generated correlation token
#[derive(Debug, Clone)]
pub struct CorrelationToken {
    /// Full token (cbt_<random>)
    pub token: String,
    /// SHA-256 hash used as the lookup key
    pub token_hash: String,
}

/// Generate a new correlation token
pub fn generate_token() -> CorrelationToken {
    let mut random_bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut random_bytes);

    let token = format!("{}{}", TOKEN_PREFIX, hex::encode(random_bytes));
    let token_hash = hash_token(&token);

    CorrelationToken { token, token_hash }
}

/// Hash a token for storage/lookup
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Short hash prefix safe to put in logs
pub fn fingerprint(token: &str) -> String {
    hash_token(token)[..12].to_string()
}

/// Validate token format without touching storage
pub fn is_valid_token_format(token: &str) -> bool {
    let Some(random_part) = token.strip_prefix(TOKEN_PREFIX) else {
        return false;
    };

    random_part.len() == TOKEN_BYTES * 2 && random_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Compare two tokens in time independent of where they first differ
pub fn tokens_match(expected: &str, presented: &str) -> bool {
    let a = expected.as_bytes();
    let b = presented.as_bytes();
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
