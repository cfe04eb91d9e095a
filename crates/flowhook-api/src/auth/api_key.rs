// API keys for programmatic access
// Decision: API keys are prefixed with "fhk_" for identification
// Decision: Keys come from the API_KEYS environment variable and are held only as SHA-256 hashes

use sha2::{Digest, Sha256};

/// API key prefix for identification
pub const API_KEY_PREFIX: &str = "fhk_";
const API_KEY_LENGTH: usize = 32; // 32 random bytes = 64 hex chars

/// Hash an API key for in-memory lookup
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Validate API key format
pub fn is_valid_api_key_format(key: &str) -> bool {
    let Some(key_part) = key.strip_prefix(API_KEY_PREFIX) else {
        return false;
    };

    key_part.len() == API_KEY_LENGTH * 2 && key_part.chars().all(|c| c.is_ascii_hexdigit())
}
