// Authentication configuration loaded from environment variables.
// Decision: Default to "none" mode for local development

use std::collections::HashSet;

use super::api_key::{hash_api_key, is_valid_api_key_format};

/// Authentication mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// No authentication required (local development)
    #[default]
    None,
    /// Static API keys from API_KEYS
    ApiKey,
}

impl AuthMode {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "api_key" | "apikey" => AuthMode::ApiKey,
            _ => AuthMode::None,
        }
    }
}

/// Complete authentication configuration
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// SHA-256 hashes of accepted API keys
    api_key_hashes: HashSet<String>,
}

impl AuthConfig {
    /// Load configuration from environment variables
    ///
    /// - AUTH_MODE: none (default) | api_key
    /// - API_KEYS: comma-separated fhk_ keys
    pub fn from_env() -> Self {
        let mode = std::env::var("AUTH_MODE")
            .map(|s| AuthMode::parse(&s))
            .unwrap_or_default();

        let keys = std::env::var("API_KEYS").unwrap_or_default();
        keys.split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .fold(Self::default().with_mode(mode), |config, key| {
                if is_valid_api_key_format(key) {
                    config.with_api_key(key)
                } else {
                    tracing::warn!("Ignoring malformed entry in API_KEYS");
                    config
                }
            })
    }

    pub fn with_mode(mut self, mode: AuthMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key_hashes.insert(hash_api_key(key));
        self
    }

    pub fn api_key_count(&self) -> usize {
        self.api_key_hashes.len()
    }

    pub fn accepts_api_key(&self, key: &str) -> bool {
        is_valid_api_key_format(key) && self.api_key_hashes.contains(&hash_api_key(key))
    }
}
