// Server configuration loaded from environment variables

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:9300";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_address: String,
    /// Example: API_PREFIX="/api" results in routes like /api/orchestrator
    pub api_prefix: String,
    /// Run the timeout sweeper inside the API process
    pub sweeper_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            api_prefix: String::new(),
            sweeper_enabled: true,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: std::env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            api_prefix: std::env::var("API_PREFIX").unwrap_or(defaults.api_prefix),
            sweeper_enabled: std::env::var("SWEEPER_ENABLED")
                .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no"))
                .unwrap_or(defaults.sweeper_enabled),
        }
    }
}
