// Provider Adapter abstraction
//
// One adapter per external automation provider. Adapters are stateless: all
// provider-specific request/response shaping stays inside the adapter, and
// credentials reach them only through the ProviderConnection they are handed.
//
// Design: Dependency inversion - provider crates (flowhook-n8n) depend on core
// and are registered in a ProviderRegistry at startup, keyed by provider tag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::connection::ProviderConnection;
use crate::error::{OrchestratorError, ProviderError};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Workflow listed by a provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub active: bool,
}

/// Detailed view of a single provider workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct WorkflowPreview {
    pub id: String,
    pub name: String,
    pub active: bool,
    /// Provider-native graph description
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub definition: serde_json::Value,
}

/// Everything an adapter needs to start a run
#[derive(Debug, Clone)]
pub struct StartRunRequest<'a> {
    pub workflow_id: &'a str,
    pub inputs: &'a serde_json::Value,
    pub correlation_token: &'a str,
    pub callback_url: &'a str,
}

/// Result of dispatching a run to a provider
#[derive(Debug, Clone, PartialEq)]
pub enum RunStartResult {
    /// Provider finished synchronously
    Completed(serde_json::Value),
    /// Provider will call back later
    Accepted,
}

/// Health of a provider connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ConnectionHealth {
    Healthy,
    Unhealthy(String),
}

/// Interpretation of a provider callback body
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Succeeded(serde_json::Value),
    Failed(String),
}

/// Trait implemented once per provider
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider tag this adapter serves (e.g. "n8n")
    fn provider(&self) -> &'static str;

    /// Human readable provider name
    fn display_name(&self) -> &'static str {
        self.provider()
    }

    async fn list_workflows(
        &self,
        connection: &ProviderConnection,
    ) -> Result<Vec<WorkflowSummary>, ProviderError>;

    async fn preview_workflow(
        &self,
        connection: &ProviderConnection,
        workflow_id: &str,
    ) -> Result<WorkflowPreview, ProviderError>;

    async fn start_run(
        &self,
        connection: &ProviderConnection,
        request: StartRunRequest<'_>,
    ) -> Result<RunStartResult, ProviderError>;

    async fn test_connection(&self, connection: &ProviderConnection) -> ConnectionHealth;

    /// Parse a callback body delivered by this provider.
    ///
    /// The default understands the common schema:
    /// `{"result": "ok", "output": {...}}` or `{"result": "error", "error": "..."}`.
    fn parse_callback(&self, body: &[u8]) -> Result<CallbackOutcome, ProviderError> {
        parse_standard_callback(body)
    }
}

#[derive(Deserialize)]
struct StandardCallback {
    result: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Parse the `{"result": ..}` callback schema shared by most providers
pub fn parse_standard_callback(body: &[u8]) -> Result<CallbackOutcome, ProviderError> {
    let callback: StandardCallback = serde_json::from_slice(body)
        .map_err(|e| ProviderError::payload(format!("invalid callback body: {}", e)))?;

    match callback.result.to_ascii_lowercase().as_str() {
        "ok" | "success" | "succeeded" => Ok(CallbackOutcome::Succeeded(
            callback
                .output
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
        )),
        "error" | "failed" | "failure" => {
            let reason = match callback.error {
                Some(serde_json::Value::String(message)) => message,
                Some(other) => other.to_string(),
                None => "provider reported failure".to_string(),
            };
            Ok(CallbackOutcome::Failed(reason))
        }
        other => Err(ProviderError::payload(format!(
            "unrecognised callback result '{}'",
            other
        ))),
    }
}

/// Registry of provider adapters keyed by provider tag
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: BTreeMap<&'static str, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own provider tag
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    /// Builder-style registration
    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Look up the adapter for a provider tag
    pub fn get(&self, provider: &str) -> Result<Arc<dyn ProviderAdapter>, OrchestratorError> {
        self.adapters
            .get(provider)
            .cloned()
            .ok_or_else(|| OrchestratorError::ProviderNotSupported(provider.to_string()))
    }

    pub fn has_provider(&self, provider: &str) -> bool {
        self.adapters.contains_key(provider)
    }

    /// Registered providers as (tag, display name), sorted by tag
    pub fn providers(&self) -> Vec<(&'static str, &'static str)> {
        self.adapters
            .values()
            .map(|adapter| (adapter.provider(), adapter.display_name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ScriptedProvider;
    use serde_json::json;

    #[test]
    fn test_parse_success_callback() {
        let body = json!({"result": "ok", "output": {"count": 3}}).to_string();
        let outcome = parse_standard_callback(body.as_bytes()).unwrap();
        assert_eq!(outcome, CallbackOutcome::Succeeded(json!({"count": 3})));
    }

    #[test]
    fn test_parse_success_without_output() {
        let outcome = parse_standard_callback(br#"{"result":"success"}"#).unwrap();
        assert_eq!(outcome, CallbackOutcome::Succeeded(json!({})));
    }

    #[test]
    fn test_parse_failure_callback() {
        let outcome =
            parse_standard_callback(br#"{"result":"error","error":"node 3 crashed"}"#).unwrap();
        assert_eq!(outcome, CallbackOutcome::Failed("node 3 crashed".to_string()));

        let outcome =
            parse_standard_callback(br#"{"result":"failed","error":{"code":42}}"#).unwrap();
        assert_eq!(outcome, CallbackOutcome::Failed(r#"{"code":42}"#.to_string()));
    }

    #[test]
    fn test_parse_malformed_callback() {
        assert!(matches!(
            parse_standard_callback(b"not json"),
            Err(ProviderError::PayloadParse(_))
        ));
        assert!(matches!(
            parse_standard_callback(br#"{"output":{}}"#),
            Err(ProviderError::PayloadParse(_))
        ));
        assert!(matches!(
            parse_standard_callback(br#"{"result":"maybe"}"#),
            Err(ProviderError::PayloadParse(_))
        ));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ProviderRegistry::new().with(Arc::new(ScriptedProvider::accepting()));

        assert!(registry.has_provider(ScriptedProvider::PROVIDER));
        assert!(registry.get(ScriptedProvider::PROVIDER).is_ok());
        assert!(matches!(
            registry.get("zapier"),
            Err(OrchestratorError::ProviderNotSupported(_))
        ));
        assert_eq!(registry.providers().len(), 1);
    }

    #[test]
    fn test_connection_health_serialization() {
        assert_eq!(
            serde_json::to_value(ConnectionHealth::Healthy).unwrap(),
            json!({"status": "healthy"})
        );
        assert_eq!(
            serde_json::to_value(ConnectionHealth::Unhealthy("401".into())).unwrap(),
            json!({"status": "unhealthy", "reason": "401"})
        );
    }
}
