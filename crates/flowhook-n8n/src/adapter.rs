// n8n Provider Adapter
//
// Talks to n8n's public REST API (`/api/v1/workflows`, authenticated with the
// X-N8N-API-KEY header) for listing and previewing workflows, and starts runs
// by POSTing to the workflow's production webhook. The webhook node's
// `responseMode` decides whether n8n answers with the result (Completed) or
// immediately (Accepted, the workflow calls back later).

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use flowhook_core::{
    ConnectionHealth, ProviderAdapter, ProviderConnection, ProviderError, RunStartResult,
    StartRunRequest, WorkflowPreview, WorkflowSummary,
};

/// Provider tag served by this adapter
pub const PROVIDER: &str = "n8n";

const API_KEY_HEADER: &str = "X-N8N-API-KEY";
const WEBHOOK_NODE_TYPE: &str = "n8n-nodes-base.webhook";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PAGE_SIZE: u32 = 100;
const MAX_PAGES: usize = 50;

/// Credentials stored in an n8n ProviderConnection
#[derive(Deserialize)]
struct N8nCredentials {
    base_url: String,
    api_key: String,
}

impl N8nCredentials {
    fn from_connection(connection: &ProviderConnection) -> Result<Self, ProviderError> {
        let credentials: N8nCredentials =
            serde_json::from_value(connection.credentials.clone()).map_err(|_| {
                ProviderError::auth("n8n connection requires base_url and api_key")
            })?;
        if credentials.api_key.is_empty() {
            return Err(ProviderError::auth("n8n api_key is empty"));
        }
        Ok(credentials)
    }

    /// Base URL + path segments, each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::invalid_input(format!("invalid n8n base_url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::invalid_input("n8n base_url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[derive(Deserialize)]
struct WorkflowPage {
    data: Vec<N8nWorkflow>,
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct N8nWorkflow {
    id: String,
    name: String,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    nodes: Vec<N8nNode>,
}

#[derive(Deserialize)]
struct N8nNode {
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    parameters: serde_json::Value,
}

/// How the webhook trigger answers the start request
#[derive(Debug, Clone, PartialEq, Eq)]
struct WebhookTrigger {
    path: String,
    responds_with_result: bool,
}

impl N8nWorkflow {
    fn webhook_trigger(&self) -> Option<WebhookTrigger> {
        self.nodes
            .iter()
            .find(|node| node.node_type == WEBHOOK_NODE_TYPE)
            .and_then(|node| {
                let path = node.parameters.get("path")?.as_str()?.trim_matches('/');
                if path.is_empty() {
                    return None;
                }
                let mode = node
                    .parameters
                    .get("responseMode")
                    .and_then(|m| m.as_str())
                    .unwrap_or("onReceived");
                Some(WebhookTrigger {
                    path: path.to_string(),
                    responds_with_result: matches!(mode, "lastNode" | "responseNode"),
                })
            })
    }
}

/// n8n adapter
///
/// Stateless: every call reads credentials from the connection it is handed.
///
/// # Example
///
/// ```ignore
/// use flowhook_core::ProviderRegistry;
/// use flowhook_n8n::N8nAdapter;
///
/// let registry = ProviderRegistry::new().with(Arc::new(N8nAdapter::from_env()));
/// ```
#[derive(Clone)]
pub struct N8nAdapter {
    client: Client,
    timeout: Duration,
}

impl N8nAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Create an adapter honouring N8N_TIMEOUT_SECS
    pub fn from_env() -> Self {
        let timeout = std::env::var("N8N_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::new().with_timeout(Duration::from_secs(timeout))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        credentials: &N8nCredentials,
        url: Url,
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &credentials.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(network_error)?;

        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::unavailable(format!("unexpected n8n response: {}", e)))
    }

    async fn fetch_workflow(
        &self,
        credentials: &N8nCredentials,
        workflow_id: &str,
    ) -> Result<N8nWorkflow, ProviderError> {
        let url = credentials.endpoint(&["api", "v1", "workflows", workflow_id])?;
        self.get_json(credentials, url).await
    }
}

impl Default for N8nAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for N8nAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("N8nAdapter")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl ProviderAdapter for N8nAdapter {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn display_name(&self) -> &'static str {
        "n8n"
    }

    async fn list_workflows(
        &self,
        connection: &ProviderConnection,
    ) -> Result<Vec<WorkflowSummary>, ProviderError> {
        let credentials = N8nCredentials::from_connection(connection)?;
        let mut workflows = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut url = credentials.endpoint(&["api", "v1", "workflows"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &PAGE_SIZE.to_string());
                if let Some(cursor) = &cursor {
                    query.append_pair("cursor", cursor);
                }
            }

            let page: WorkflowPage = self.get_json(&credentials, url).await?;
            workflows.extend(page.data.into_iter().map(|w| WorkflowSummary {
                id: w.id,
                name: w.name,
                active: w.active,
            }));

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(workflows),
            }
        }

        warn!(
            count = workflows.len(),
            "n8n workflow listing truncated after page limit"
        );
        Ok(workflows)
    }

    async fn preview_workflow(
        &self,
        connection: &ProviderConnection,
        workflow_id: &str,
    ) -> Result<WorkflowPreview, ProviderError> {
        let credentials = N8nCredentials::from_connection(connection)?;
        let url = credentials.endpoint(&["api", "v1", "workflows", workflow_id])?;
        let raw: serde_json::Value = self.get_json(&credentials, url).await?;
        let workflow: N8nWorkflow = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::unavailable(format!("unexpected n8n response: {}", e)))?;

        Ok(WorkflowPreview {
            id: workflow.id,
            name: workflow.name,
            active: workflow.active,
            definition: serde_json::json!({
                "nodes": raw.get("nodes").cloned().unwrap_or_default(),
                "connections": raw.get("connections").cloned().unwrap_or_default(),
            }),
        })
    }

    async fn start_run(
        &self,
        connection: &ProviderConnection,
        request: StartRunRequest<'_>,
    ) -> Result<RunStartResult, ProviderError> {
        let credentials = N8nCredentials::from_connection(connection)?;
        let workflow = self.fetch_workflow(&credentials, request.workflow_id).await?;

        if !workflow.active {
            return Err(ProviderError::invalid_input(format!(
                "workflow {} is not active",
                request.workflow_id
            )));
        }
        let trigger = workflow.webhook_trigger().ok_or_else(|| {
            ProviderError::invalid_input(format!(
                "workflow {} has no webhook trigger",
                request.workflow_id
            ))
        })?;

        let mut segments = vec!["webhook"];
        segments.extend(trigger.path.split('/'));
        let url = credentials.endpoint(&segments)?;

        debug!(
            workflow_id = request.workflow_id,
            responds_with_result = trigger.responds_with_result,
            "Starting n8n workflow"
        );

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "inputs": request.inputs,
                "correlation_token": request.correlation_token,
                "callback_url": request.callback_url,
            }))
            .send()
            .await
            .map_err(network_error)?;

        let response = check_status(response).await?;
        if response.status() == StatusCode::ACCEPTED || !trigger.responds_with_result {
            return Ok(RunStartResult::Accepted);
        }

        let body = response.bytes().await.map_err(network_error)?;
        if body.is_empty() {
            return Ok(RunStartResult::Completed(serde_json::Value::Object(
                Default::default(),
            )));
        }
        let output = serde_json::from_slice(&body)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&body).into()));
        Ok(RunStartResult::Completed(output))
    }

    async fn test_connection(&self, connection: &ProviderConnection) -> ConnectionHealth {
        let credentials = match N8nCredentials::from_connection(connection) {
            Ok(credentials) => credentials,
            Err(e) => return ConnectionHealth::Unhealthy(e.to_string()),
        };

        let url = match credentials.endpoint(&["api", "v1", "workflows"]) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("limit", "1");
                url
            }
            Err(e) => return ConnectionHealth::Unhealthy(e.to_string()),
        };

        match self.get_json::<WorkflowPage>(&credentials, url).await {
            Ok(_) => ConnectionHealth::Healthy,
            Err(e) => ConnectionHealth::Unhealthy(e.to_string()),
        }
    }
}

fn network_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::unavailable("n8n request timed out")
    } else {
        ProviderError::unavailable(format!("n8n request failed: {}", e))
    }
}

/// Map n8n HTTP status codes onto provider errors
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = error_message(&body).unwrap_or_else(|| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::auth(detail),
        StatusCode::NOT_FOUND => ProviderError::NotFound(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::invalid_input(detail)
        }
        _ => ProviderError::unavailable(format!("n8n returned {}: {}", status, detail)),
    })
}

/// n8n error bodies carry a `message` field
fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flowhook_core::ConnectionStatus;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connection(base_url: &str) -> ProviderConnection {
        ProviderConnection {
            id: Uuid::now_v7(),
            workspace_id: Uuid::now_v7(),
            provider: PROVIDER.to_string(),
            credentials: json!({"base_url": base_url, "api_key": "n8n-key"}),
            status: ConnectionStatus::Active,
            last_sync: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn workflow(active: bool, response_mode: &str) -> serde_json::Value {
        json!({
            "id": "7",
            "name": "Research digest",
            "active": active,
            "nodes": [
                {"type": "n8n-nodes-base.webhook", "parameters": {"path": "digest", "responseMode": response_mode}},
                {"type": "n8n-nodes-base.httpRequest", "parameters": {}}
            ],
            "connections": {}
        })
    }

    fn request<'a>(inputs: &'a serde_json::Value) -> StartRunRequest<'a> {
        StartRunRequest {
            workflow_id: "7",
            inputs,
            correlation_token: "cbt_abc",
            callback_url: "https://hooks.example.com/orchestrator/callback/cbt_abc",
        }
    }

    #[tokio::test]
    async fn test_list_workflows_follows_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows"))
            .and(header("X-N8N-API-KEY", "n8n-key"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "2", "name": "Second", "active": false}],
                "nextCursor": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows"))
            .and(header("X-N8N-API-KEY", "n8n-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "1", "name": "First", "active": true}],
                "nextCursor": "page2"
            })))
            .mount(&server)
            .await;

        let workflows = N8nAdapter::new()
            .list_workflows(&connection(&server.uri()))
            .await
            .unwrap();

        assert_eq!(workflows.len(), 2);
        assert_eq!(workflows[0].id, "1");
        assert!(workflows[0].active);
        assert_eq!(workflows[1].name, "Second");
    }

    #[tokio::test]
    async fn test_list_workflows_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "unauthorized"})),
            )
            .mount(&server)
            .await;

        let err = N8nAdapter::new()
            .list_workflows(&connection(&server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Auth("unauthorized".to_string()));
    }

    #[tokio::test]
    async fn test_list_workflows_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = N8nAdapter::new()
            .list_workflows(&connection(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_unavailable() {
        // Nothing listens on port 9 of localhost
        let err = N8nAdapter::new()
            .with_timeout(Duration::from_secs(2))
            .list_workflows(&connection("http://127.0.0.1:9"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_preview_unknown_workflow() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows/404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let err = N8nAdapter::new()
            .preview_workflow(&connection(&server.uri()), "404")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_preview_workflow() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(workflow(true, "onReceived")))
            .mount(&server)
            .await;

        let preview = N8nAdapter::new()
            .preview_workflow(&connection(&server.uri()), "7")
            .await
            .unwrap();
        assert_eq!(preview.name, "Research digest");
        assert_eq!(preview.definition["nodes"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_start_run_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(workflow(true, "onReceived")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/webhook/digest"))
            .and(body_partial_json(json!({
                "inputs": {"topic": "x"},
                "correlation_token": "cbt_abc",
                "callback_url": "https://hooks.example.com/orchestrator/callback/cbt_abc"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"message": "Workflow was started"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let inputs = json!({"topic": "x"});
        let result = N8nAdapter::new()
            .start_run(&connection(&server.uri()), request(&inputs))
            .await
            .unwrap();
        assert_eq!(result, RunStartResult::Accepted);
    }

    #[tokio::test]
    async fn test_start_run_completed_synchronously() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(workflow(true, "lastNode")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/webhook/digest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 3})))
            .mount(&server)
            .await;

        let inputs = json!({});
        let result = N8nAdapter::new()
            .start_run(&connection(&server.uri()), request(&inputs))
            .await
            .unwrap();
        assert_eq!(result, RunStartResult::Completed(json!({"count": 3})));
    }

    #[tokio::test]
    async fn test_start_run_inactive_workflow_is_invalid_input() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(workflow(false, "onReceived")))
            .mount(&server)
            .await;

        let inputs = json!({});
        let err = N8nAdapter::new()
            .start_run(&connection(&server.uri()), request(&inputs))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_start_run_rejected_inputs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(workflow(true, "onReceived")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/webhook/digest"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"message": "topic is required"})),
            )
            .mount(&server)
            .await;

        let inputs = json!({});
        let err = N8nAdapter::new()
            .start_run(&connection(&server.uri()), request(&inputs))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::InvalidInput("topic is required".to_string()));
    }

    #[tokio::test]
    async fn test_test_connection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows"))
            .and(header("X-N8N-API-KEY", "n8n-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let adapter = N8nAdapter::new();
        assert_eq!(
            adapter.test_connection(&connection(&server.uri())).await,
            ConnectionHealth::Healthy
        );

        let mut bad = connection(&server.uri());
        bad.credentials = json!({"base_url": server.uri()});
        assert!(matches!(
            adapter.test_connection(&bad).await,
            ConnectionHealth::Unhealthy(_)
        ));
    }

    #[test]
    fn test_webhook_trigger_detection() {
        let parsed: N8nWorkflow = serde_json::from_value(workflow(true, "responseNode")).unwrap();
        assert_eq!(
            parsed.webhook_trigger(),
            Some(WebhookTrigger {
                path: "digest".to_string(),
                responds_with_result: true,
            })
        );

        let no_trigger: N8nWorkflow =
            serde_json::from_value(json!({"id": "1", "name": "Cron", "nodes": []})).unwrap();
        assert!(no_trigger.webhook_trigger().is_none());
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let credentials = N8nCredentials {
            base_url: "https://automation.example.com/n8n/".to_string(),
            api_key: "k".to_string(),
        };
        let url = credentials.endpoint(&["api", "v1", "workflows", "a b"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://automation.example.com/n8n/api/v1/workflows/a%20b"
        );
    }
}
