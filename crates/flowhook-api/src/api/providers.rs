// Provider and connection HTTP routes

use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use flowhook_core::{ConnectionHealth, ProviderConnection, WorkflowPreview, WorkflowSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{ErrorResponse, ListResponse};
use crate::auth::{AuthState, Caller};
use crate::error::ApiError;
use crate::services::ConnectionService;

/// Registered provider and the workspace's connection to it
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProviderInfo {
    #[schema(example = "n8n")]
    pub provider: String,
    #[schema(example = "n8n")]
    pub display_name: String,
    /// True when the workspace has an ACTIVE connection
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ProviderConnection>,
}

/// Request to connect a workspace to a provider
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConnectProviderRequest {
    /// Provider-specific credentials (n8n: `{"base_url": "...", "api_key": "..."}`)
    #[schema(value_type = Object, example = json!({"base_url": "https://n8n.example.com", "api_key": "n8n_api_..."}))]
    pub credentials: serde_json::Value,
}

/// Connection stored by a connect request, with the health check result
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectProviderResponse {
    pub connection: ProviderConnection,
    pub health: ConnectionHealth,
}

/// App state for provider routes
#[derive(Clone, FromRef)]
pub struct AppState {
    pub service: Arc<ConnectionService>,
    pub auth: AuthState,
}

impl AppState {
    pub fn new(service: Arc<ConnectionService>, auth: AuthState) -> Self {
        Self { service, auth }
    }
}

/// Create provider routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/orchestrator/providers", get(list_providers))
        .route(
            "/orchestrator/providers/:provider/connect",
            post(connect_provider),
        )
        .route("/orchestrator/providers/:provider/test", post(test_provider))
        .route(
            "/orchestrator/providers/:provider/workflows",
            get(list_workflows),
        )
        .route(
            "/orchestrator/providers/:provider/workflows/:workflow_id",
            get(preview_workflow),
        )
        .route("/orchestrator/connections", get(list_connections))
        .route("/orchestrator/connections/:id", delete(delete_connection))
        .with_state(state)
}

/// GET /orchestrator/providers - List providers and connection state
#[utoipa::path(
    get,
    path = "/orchestrator/providers",
    responses(
        (status = 200, description = "Registered providers", body = ListResponse<ProviderInfo>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "providers"
)]
pub async fn list_providers(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ListResponse<ProviderInfo>>, ApiError> {
    let providers = state
        .service
        .list_providers(caller.workspace_id)
        .await?
        .into_iter()
        .map(|entry| ProviderInfo {
            provider: entry.provider.to_string(),
            display_name: entry.display_name.to_string(),
            connected: entry.connection.as_ref().is_some_and(|c| c.is_active()),
            connection: entry.connection,
        })
        .collect();
    Ok(Json(ListResponse::new(providers)))
}

/// POST /orchestrator/providers/:provider/connect - Store credentials and verify them
#[utoipa::path(
    post,
    path = "/orchestrator/providers/{provider}/connect",
    params(("provider" = String, Path, description = "Provider tag")),
    request_body = ConnectProviderRequest,
    responses(
        (status = 200, description = "Connection stored", body = ConnectProviderResponse),
        (status = 400, description = "Unknown provider or invalid credentials", body = ErrorResponse)
    ),
    tag = "providers"
)]
pub async fn connect_provider(
    State(state): State<AppState>,
    caller: Caller,
    Path(provider): Path<String>,
    Json(req): Json<ConnectProviderRequest>,
) -> Result<Json<ConnectProviderResponse>, ApiError> {
    let (connection, health) = state
        .service
        .connect(caller.workspace_id, &provider, req.credentials)
        .await?;
    Ok(Json(ConnectProviderResponse { connection, health }))
}

/// POST /orchestrator/providers/:provider/test - Re-check a connection
#[utoipa::path(
    post,
    path = "/orchestrator/providers/{provider}/test",
    params(("provider" = String, Path, description = "Provider tag")),
    responses(
        (status = 200, description = "Health check result", body = ConnectionHealth),
        (status = 412, description = "Workspace has no connection", body = ErrorResponse)
    ),
    tag = "providers"
)]
pub async fn test_provider(
    State(state): State<AppState>,
    caller: Caller,
    Path(provider): Path<String>,
) -> Result<Json<ConnectionHealth>, ApiError> {
    let health = state.service.test(caller.workspace_id, &provider).await?;
    Ok(Json(health))
}

/// GET /orchestrator/providers/:provider/workflows - List provider workflows
#[utoipa::path(
    get,
    path = "/orchestrator/providers/{provider}/workflows",
    params(("provider" = String, Path, description = "Provider tag")),
    responses(
        (status = 200, description = "Workflows on the provider", body = ListResponse<WorkflowSummary>),
        (status = 412, description = "No active provider connection", body = ErrorResponse),
        (status = 502, description = "Provider failed", body = ErrorResponse)
    ),
    tag = "providers"
)]
pub async fn list_workflows(
    State(state): State<AppState>,
    caller: Caller,
    Path(provider): Path<String>,
) -> Result<Json<ListResponse<WorkflowSummary>>, ApiError> {
    let workflows = state
        .service
        .list_workflows(caller.workspace_id, &provider)
        .await?;
    Ok(Json(ListResponse::new(workflows)))
}

/// GET /orchestrator/providers/:provider/workflows/:workflow_id - Preview a workflow
#[utoipa::path(
    get,
    path = "/orchestrator/providers/{provider}/workflows/{workflow_id}",
    params(
        ("provider" = String, Path, description = "Provider tag"),
        ("workflow_id" = String, Path, description = "Workflow ID on the provider")
    ),
    responses(
        (status = 200, description = "Workflow preview", body = WorkflowPreview),
        (status = 404, description = "Workflow not found", body = ErrorResponse),
        (status = 412, description = "No active provider connection", body = ErrorResponse)
    ),
    tag = "providers"
)]
pub async fn preview_workflow(
    State(state): State<AppState>,
    caller: Caller,
    Path((provider, workflow_id)): Path<(String, String)>,
) -> Result<Json<WorkflowPreview>, ApiError> {
    let preview = state
        .service
        .preview_workflow(caller.workspace_id, &provider, &workflow_id)
        .await?;
    Ok(Json(preview))
}

/// GET /orchestrator/connections - List the workspace's connections
#[utoipa::path(
    get,
    path = "/orchestrator/connections",
    responses(
        (status = 200, description = "Connections (credentials omitted)", body = ListResponse<ProviderConnection>)
    ),
    tag = "providers"
)]
pub async fn list_connections(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ListResponse<ProviderConnection>>, ApiError> {
    let connections = state.service.list_connections(caller.workspace_id).await?;
    Ok(Json(ListResponse::new(connections)))
}

/// DELETE /orchestrator/connections/:id - Remove a connection
#[utoipa::path(
    delete,
    path = "/orchestrator/connections/{id}",
    params(("id" = Uuid, Path, description = "Connection ID")),
    responses(
        (status = 204, description = "Connection deleted"),
        (status = 404, description = "Connection not found", body = ErrorResponse)
    ),
    tag = "providers"
)]
pub async fn delete_connection(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.delete(caller.workspace_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
