// Orchestrator definition and run HTTP routes
//
// Definitions and runs belong to a workspace; anything owned by another
// workspace is answered with 404 so ids cannot be probed.

use axum::{
    body::Bytes,
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use flowhook_core::{
    NewOrchestrator, OrchestratorDefinition, OrchestratorError, OrchestratorRegistry, Run,
    RunCoordinator,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{ErrorResponse, ListResponse};
use crate::auth::{AuthState, Caller};
use crate::error::ApiError;

/// Request to publish an orchestrator definition
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOrchestratorRequest {
    /// Display name
    #[schema(example = "Research digest")]
    pub name: String,
    /// Provider tag of a registered provider
    #[schema(example = "n8n")]
    pub provider: String,
    /// Workflow identifier on the provider side
    #[schema(example = "12")]
    pub workflow_id: String,
    /// Opaque workflow spec stored alongside the definition
    #[serde(default)]
    #[schema(value_type = Object)]
    pub definition: serde_json::Value,
}

/// App state for orchestrator routes
#[derive(Clone, FromRef)]
pub struct AppState {
    pub coordinator: Arc<RunCoordinator>,
    pub registry: Arc<dyn OrchestratorRegistry>,
    pub auth: AuthState,
}

impl AppState {
    pub fn new(
        coordinator: Arc<RunCoordinator>,
        registry: Arc<dyn OrchestratorRegistry>,
        auth: AuthState,
    ) -> Self {
        Self {
            coordinator,
            registry,
            auth,
        }
    }
}

/// Create orchestrator routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/orchestrator",
            post(create_orchestrator).get(list_orchestrators),
        )
        .route("/orchestrator/:id", get(get_orchestrator))
        .route("/orchestrator/:id/run", post(start_run))
        .route("/orchestrator/:id/runs", get(list_runs))
        .route("/orchestrator/runs/:run_id", get(get_run))
        .with_state(state)
}

async fn owned_definition(
    state: &AppState,
    caller: &Caller,
    id: Uuid,
) -> Result<OrchestratorDefinition, ApiError> {
    match state.registry.get_orchestrator(id).await? {
        Some(definition) if definition.workspace_id == caller.workspace_id => Ok(definition),
        _ => Err(OrchestratorError::DefinitionNotFound(id).into()),
    }
}

/// POST /orchestrator - Publish a definition
#[utoipa::path(
    post,
    path = "/orchestrator",
    request_body = CreateOrchestratorRequest,
    responses(
        (status = 201, description = "Definition created", body = OrchestratorDefinition),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "orchestrators"
)]
pub async fn create_orchestrator(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateOrchestratorRequest>,
) -> Result<(StatusCode, Json<OrchestratorDefinition>), ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    if req.workflow_id.trim().is_empty() {
        return Err(ApiError::bad_request("workflow_id is required"));
    }
    if !state.coordinator.providers().has_provider(&req.provider) {
        return Err(OrchestratorError::ProviderNotSupported(req.provider).into());
    }

    let definition = state
        .registry
        .create_orchestrator(NewOrchestrator {
            workspace_id: caller.workspace_id,
            name: name.to_string(),
            provider: req.provider,
            workflow_id: req.workflow_id.trim().to_string(),
            definition: req.definition,
        })
        .await?;

    tracing::info!(
        orchestrator_id = %definition.id,
        provider = %definition.provider,
        auth_method = ?caller.auth_method,
        "Orchestrator created"
    );
    Ok((StatusCode::CREATED, Json(definition)))
}

/// GET /orchestrator - List the workspace's definitions
#[utoipa::path(
    get,
    path = "/orchestrator",
    responses(
        (status = 200, description = "Definitions, newest first", body = ListResponse<OrchestratorDefinition>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "orchestrators"
)]
pub async fn list_orchestrators(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ListResponse<OrchestratorDefinition>>, ApiError> {
    let definitions = state
        .registry
        .list_orchestrators(caller.workspace_id)
        .await?;
    Ok(Json(ListResponse::new(definitions)))
}

/// GET /orchestrator/:id - Fetch a definition
#[utoipa::path(
    get,
    path = "/orchestrator/{id}",
    params(("id" = Uuid, Path, description = "Orchestrator ID")),
    responses(
        (status = 200, description = "Definition found", body = OrchestratorDefinition),
        (status = 404, description = "Definition not found", body = ErrorResponse)
    ),
    tag = "orchestrators"
)]
pub async fn get_orchestrator(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<OrchestratorDefinition>, ApiError> {
    Ok(Json(owned_definition(&state, &caller, id).await?))
}

/// POST /orchestrator/:id/run - Start a run
///
/// The body is passed to the provider as the run inputs. An empty body
/// means no inputs.
#[utoipa::path(
    post,
    path = "/orchestrator/{id}/run",
    params(("id" = Uuid, Path, description = "Orchestrator ID")),
    request_body(content = serde_json::Value, description = "Run inputs", content_type = "application/json"),
    responses(
        (status = 201, description = "Run created", body = Run),
        (status = 400, description = "Inputs are not a JSON object", body = ErrorResponse),
        (status = 404, description = "Definition not found", body = ErrorResponse),
        (status = 412, description = "No active provider connection", body = ErrorResponse)
    ),
    tag = "runs"
)]
pub async fn start_run(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<Run>), ApiError> {
    owned_definition(&state, &caller, id).await?;

    let inputs = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("inputs are not valid JSON: {}", e)))?
    };

    let run = state.coordinator.start_run(id, inputs).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

/// GET /orchestrator/:id/runs - List runs of a definition
#[utoipa::path(
    get,
    path = "/orchestrator/{id}/runs",
    params(("id" = Uuid, Path, description = "Orchestrator ID")),
    responses(
        (status = 200, description = "Runs, newest first", body = ListResponse<Run>),
        (status = 404, description = "Definition not found", body = ErrorResponse)
    ),
    tag = "runs"
)]
pub async fn list_runs(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ListResponse<Run>>, ApiError> {
    owned_definition(&state, &caller, id).await?;
    let runs = state.coordinator.list_runs(id).await?;
    Ok(Json(ListResponse::new(runs)))
}

/// GET /orchestrator/runs/:run_id - Poll a run
#[utoipa::path(
    get,
    path = "/orchestrator/runs/{run_id}",
    params(("run_id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run found", body = Run),
        (status = 404, description = "Run not found", body = ErrorResponse)
    ),
    tag = "runs"
)]
pub async fn get_run(
    State(state): State<AppState>,
    caller: Caller,
    Path(run_id): Path<Uuid>,
) -> Result<Json<Run>, ApiError> {
    let run = state.coordinator.get_run(run_id).await?;
    if run.workspace_id != caller.workspace_id {
        return Err(OrchestratorError::RunNotFound(run_id).into());
    }
    Ok(Json(run))
}
