// OpenAPI specification generation

use crate::api;
use crate::api::providers::ProviderInfo;
use crate::api::{ErrorResponse, ListResponse};
use flowhook_core::{
    ConnectionHealth, ConnectionStatus, OrchestratorDefinition, ProviderConnection, Run,
    RunLogEntry, RunStatus, WorkflowPreview, WorkflowSummary,
};
use utoipa::OpenApi;

/// OpenAPI documentation for the Flowhook API
#[derive(OpenApi)]
#[openapi(
    paths(
        api::orchestrators::create_orchestrator,
        api::orchestrators::list_orchestrators,
        api::orchestrators::get_orchestrator,
        api::orchestrators::start_run,
        api::orchestrators::list_runs,
        api::orchestrators::get_run,
        api::callback::receive_callback,
        api::providers::list_providers,
        api::providers::connect_provider,
        api::providers::test_provider,
        api::providers::list_workflows,
        api::providers::preview_workflow,
        api::providers::list_connections,
        api::providers::delete_connection,
    ),
    components(
        schemas(
            OrchestratorDefinition,
            Run, RunStatus, RunLogEntry,
            ProviderConnection, ConnectionStatus, ConnectionHealth,
            WorkflowSummary, WorkflowPreview,
            api::orchestrators::CreateOrchestratorRequest,
            api::callback::CallbackResponse,
            ProviderInfo,
            api::providers::ConnectProviderRequest,
            api::providers::ConnectProviderResponse,
            ErrorResponse,
            ListResponse<OrchestratorDefinition>,
            ListResponse<Run>,
            ListResponse<ProviderInfo>,
            ListResponse<WorkflowSummary>,
            ListResponse<ProviderConnection>,
        )
    ),
    tags(
        (name = "orchestrators", description = "Orchestrator definition endpoints"),
        (name = "runs", description = "Run start and polling endpoints"),
        (name = "callbacks", description = "Public provider callback endpoint"),
        (name = "providers", description = "Provider connection endpoints")
    ),
    info(
        title = "Flowhook API",
        version = "0.1.0",
        description = "API for starting provider-hosted workflow runs and correlating their callbacks"
    )
)]
pub struct ApiDoc;
