// Router assembly
//
// Builds the full axum application from the shared collaborators so main and
// the router tests wire routes the same way.

use axum::{extract::State, routing::get, Json, Router};
use flowhook_core::{
    CallbackHandler, ConnectionStore, CoordinatorConfig, OrchestratorRegistry, ProviderRegistry,
    RunCoordinator, RunStore,
};
use flowhook_storage::StorageBackend;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api;
use crate::auth::AuthState;
use crate::openapi::ApiDoc;
use crate::services::ConnectionService;

/// Collaborators shared by every route
#[derive(Clone)]
pub struct AppContext {
    pub storage: Arc<StorageBackend>,
    pub coordinator: Arc<RunCoordinator>,
    pub auth: AuthState,
}

impl AppContext {
    pub fn new(
        storage: StorageBackend,
        providers: ProviderRegistry,
        config: CoordinatorConfig,
        auth: AuthState,
    ) -> Self {
        let storage = Arc::new(storage);
        let coordinator = Arc::new(RunCoordinator::new(
            storage.clone() as Arc<dyn RunStore>,
            storage.clone() as Arc<dyn OrchestratorRegistry>,
            storage.clone() as Arc<dyn ConnectionStore>,
            Arc::new(providers),
            config,
        ));

        Self {
            storage,
            coordinator,
            auth,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    storage: &'static str,
}

async fn health(State(storage): State<Arc<StorageBackend>>) -> Json<HealthResponse> {
    let status = match storage.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!("Storage health check failed: {}", e);
            "degraded"
        }
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        storage: if storage.is_dev_mode() {
            "memory"
        } else {
            "postgres"
        },
    })
}

/// Build the application router with health, API routes and Swagger UI
pub fn build_app(ctx: &AppContext, api_prefix: &str) -> Router {
    let orchestrators_state = api::orchestrators::AppState::new(
        ctx.coordinator.clone(),
        ctx.storage.clone() as Arc<dyn OrchestratorRegistry>,
        ctx.auth.clone(),
    );
    let callback_state =
        api::callback::AppState::new(Arc::new(CallbackHandler::new(ctx.coordinator.clone())));
    let providers_state = api::providers::AppState::new(
        Arc::new(ConnectionService::new(
            ctx.coordinator.clone(),
            ctx.storage.clone() as Arc<dyn ConnectionStore>,
        )),
        ctx.auth.clone(),
    );

    let api_routes = Router::new()
        .merge(api::orchestrators::routes(orchestrators_state))
        .merge(api::callback::routes(callback_state))
        .merge(api::providers::routes(providers_state));

    // Health is never prefixed
    Router::new()
        .route("/health", get(health).with_state(ctx.storage.clone()))
        .merge(build_router_with_prefix(api_routes, api_prefix))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

/// Build router with optional API prefix (extracted for testing)
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}
