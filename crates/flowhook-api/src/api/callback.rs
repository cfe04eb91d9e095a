// Provider callback route
// Decision: No Caller extractor; the correlation token in the path is the credential
// Decision: Every rejection gets the same 404 body so tokens cannot be probed

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use flowhook_core::{CallbackAck, CallbackHandler};
use serde::Serialize;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::ToSchema;

use super::common::ErrorResponse;
use crate::error::ApiError;

/// Largest callback body accepted
pub const MAX_CALLBACK_BODY_BYTES: usize = 1024 * 1024;

/// Body returned to the provider on acceptance
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CallbackResponse {
    #[schema(example = "acknowledged")]
    pub status: &'static str,
}

/// App state for the callback route
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<CallbackHandler>,
}

impl AppState {
    pub fn new(handler: Arc<CallbackHandler>) -> Self {
        Self { handler }
    }
}

/// Create callback routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/orchestrator/callback/:token", post(receive_callback))
        .layer(RequestBodyLimitLayer::new(MAX_CALLBACK_BODY_BYTES))
        .with_state(state)
}

/// POST /orchestrator/callback/:token - Provider reports a run outcome
///
/// Repeated callbacks for a finished run are acknowledged with 200 so
/// providers do not retry them.
#[utoipa::path(
    post,
    path = "/orchestrator/callback/{token}",
    params(("token" = String, Path, description = "Correlation token from the callback URL")),
    request_body(content = serde_json::Value, description = "Provider-defined payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Callback acknowledged", body = CallbackResponse),
        (status = 404, description = "Unknown token", body = ErrorResponse),
        (status = 413, description = "Payload too large")
    ),
    tag = "callbacks"
)]
pub async fn receive_callback(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Bytes,
) -> Response {
    match state.handler.handle_callback(&token, &body).await {
        Ok(CallbackAck::Acknowledged { .. }) => (
            StatusCode::OK,
            Json(CallbackResponse {
                status: "acknowledged",
            }),
        )
            .into_response(),
        Ok(CallbackAck::Rejected(_)) => ApiError::not_found("not found").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
