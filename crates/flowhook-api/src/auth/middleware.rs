// Caller extractor
// Decision: In "none" mode every request is accepted; the workspace still comes from X-Workspace-Id
// Decision: API keys are accepted as "Authorization: Bearer fhk_..." or "Authorization: ApiKey fhk_..."

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::config::{AuthConfig, AuthMode};

/// Header carrying the caller's workspace
pub const WORKSPACE_HEADER: &str = "x-workspace-id";

/// Authentication error
#[derive(Debug, Clone, Serialize)]
pub struct AuthError {
    pub error: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl AuthError {
    pub fn unauthorized(message: &str) -> Self {
        Self {
            error: message.to_string(),
            status: StatusCode::UNAUTHORIZED,
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self {
            error: message.to_string(),
            status: StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Authentication method used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    ApiKey,
}

/// Authenticated caller context extracted from request
#[derive(Debug, Clone)]
pub struct Caller {
    pub workspace_id: Uuid,
    pub auth_method: AuthMethod,
}

/// Auth state shared across routes
#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AuthConfig>,
}

impl AuthState {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        extract_caller(&parts.headers, &auth_state.config)
    }
}

fn extract_caller(headers: &HeaderMap, config: &AuthConfig) -> Result<Caller, AuthError> {
    let workspace_id = workspace_from_headers(headers)?;

    match config.mode {
        AuthMode::None => Ok(Caller {
            // Dev mode: a missing header means the default workspace
            workspace_id: workspace_id.unwrap_or_else(Uuid::nil),
            auth_method: AuthMethod::None,
        }),
        AuthMode::ApiKey => {
            let key = api_key_from_headers(headers)
                .ok_or_else(|| AuthError::unauthorized("Authentication required"))?;
            if !config.accepts_api_key(key) {
                tracing::debug!("Rejected request with unknown API key");
                return Err(AuthError::unauthorized("Invalid API key"));
            }

            let workspace_id = workspace_id
                .ok_or_else(|| AuthError::bad_request("X-Workspace-Id header required"))?;
            Ok(Caller {
                workspace_id,
                auth_method: AuthMethod::ApiKey,
            })
        }
    }
}

fn workspace_from_headers(headers: &HeaderMap) -> Result<Option<Uuid>, AuthError> {
    let Some(value) = headers.get(WORKSPACE_HEADER) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .map(Some)
        .ok_or_else(|| AuthError::bad_request("X-Workspace-Id must be a UUID"))
}

fn api_key_from_headers(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("ApiKey "))
        .map(str::trim)
}
