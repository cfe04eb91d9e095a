// Conversion of core errors into HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flowhook_core::OrchestratorError;

use crate::api::ErrorResponse;

/// Error returned by API handlers
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match &err {
            OrchestratorError::DefinitionNotFound(_)
            | OrchestratorError::RunNotFound(_)
            | OrchestratorError::NotFound(_)
            | OrchestratorError::UnknownToken => StatusCode::NOT_FOUND,
            OrchestratorError::ConnectionRequired(_) => StatusCode::PRECONDITION_FAILED,
            OrchestratorError::InvalidInput(_)
            | OrchestratorError::PayloadParseError(_)
            | OrchestratorError::ProviderNotSupported(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::AuthError(_) | OrchestratorError::ProviderUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            OrchestratorError::Conflict { .. } => StatusCode::CONFLICT,
            OrchestratorError::Storage(e) => {
                tracing::error!("Storage failure: {:#}", e);
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
            }
        };

        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}
