// Error types for the run lifecycle engine

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors surfaced by the Run Coordinator and Callback Ingestion Handler
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Orchestrator definition does not exist
    #[error("Orchestrator definition not found: {0}")]
    DefinitionNotFound(Uuid),

    /// No ACTIVE provider connection for the workspace
    #[error("Provider connection required for '{0}'")]
    ConnectionRequired(String),

    /// Provider could not be reached or answered with a server error
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider rejected the stored credentials
    #[error("Provider authentication failed: {0}")]
    AuthError(String),

    /// Caller or provider rejected the supplied inputs
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-side resource (workflow, connection) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Run does not exist
    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    /// Callback token matched no run
    #[error("Unknown callback token")]
    UnknownToken,

    /// Transition race lost or transition not defined by the state machine
    #[error("Conflicting transition for run {run_id}: {reason}")]
    Conflict { run_id: Uuid, reason: String },

    /// Callback body could not be interpreted
    #[error("Callback payload could not be parsed: {0}")]
    PayloadParseError(String),

    /// No adapter registered for the provider tag
    #[error("No adapter registered for provider '{0}'")]
    ProviderNotSupported(String),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Create a conflict error
    pub fn conflict(run_id: Uuid, reason: impl Into<String>) -> Self {
        OrchestratorError::Conflict {
            run_id,
            reason: reason.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        OrchestratorError::InvalidInput(msg.into())
    }

    /// Create a connection required error
    pub fn connection_required(provider: impl Into<String>) -> Self {
        OrchestratorError::ConnectionRequired(provider.into())
    }

    /// True for the internal concurrency signal
    pub fn is_conflict(&self) -> bool {
        matches!(self, OrchestratorError::Conflict { .. })
    }
}

/// Failures reported by a provider adapter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider authentication failed: {0}")]
    Auth(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed callback payload: {0}")]
    PayloadParse(String),
}

impl ProviderError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        ProviderError::Unavailable(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        ProviderError::Auth(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ProviderError::InvalidInput(msg.into())
    }

    pub fn payload(msg: impl Into<String>) -> Self {
        ProviderError::PayloadParse(msg.into())
    }
}

impl From<ProviderError> for OrchestratorError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable(msg) => OrchestratorError::ProviderUnavailable(msg),
            ProviderError::Auth(msg) => OrchestratorError::AuthError(msg),
            ProviderError::InvalidInput(msg) => OrchestratorError::InvalidInput(msg),
            ProviderError::NotFound(msg) => OrchestratorError::NotFound(msg),
            ProviderError::PayloadParse(msg) => OrchestratorError::PayloadParseError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_mapping() {
        let err: OrchestratorError = ProviderError::unavailable("503").into();
        assert!(matches!(err, OrchestratorError::ProviderUnavailable(ref m) if m == "503"));

        let err: OrchestratorError = ProviderError::auth("bad key").into();
        assert!(matches!(err, OrchestratorError::AuthError(_)));

        let err: OrchestratorError = ProviderError::payload("not json").into();
        assert!(matches!(err, OrchestratorError::PayloadParseError(_)));
    }

    #[test]
    fn test_conflict_helper() {
        let err = OrchestratorError::conflict(Uuid::nil(), "already terminal");
        assert!(err.is_conflict());
        assert!(err.to_string().contains("already terminal"));
    }
}
