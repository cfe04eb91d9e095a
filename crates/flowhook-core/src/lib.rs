// Run Lifecycle and Callback Correlation
//
// This crate provides a DB-agnostic implementation of the run lifecycle for
// workflows hosted by third-party automation providers (n8n and friends).
//
// Key design decisions:
// - Uses traits (RunStore, OrchestratorRegistry, ConnectionStore) for pluggable backends
// - Provider adapters are trait objects registered in a ProviderRegistry by provider tag
// - RunCoordinator::apply_transition is the only path that mutates a run
// - Conflicting transitions are resolved by a per-row version check in the store
// - Callbacks are correlated through an unguessable token carried in the callback URL

// Domain entity types
pub mod connection;
pub mod orchestrator;
pub mod run;

pub mod callback;
pub mod coordinator;
pub mod error;
pub mod provider;
pub mod token;
pub mod traits;

// In-memory implementations for tests and database-less deployments
pub mod memory;

// Re-exports for convenience
pub use callback::{CallbackAck, CallbackHandler, RejectReason};
pub use connection::{ConnectionStatus, ProviderConnection};
pub use coordinator::{CoordinatorConfig, RunCoordinator, CALLBACK_PATH};
pub use error::{OrchestratorError, ProviderError, Result};
pub use orchestrator::{NewOrchestrator, OrchestratorDefinition};
pub use provider::{
    parse_standard_callback, CallbackOutcome, ConnectionHealth, ProviderAdapter,
    ProviderRegistry, RunStartResult, StartRunRequest, WorkflowPreview, WorkflowSummary,
};
pub use run::{Run, RunLogEntry, RunStatus, Transition, TransitionDetails};
pub use traits::{ConnectionStore, NewRun, OrchestratorRegistry, RunStore, RunUpdate};
