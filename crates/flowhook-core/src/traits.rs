// Core traits for pluggable backends
//
// These traits allow the coordinator to be used with different backends:
// - In-memory implementations for examples and testing (crate::memory)
// - PostgreSQL implementations for production (flowhook-storage)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::connection::{ConnectionStatus, ProviderConnection};
use crate::error::Result;
use crate::orchestrator::{NewOrchestrator, OrchestratorDefinition};
use crate::run::{Run, RunLogEntry, RunStatus};

// ============================================================================
// RunStore - the run table, the only shared mutable resource
// ============================================================================

/// Input for inserting a run row (status starts at PENDING, version at 1)
#[derive(Debug, Clone)]
pub struct NewRun {
    pub orchestrator_id: Uuid,
    pub workspace_id: Uuid,
    pub provider: String,
    /// SHA-256 of the correlation token, the only form of it that is persisted
    pub token_hash: String,
    pub inputs: serde_json::Value,
}

/// Changes committed by a conditional update
#[derive(Debug, Clone)]
pub struct RunUpdate {
    pub status: RunStatus,
    /// Appended after the existing entries, never replacing them
    pub append_logs: Vec<RunLogEntry>,
    pub metadata: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Trait for persisting runs
///
/// `update_run` is the per-row conflict check: it commits only when the stored
/// version still equals `expected_version`, and bumps the version when it does.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, input: NewRun) -> Result<Run>;

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>>;

    async fn find_run_by_token_hash(&self, token_hash: &str) -> Result<Option<Run>>;

    /// Runs of an orchestrator, newest first
    async fn list_runs(&self, orchestrator_id: Uuid) -> Result<Vec<Run>>;

    /// Returns `None` when the row is missing or its version moved on
    async fn update_run(
        &self,
        id: Uuid,
        expected_version: i64,
        update: RunUpdate,
    ) -> Result<Option<Run>>;

    /// Non-terminal runs older than `cutoff`, oldest first: RUNNING runs by
    /// `started_at`, PENDING runs by `created_at`
    async fn list_expired_runs(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Run>>;
}

// ============================================================================
// OrchestratorRegistry - read-mostly workflow definitions
// ============================================================================

#[async_trait]
pub trait OrchestratorRegistry: Send + Sync {
    async fn get_orchestrator(&self, id: Uuid) -> Result<Option<OrchestratorDefinition>>;

    async fn create_orchestrator(&self, input: NewOrchestrator) -> Result<OrchestratorDefinition>;

    /// Definitions of a workspace, newest first
    async fn list_orchestrators(&self, workspace_id: Uuid) -> Result<Vec<OrchestratorDefinition>>;
}

// ============================================================================
// ConnectionStore - per-workspace provider credentials
// ============================================================================

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get_connection(
        &self,
        workspace_id: Uuid,
        provider: &str,
    ) -> Result<Option<ProviderConnection>>;

    /// Create or replace the workspace's connection to a provider (status ACTIVE)
    async fn upsert_connection(
        &self,
        workspace_id: Uuid,
        provider: &str,
        credentials: serde_json::Value,
    ) -> Result<ProviderConnection>;

    async fn list_connections(&self, workspace_id: Uuid) -> Result<Vec<ProviderConnection>>;

    async fn delete_connection(&self, workspace_id: Uuid, id: Uuid) -> Result<bool>;

    /// Set status and stamp `last_sync`
    async fn mark_connection_status(
        &self,
        id: Uuid,
        status: ConnectionStatus,
    ) -> Result<Option<ProviderConnection>>;
}
