// Database models (internal, converted to flowhook-core domain types)

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use flowhook_core::{
    ConnectionStatus, OrchestratorDefinition, ProviderConnection, Run, RunLogEntry, RunStatus,
};

// ============================================
// Orchestrators
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct OrchestratorRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub provider: String,
    pub workflow_id: String,
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrchestratorRow> for OrchestratorDefinition {
    fn from(row: OrchestratorRow) -> Self {
        OrchestratorDefinition {
            id: row.id,
            workspace_id: row.workspace_id,
            name: row.name,
            provider: row.provider,
            workflow_id: row.workflow_id,
            definition: row.definition,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ============================================
// Provider connections
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct ConnectionRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub provider: String,
    pub credentials: serde_json::Value,
    pub status: String,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ConnectionRow> for ProviderConnection {
    type Error = anyhow::Error;

    fn try_from(row: ConnectionRow) -> Result<Self> {
        let status: ConnectionStatus = row.status.parse().map_err(|e: String| anyhow!(e))?;
        Ok(ProviderConnection {
            id: row.id,
            workspace_id: row.workspace_id,
            provider: row.provider,
            credentials: row.credentials,
            status,
            last_sync: row.last_sync,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ============================================
// Runs
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct RunRow {
    pub id: Uuid,
    pub orchestrator_id: Uuid,
    pub workspace_id: Uuid,
    pub provider: String,
    pub status: String,
    pub token_hash: String,
    pub inputs: serde_json::Value,
    pub logs: serde_json::Value,
    pub metadata: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RunRow> for Run {
    type Error = anyhow::Error;

    fn try_from(row: RunRow) -> Result<Self> {
        let status: RunStatus = row.status.parse().map_err(|e: String| anyhow!(e))?;
        let logs: Vec<RunLogEntry> = serde_json::from_value(row.logs)
            .with_context(|| format!("run {} has malformed logs", row.id))?;

        Ok(Run {
            id: row.id,
            orchestrator_id: row.orchestrator_id,
            workspace_id: row.workspace_id,
            provider: row.provider,
            status,
            token_hash: row.token_hash,
            inputs: row.inputs,
            logs,
            metadata: row.metadata,
            started_at: row.started_at,
            finished_at: row.finished_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
