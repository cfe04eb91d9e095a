// Orchestrator definition domain types
//
// A definition is the static description of a provider-hosted workflow.
// It is immutable once published; the coordinator only reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// OrchestratorDefinition - a workflow graph hosted by a third-party provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct OrchestratorDefinition {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    /// Provider tag used to select the adapter (e.g. "n8n")
    pub provider: String,
    /// Workflow identifier on the provider side
    pub workflow_id: String,
    /// Opaque workflow spec
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for publishing a new definition
#[derive(Debug, Clone)]
pub struct NewOrchestrator {
    pub workspace_id: Uuid,
    pub name: String,
    pub provider: String,
    pub workflow_id: String,
    pub definition: serde_json::Value,
}
