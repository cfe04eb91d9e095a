// Storage backend abstraction
// Decision: Use enum dispatch for simplicity over trait objects
//
// StorageBackend works with either PostgreSQL (production) or the in-memory
// store from flowhook-core (dev mode), and implements the core storage traits
// so the coordinator never sees which one it is talking to.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use flowhook_core::memory::InMemoryStore;
use flowhook_core::{
    ConnectionStatus, ConnectionStore, NewOrchestrator, NewRun, OrchestratorDefinition,
    OrchestratorRegistry, ProviderConnection, Result, Run, RunStore, RunUpdate,
};

use crate::models::RunRow;
use crate::repositories::Database;

/// Storage backend that can be either PostgreSQL or in-memory
#[derive(Clone)]
pub enum StorageBackend {
    /// PostgreSQL database (production)
    Postgres(Database),
    /// In-memory store (dev mode)
    InMemory(Arc<InMemoryStore>),
}

impl StorageBackend {
    /// Create a PostgreSQL storage backend from a database URL and apply migrations
    pub async fn postgres(database_url: &str) -> AnyResult<Self> {
        let db = Database::from_url(database_url).await?;
        db.migrate().await?;
        Ok(Self::Postgres(db))
    }

    /// Create an in-memory storage backend
    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryStore::new()))
    }

    /// PostgreSQL when DATABASE_URL is set, in-memory otherwise
    pub async fn from_env() -> AnyResult<Self> {
        match std::env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => {
                info!("Using PostgreSQL storage");
                Self::postgres(&url).await
            }
            _ => {
                warn!("DATABASE_URL not set, using in-memory storage (dev mode)");
                Ok(Self::in_memory())
            }
        }
    }

    /// Check if this is dev mode (in-memory)
    pub fn is_dev_mode(&self) -> bool {
        matches!(self, Self::InMemory(_))
    }

    /// Get the PostgreSQL pool if using PostgreSQL backend
    pub fn pool(&self) -> Option<&PgPool> {
        match self {
            Self::Postgres(db) => Some(db.pool()),
            Self::InMemory(_) => None,
        }
    }

    /// Verify the backend is reachable
    pub async fn ping(&self) -> AnyResult<()> {
        match self {
            Self::Postgres(db) => {
                sqlx::query("SELECT 1").execute(db.pool()).await?;
                Ok(())
            }
            Self::InMemory(_) => Ok(()),
        }
    }
}

fn convert_runs(rows: Vec<RunRow>) -> AnyResult<Vec<Run>> {
    rows.into_iter().map(Run::try_from).collect()
}

/// Like `convert_runs`, but a row that fails to convert is logged and dropped
/// so the rest of the batch still gets processed
fn convert_runs_skipping_invalid(rows: Vec<RunRow>) -> Vec<Run> {
    rows.into_iter()
        .filter_map(|row| {
            let run_id = row.id;
            match Run::try_from(row) {
                Ok(run) => Some(run),
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "Skipping unreadable run row");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl RunStore for StorageBackend {
    async fn create_run(&self, input: NewRun) -> Result<Run> {
        match self {
            Self::Postgres(db) => Ok(Run::try_from(db.create_run(input).await?)?),
            Self::InMemory(db) => db.create_run(input).await,
        }
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>> {
        match self {
            Self::Postgres(db) => Ok(db.get_run(id).await?.map(Run::try_from).transpose()?),
            Self::InMemory(db) => db.get_run(id).await,
        }
    }

    async fn find_run_by_token_hash(&self, token_hash: &str) -> Result<Option<Run>> {
        match self {
            Self::Postgres(db) => Ok(db
                .find_run_by_token_hash(token_hash)
                .await?
                .map(Run::try_from)
                .transpose()?),
            Self::InMemory(db) => db.find_run_by_token_hash(token_hash).await,
        }
    }

    async fn list_runs(&self, orchestrator_id: Uuid) -> Result<Vec<Run>> {
        match self {
            Self::Postgres(db) => Ok(convert_runs(db.list_runs(orchestrator_id).await?)?),
            Self::InMemory(db) => db.list_runs(orchestrator_id).await,
        }
    }

    async fn update_run(
        &self,
        id: Uuid,
        expected_version: i64,
        update: RunUpdate,
    ) -> Result<Option<Run>> {
        match self {
            Self::Postgres(db) => Ok(db
                .update_run(id, expected_version, update)
                .await?
                .map(Run::try_from)
                .transpose()?),
            Self::InMemory(db) => db.update_run(id, expected_version, update).await,
        }
    }

    async fn list_expired_runs(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Run>> {
        match self {
            Self::Postgres(db) => Ok(convert_runs_skipping_invalid(
                db.list_expired_runs(cutoff, limit).await?,
            )),
            Self::InMemory(db) => db.list_expired_runs(cutoff, limit).await,
        }
    }
}

#[async_trait]
impl OrchestratorRegistry for StorageBackend {
    async fn get_orchestrator(&self, id: Uuid) -> Result<Option<OrchestratorDefinition>> {
        match self {
            Self::Postgres(db) => Ok(db.get_orchestrator(id).await?.map(Into::into)),
            Self::InMemory(db) => db.get_orchestrator(id).await,
        }
    }

    async fn create_orchestrator(&self, input: NewOrchestrator) -> Result<OrchestratorDefinition> {
        match self {
            Self::Postgres(db) => Ok(db.create_orchestrator(input).await?.into()),
            Self::InMemory(db) => db.create_orchestrator(input).await,
        }
    }

    async fn list_orchestrators(&self, workspace_id: Uuid) -> Result<Vec<OrchestratorDefinition>> {
        match self {
            Self::Postgres(db) => Ok(db
                .list_orchestrators(workspace_id)
                .await?
                .into_iter()
                .map(Into::into)
                .collect()),
            Self::InMemory(db) => db.list_orchestrators(workspace_id).await,
        }
    }
}

#[async_trait]
impl ConnectionStore for StorageBackend {
    async fn get_connection(
        &self,
        workspace_id: Uuid,
        provider: &str,
    ) -> Result<Option<ProviderConnection>> {
        match self {
            Self::Postgres(db) => Ok(db
                .get_connection(workspace_id, provider)
                .await?
                .map(ProviderConnection::try_from)
                .transpose()?),
            Self::InMemory(db) => db.get_connection(workspace_id, provider).await,
        }
    }

    async fn upsert_connection(
        &self,
        workspace_id: Uuid,
        provider: &str,
        credentials: serde_json::Value,
    ) -> Result<ProviderConnection> {
        match self {
            Self::Postgres(db) => Ok(ProviderConnection::try_from(
                db.upsert_connection(workspace_id, provider, &credentials)
                    .await?,
            )?),
            Self::InMemory(db) => db.upsert_connection(workspace_id, provider, credentials).await,
        }
    }

    async fn list_connections(&self, workspace_id: Uuid) -> Result<Vec<ProviderConnection>> {
        match self {
            Self::Postgres(db) => Ok(db
                .list_connections(workspace_id)
                .await?
                .into_iter()
                .map(ProviderConnection::try_from)
                .collect::<AnyResult<Vec<_>>>()?),
            Self::InMemory(db) => db.list_connections(workspace_id).await,
        }
    }

    async fn delete_connection(&self, workspace_id: Uuid, id: Uuid) -> Result<bool> {
        match self {
            Self::Postgres(db) => Ok(db.delete_connection(workspace_id, id).await?),
            Self::InMemory(db) => db.delete_connection(workspace_id, id).await,
        }
    }

    async fn mark_connection_status(
        &self,
        id: Uuid,
        status: ConnectionStatus,
    ) -> Result<Option<ProviderConnection>> {
        match self {
            Self::Postgres(db) => Ok(db
                .mark_connection_status(id, status)
                .await?
                .map(ProviderConnection::try_from)
                .transpose()?),
            Self::InMemory(db) => db.mark_connection_status(id, status).await,
        }
    }
}
