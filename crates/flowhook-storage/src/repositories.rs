// Repository layer for database operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use flowhook_core::{ConnectionStatus, NewOrchestrator, NewRun, RunUpdate};

use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    // ============================================
    // Orchestrators
    // ============================================

    pub async fn create_orchestrator(&self, input: NewOrchestrator) -> Result<OrchestratorRow> {
        let row = sqlx::query_as::<_, OrchestratorRow>(
            r#"
            INSERT INTO orchestrators (id, workspace_id, name, provider, workflow_id, definition)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, workspace_id, name, provider, workflow_id, definition, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.workspace_id)
        .bind(&input.name)
        .bind(&input.provider)
        .bind(&input.workflow_id)
        .bind(&input.definition)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_orchestrator(&self, id: Uuid) -> Result<Option<OrchestratorRow>> {
        let row = sqlx::query_as::<_, OrchestratorRow>(
            r#"
            SELECT id, workspace_id, name, provider, workflow_id, definition, created_at, updated_at
            FROM orchestrators
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_orchestrators(&self, workspace_id: Uuid) -> Result<Vec<OrchestratorRow>> {
        let rows = sqlx::query_as::<_, OrchestratorRow>(
            r#"
            SELECT id, workspace_id, name, provider, workflow_id, definition, created_at, updated_at
            FROM orchestrators
            WHERE workspace_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============================================
    // Provider connections
    // ============================================

    pub async fn get_connection(
        &self,
        workspace_id: Uuid,
        provider: &str,
    ) -> Result<Option<ConnectionRow>> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            r#"
            SELECT id, workspace_id, provider, credentials, status, last_sync, created_at, updated_at
            FROM provider_connections
            WHERE workspace_id = $1 AND provider = $2
            "#,
        )
        .bind(workspace_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn upsert_connection(
        &self,
        workspace_id: Uuid,
        provider: &str,
        credentials: &serde_json::Value,
    ) -> Result<ConnectionRow> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            r#"
            INSERT INTO provider_connections (id, workspace_id, provider, credentials, status)
            VALUES ($1, $2, $3, $4, 'active')
            ON CONFLICT (workspace_id, provider) DO UPDATE
            SET credentials = EXCLUDED.credentials,
                status = 'active',
                updated_at = NOW()
            RETURNING id, workspace_id, provider, credentials, status, last_sync, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(workspace_id)
        .bind(provider)
        .bind(credentials)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_connections(&self, workspace_id: Uuid) -> Result<Vec<ConnectionRow>> {
        let rows = sqlx::query_as::<_, ConnectionRow>(
            r#"
            SELECT id, workspace_id, provider, credentials, status, last_sync, created_at, updated_at
            FROM provider_connections
            WHERE workspace_id = $1
            ORDER BY provider
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn delete_connection(&self, workspace_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM provider_connections
            WHERE id = $1 AND workspace_id = $2
            "#,
        )
        .bind(id)
        .bind(workspace_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_connection_status(
        &self,
        id: Uuid,
        status: ConnectionStatus,
    ) -> Result<Option<ConnectionRow>> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            r#"
            UPDATE provider_connections
            SET status = $2, last_sync = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING id, workspace_id, provider, credentials, status, last_sync, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    // ============================================
    // Runs
    // ============================================

    pub async fn create_run(&self, input: NewRun) -> Result<RunRow> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            INSERT INTO orchestrator_runs (
                id, orchestrator_id, workspace_id, provider, status,
                token_hash, inputs
            )
            VALUES ($1, $2, $3, $4, 'pending', $5, $6)
            RETURNING id, orchestrator_id, workspace_id, provider, status, token_hash,
                      inputs, logs, metadata, started_at, finished_at, version, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.orchestrator_id)
        .bind(input.workspace_id)
        .bind(&input.provider)
        .bind(&input.token_hash)
        .bind(&input.inputs)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_run(&self, id: Uuid) -> Result<Option<RunRow>> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, orchestrator_id, workspace_id, provider, status, token_hash,
                   inputs, logs, metadata, started_at, finished_at, version, created_at, updated_at
            FROM orchestrator_runs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_run_by_token_hash(&self, token_hash: &str) -> Result<Option<RunRow>> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, orchestrator_id, workspace_id, provider, status, token_hash,
                   inputs, logs, metadata, started_at, finished_at, version, created_at, updated_at
            FROM orchestrator_runs
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_runs(&self, orchestrator_id: Uuid) -> Result<Vec<RunRow>> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, orchestrator_id, workspace_id, provider, status, token_hash,
                   inputs, logs, metadata, started_at, finished_at, version, created_at, updated_at
            FROM orchestrator_runs
            WHERE orchestrator_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(orchestrator_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Conditional update: commits only while the row still carries `expected_version`
    pub async fn update_run(
        &self,
        id: Uuid,
        expected_version: i64,
        update: RunUpdate,
    ) -> Result<Option<RunRow>> {
        let append_logs = serde_json::to_value(&update.append_logs)?;

        let row = sqlx::query_as::<_, RunRow>(
            r#"
            UPDATE orchestrator_runs
            SET status = $3,
                logs = logs || $4::jsonb,
                metadata = COALESCE($5, metadata),
                started_at = COALESCE($6, started_at),
                finished_at = COALESCE($7, finished_at),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING id, orchestrator_id, workspace_id, provider, status, token_hash,
                      inputs, logs, metadata, started_at, finished_at, version, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(update.status.as_str())
        .bind(&append_logs)
        .bind(&update.metadata)
        .bind(update.started_at)
        .bind(update.finished_at)
        .fetch_optional(&self.pool)
        .await?;

        if row.is_none() {
            debug!(run_id = %id, expected_version, "Run version moved on, update skipped");
        }

        Ok(row)
    }

    /// RUNNING runs started before `cutoff` and PENDING runs created before it
    pub async fn list_expired_runs(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RunRow>> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, orchestrator_id, workspace_id, provider, status, token_hash,
                   inputs, logs, metadata, started_at, finished_at, version, created_at, updated_at
            FROM orchestrator_runs
            WHERE (status = 'running' AND started_at < $1)
               OR (status = 'pending' AND created_at < $1)
            ORDER BY COALESCE(started_at, created_at)
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
