// In-memory implementations for tests and database-less deployments
//
// InMemoryStore implements every storage trait behind one lock per table, so
// the version check in `update_run` and the write it guards are atomic.
// ScriptedProvider is a provider adapter with canned behavior.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::connection::{ConnectionStatus, ProviderConnection};
use crate::error::{ProviderError, Result};
use crate::orchestrator::{NewOrchestrator, OrchestratorDefinition};
use crate::provider::{
    ConnectionHealth, ProviderAdapter, RunStartResult, StartRunRequest, WorkflowPreview,
    WorkflowSummary,
};
use crate::run::{Run, RunStatus};
use crate::token::hash_token;
use crate::traits::{ConnectionStore, NewRun, OrchestratorRegistry, RunStore, RunUpdate};

// ============================================================================
// InMemoryStore
// ============================================================================

struct StoredRun {
    /// Insertion order, used for newest-first listings
    seq: u64,
    run: Run,
}

#[derive(Default)]
struct RunTable {
    next_seq: u64,
    rows: HashMap<Uuid, StoredRun>,
}

/// In-memory runs, definitions and connections
#[derive(Default)]
pub struct InMemoryStore {
    runs: RwLock<RunTable>,
    orchestrators: RwLock<Vec<OrchestratorDefinition>>,
    connections: RwLock<HashMap<Uuid, ProviderConnection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored runs
    pub fn run_count(&self) -> usize {
        self.runs.read().rows.len()
    }

    /// Overwrite `started_at` of a run (useful for timeout tests)
    pub fn backdate_run(&self, id: Uuid, started_at: DateTime<Utc>) -> bool {
        match self.runs.write().rows.get_mut(&id) {
            Some(stored) => {
                stored.run.started_at = Some(started_at);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl RunStore for InMemoryStore {
    async fn create_run(&self, input: NewRun) -> Result<Run> {
        let now = Utc::now();
        let run = Run {
            id: Uuid::now_v7(),
            orchestrator_id: input.orchestrator_id,
            workspace_id: input.workspace_id,
            provider: input.provider,
            status: RunStatus::Pending,
            token_hash: input.token_hash,
            inputs: input.inputs,
            logs: Vec::new(),
            metadata: None,
            started_at: None,
            finished_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let mut table = self.runs.write();
        if table.rows.values().any(|r| r.run.token_hash == run.token_hash) {
            return Err(anyhow::anyhow!("duplicate correlation token").into());
        }
        table.next_seq += 1;
        let seq = table.next_seq;
        table.rows.insert(
            run.id,
            StoredRun {
                seq,
                run: run.clone(),
            },
        );
        Ok(run)
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>> {
        Ok(self.runs.read().rows.get(&id).map(|r| r.run.clone()))
    }

    async fn find_run_by_token_hash(&self, token_hash: &str) -> Result<Option<Run>> {
        Ok(self
            .runs
            .read()
            .rows
            .values()
            .find(|r| r.run.token_hash == token_hash)
            .map(|r| r.run.clone()))
    }

    async fn list_runs(&self, orchestrator_id: Uuid) -> Result<Vec<Run>> {
        let table = self.runs.read();
        let mut rows: Vec<&StoredRun> = table
            .rows
            .values()
            .filter(|r| r.run.orchestrator_id == orchestrator_id)
            .collect();
        rows.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(rows.into_iter().map(|r| r.run.clone()).collect())
    }

    async fn update_run(
        &self,
        id: Uuid,
        expected_version: i64,
        update: RunUpdate,
    ) -> Result<Option<Run>> {
        let mut table = self.runs.write();
        let Some(stored) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        if stored.run.version != expected_version {
            return Ok(None);
        }

        let run = &mut stored.run;
        run.status = update.status;
        run.logs.extend(update.append_logs);
        if let Some(metadata) = update.metadata {
            run.metadata = Some(metadata);
        }
        if let Some(started_at) = update.started_at {
            run.started_at = Some(started_at);
        }
        if let Some(finished_at) = update.finished_at {
            run.finished_at = Some(finished_at);
        }
        run.version += 1;
        run.updated_at = Utc::now();

        Ok(Some(run.clone()))
    }

    async fn list_expired_runs(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Run>> {
        let table = self.runs.read();
        let mut expired: Vec<(DateTime<Utc>, &Run)> = table
            .rows
            .values()
            .map(|r| &r.run)
            .filter_map(|run| match run.status {
                RunStatus::Running => run.started_at.filter(|at| *at < cutoff).map(|at| (at, run)),
                RunStatus::Pending if run.created_at < cutoff => Some((run.created_at, run)),
                _ => None,
            })
            .collect();
        expired.sort_by_key(|(at, _)| *at);
        Ok(expired
            .into_iter()
            .take(limit)
            .map(|(_, run)| run.clone())
            .collect())
    }
}

#[async_trait]
impl OrchestratorRegistry for InMemoryStore {
    async fn get_orchestrator(&self, id: Uuid) -> Result<Option<OrchestratorDefinition>> {
        Ok(self
            .orchestrators
            .read()
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn create_orchestrator(&self, input: NewOrchestrator) -> Result<OrchestratorDefinition> {
        let now = Utc::now();
        let definition = OrchestratorDefinition {
            id: Uuid::now_v7(),
            workspace_id: input.workspace_id,
            name: input.name,
            provider: input.provider,
            workflow_id: input.workflow_id,
            definition: input.definition,
            created_at: now,
            updated_at: now,
        };
        self.orchestrators.write().push(definition.clone());
        Ok(definition)
    }

    async fn list_orchestrators(&self, workspace_id: Uuid) -> Result<Vec<OrchestratorDefinition>> {
        Ok(self
            .orchestrators
            .read()
            .iter()
            .rev()
            .filter(|o| o.workspace_id == workspace_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ConnectionStore for InMemoryStore {
    async fn get_connection(
        &self,
        workspace_id: Uuid,
        provider: &str,
    ) -> Result<Option<ProviderConnection>> {
        Ok(self
            .connections
            .read()
            .values()
            .find(|c| c.workspace_id == workspace_id && c.provider == provider)
            .cloned())
    }

    async fn upsert_connection(
        &self,
        workspace_id: Uuid,
        provider: &str,
        credentials: serde_json::Value,
    ) -> Result<ProviderConnection> {
        let now = Utc::now();
        let mut connections = self.connections.write();

        if let Some(existing) = connections
            .values_mut()
            .find(|c| c.workspace_id == workspace_id && c.provider == provider)
        {
            existing.credentials = credentials;
            existing.status = ConnectionStatus::Active;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let connection = ProviderConnection {
            id: Uuid::now_v7(),
            workspace_id,
            provider: provider.to_string(),
            credentials,
            status: ConnectionStatus::Active,
            last_sync: None,
            created_at: now,
            updated_at: now,
        };
        connections.insert(connection.id, connection.clone());
        Ok(connection)
    }

    async fn list_connections(&self, workspace_id: Uuid) -> Result<Vec<ProviderConnection>> {
        let mut connections: Vec<ProviderConnection> = self
            .connections
            .read()
            .values()
            .filter(|c| c.workspace_id == workspace_id)
            .cloned()
            .collect();
        connections.sort_by(|a, b| a.provider.cmp(&b.provider));
        Ok(connections)
    }

    async fn delete_connection(&self, workspace_id: Uuid, id: Uuid) -> Result<bool> {
        let mut connections = self.connections.write();
        match connections.get(&id) {
            Some(c) if c.workspace_id == workspace_id => {
                connections.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_connection_status(
        &self,
        id: Uuid,
        status: ConnectionStatus,
    ) -> Result<Option<ProviderConnection>> {
        let now = Utc::now();
        Ok(self.connections.write().get_mut(&id).map(|c| {
            c.status = status;
            c.last_sync = Some(now);
            c.updated_at = now;
            c.clone()
        }))
    }
}

// ============================================================================
// ScriptedProvider - provider adapter with canned responses
// ============================================================================

#[derive(Debug, Clone)]
enum StartBehavior {
    Accept,
    Complete(serde_json::Value),
    Fail(ProviderError),
}

/// A start_run call as seen by the provider
#[derive(Debug, Clone)]
pub struct RecordedStart {
    pub workflow_id: String,
    pub inputs: serde_json::Value,
    pub correlation_token: String,
    pub callback_url: String,
    /// Run status in the observed store at dispatch time
    pub status_at_dispatch: Option<RunStatus>,
}

/// Provider adapter that answers from a script and records every dispatch
pub struct ScriptedProvider {
    behavior: StartBehavior,
    health: ConnectionHealth,
    workflows: Vec<WorkflowSummary>,
    calls: Mutex<Vec<RecordedStart>>,
    observer: RwLock<Option<Arc<dyn RunStore>>>,
}

impl ScriptedProvider {
    pub const PROVIDER: &'static str = "scripted";

    fn with_behavior(behavior: StartBehavior) -> Self {
        Self {
            behavior,
            health: ConnectionHealth::Healthy,
            workflows: vec![WorkflowSummary {
                id: "wf-1".to_string(),
                name: "Research digest".to_string(),
                active: true,
            }],
            calls: Mutex::new(Vec::new()),
            observer: RwLock::new(None),
        }
    }

    /// Provider that accepts every run and reports back later
    pub fn accepting() -> Self {
        Self::with_behavior(StartBehavior::Accept)
    }

    /// Provider that finishes every run synchronously with `output`
    pub fn completing(output: serde_json::Value) -> Self {
        Self::with_behavior(StartBehavior::Complete(output))
    }

    /// Provider whose start call always fails
    pub fn failing(error: ProviderError) -> Self {
        Self::with_behavior(StartBehavior::Fail(error))
    }

    pub fn with_health(mut self, health: ConnectionHealth) -> Self {
        self.health = health;
        self
    }

    /// Record the run status from `store` on every dispatch
    pub fn observe(&self, store: Arc<dyn RunStore>) {
        *self.observer.write() = Some(store);
    }

    pub fn calls(&self) -> Vec<RecordedStart> {
        self.calls.lock().clone()
    }

    /// Correlation token of the most recent dispatch
    pub fn last_token(&self) -> Option<String> {
        self.calls.lock().last().map(|c| c.correlation_token.clone())
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn provider(&self) -> &'static str {
        Self::PROVIDER
    }

    fn display_name(&self) -> &'static str {
        "Scripted"
    }

    async fn list_workflows(
        &self,
        _connection: &ProviderConnection,
    ) -> std::result::Result<Vec<WorkflowSummary>, ProviderError> {
        Ok(self.workflows.clone())
    }

    async fn preview_workflow(
        &self,
        _connection: &ProviderConnection,
        workflow_id: &str,
    ) -> std::result::Result<WorkflowPreview, ProviderError> {
        self.workflows
            .iter()
            .find(|w| w.id == workflow_id)
            .map(|w| WorkflowPreview {
                id: w.id.clone(),
                name: w.name.clone(),
                active: w.active,
                definition: serde_json::json!({"nodes": []}),
            })
            .ok_or_else(|| ProviderError::NotFound(format!("workflow {}", workflow_id)))
    }

    async fn start_run(
        &self,
        _connection: &ProviderConnection,
        request: StartRunRequest<'_>,
    ) -> std::result::Result<RunStartResult, ProviderError> {
        let observer = self.observer.read().clone();
        let status_at_dispatch = match observer {
            Some(store) => store
                .find_run_by_token_hash(&hash_token(request.correlation_token))
                .await
                .ok()
                .flatten()
                .map(|run| run.status),
            None => None,
        };

        self.calls.lock().push(RecordedStart {
            workflow_id: request.workflow_id.to_string(),
            inputs: request.inputs.clone(),
            correlation_token: request.correlation_token.to_string(),
            callback_url: request.callback_url.to_string(),
            status_at_dispatch,
        });

        match &self.behavior {
            StartBehavior::Accept => Ok(RunStartResult::Accepted),
            StartBehavior::Complete(output) => Ok(RunStartResult::Completed(output.clone())),
            StartBehavior::Fail(error) => Err(error.clone()),
        }
    }

    async fn test_connection(&self, _connection: &ProviderConnection) -> ConnectionHealth {
        self.health.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunLogEntry;
    use serde_json::json;

    fn new_run(orchestrator_id: Uuid, token: &str) -> NewRun {
        NewRun {
            orchestrator_id,
            workspace_id: Uuid::now_v7(),
            provider: "n8n".to_string(),
            token_hash: hash_token(token),
            inputs: json!({}),
        }
    }

    fn running(now: DateTime<Utc>) -> RunUpdate {
        RunUpdate {
            status: RunStatus::Running,
            append_logs: vec![RunLogEntry::now("dispatched")],
            metadata: None,
            started_at: Some(now),
            finished_at: None,
        }
    }

    #[tokio::test]
    async fn test_update_run_checks_version() {
        let store = InMemoryStore::new();
        let run = store.create_run(new_run(Uuid::now_v7(), "cbt_a")).await.unwrap();
        assert_eq!(run.version, 1);
        assert_eq!(run.status, RunStatus::Pending);

        let updated = store
            .update_run(run.id, 1, running(Utc::now()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.logs.len(), 1);

        // Stale version loses
        let stale = store.update_run(run.id, 1, running(Utc::now())).await.unwrap();
        assert!(stale.is_none());

        let missing = store
            .update_run(Uuid::now_v7(), 1, running(Utc::now()))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_find_by_token_hash() {
        let store = InMemoryStore::new();
        let run = store.create_run(new_run(Uuid::now_v7(), "cbt_a")).await.unwrap();

        let found = store.find_run_by_token_hash(&hash_token("cbt_a")).await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(run.id));
        assert!(store
            .find_run_by_token_hash(&hash_token("cbt_b"))
            .await
            .unwrap()
            .is_none());

        // Token hashes are unique
        assert!(store.create_run(new_run(Uuid::now_v7(), "cbt_a")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_expired_runs() {
        let store = InMemoryStore::new();
        let orchestrator_id = Uuid::now_v7();
        let now = Utc::now();

        let old = store.create_run(new_run(orchestrator_id, "cbt_old")).await.unwrap();
        store.update_run(old.id, 1, running(now)).await.unwrap();
        store.backdate_run(old.id, now - chrono::Duration::hours(2));

        let fresh = store.create_run(new_run(orchestrator_id, "cbt_new")).await.unwrap();
        store.update_run(fresh.id, 1, running(now)).await.unwrap();

        // Pending runs age from created_at
        let pending = store.create_run(new_run(orchestrator_id, "cbt_pending")).await.unwrap();

        let expired = store
            .list_expired_runs(now - chrono::Duration::hours(1), 10)
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old.id);

        let later = Utc::now() + chrono::Duration::seconds(1);
        let ids: Vec<Uuid> = store
            .list_expired_runs(later, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![old.id, fresh.id, pending.id]);

        assert!(store
            .list_expired_runs(now - chrono::Duration::hours(1), 0)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_upsert_connection_replaces_credentials() {
        let store = InMemoryStore::new();
        let workspace_id = Uuid::now_v7();

        let first = store
            .upsert_connection(workspace_id, "n8n", json!({"api_key": "a"}))
            .await
            .unwrap();
        store
            .mark_connection_status(first.id, ConnectionStatus::Error)
            .await
            .unwrap();

        let second = store
            .upsert_connection(workspace_id, "n8n", json!({"api_key": "b"}))
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, ConnectionStatus::Active);
        assert_eq!(second.credentials, json!({"api_key": "b"}));
        assert_eq!(store.list_connections(workspace_id).await.unwrap().len(), 1);

        // Scoped to the owning workspace
        assert!(!store.delete_connection(Uuid::now_v7(), first.id).await.unwrap());
        assert!(store.delete_connection(workspace_id, first.id).await.unwrap());
        assert!(store
            .get_connection(workspace_id, "n8n")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mark_connection_status_stamps_last_sync() {
        let store = InMemoryStore::new();
        let connection = store
            .upsert_connection(Uuid::now_v7(), "n8n", json!({}))
            .await
            .unwrap();
        assert!(connection.last_sync.is_none());

        let marked = store
            .mark_connection_status(connection.id, ConnectionStatus::Disconnected)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(marked.status, ConnectionStatus::Disconnected);
        assert!(marked.last_sync.is_some());
    }

    #[tokio::test]
    async fn test_list_orchestrators_by_workspace() {
        let store = InMemoryStore::new();
        let workspace_id = Uuid::now_v7();
        for name in ["first", "second"] {
            store
                .create_orchestrator(NewOrchestrator {
                    workspace_id,
                    name: name.to_string(),
                    provider: "n8n".to_string(),
                    workflow_id: "wf".to_string(),
                    definition: json!({}),
                })
                .await
                .unwrap();
        }

        let listed = store.list_orchestrators(workspace_id).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
        assert!(store
            .list_orchestrators(Uuid::now_v7())
            .await
            .unwrap()
            .is_empty());
    }
}
