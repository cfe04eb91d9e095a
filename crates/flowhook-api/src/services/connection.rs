// Provider connection service
//
// Connect/test/delete flows for provider connections plus workflow browsing.
// Health checks write their result back through ConnectionStore::mark_connection_status
// so StartRun sees ERROR connections as unusable.

use std::sync::Arc;
use uuid::Uuid;

use flowhook_core::{
    ConnectionHealth, ConnectionStatus, ConnectionStore, OrchestratorError, ProviderConnection,
    ProviderError, Result, RunCoordinator, WorkflowPreview, WorkflowSummary,
};

/// Registered provider together with the workspace's connection to it
#[derive(Debug, Clone)]
pub struct ProviderEntry {
    pub provider: &'static str,
    pub display_name: &'static str,
    pub connection: Option<ProviderConnection>,
}

pub struct ConnectionService {
    coordinator: Arc<RunCoordinator>,
    connections: Arc<dyn ConnectionStore>,
}

impl ConnectionService {
    pub fn new(coordinator: Arc<RunCoordinator>, connections: Arc<dyn ConnectionStore>) -> Self {
        Self {
            coordinator,
            connections,
        }
    }

    pub async fn list_providers(&self, workspace_id: Uuid) -> Result<Vec<ProviderEntry>> {
        let connections = self.connections.list_connections(workspace_id).await?;

        Ok(self
            .coordinator
            .providers()
            .providers()
            .into_iter()
            .map(|(provider, display_name)| ProviderEntry {
                provider,
                display_name,
                connection: connections.iter().find(|c| c.provider == provider).cloned(),
            })
            .collect())
    }

    /// Store credentials and verify them against the provider
    pub async fn connect(
        &self,
        workspace_id: Uuid,
        provider: &str,
        credentials: serde_json::Value,
    ) -> Result<(ProviderConnection, ConnectionHealth)> {
        let adapter = self.coordinator.providers().get(provider)?;
        if !credentials.is_object() {
            return Err(OrchestratorError::invalid_input(
                "credentials must be a JSON object",
            ));
        }

        let connection = self
            .connections
            .upsert_connection(workspace_id, provider, credentials)
            .await?;
        let health = adapter.test_connection(&connection).await;
        let connection = self.record_health(connection, &health).await?;

        tracing::info!(
            connection_id = %connection.id,
            provider = %provider,
            status = %connection.status,
            "Provider connected"
        );
        Ok((connection, health))
    }

    /// Re-check an existing connection
    pub async fn test(&self, workspace_id: Uuid, provider: &str) -> Result<ConnectionHealth> {
        let adapter = self.coordinator.providers().get(provider)?;
        let connection = self
            .connections
            .get_connection(workspace_id, provider)
            .await?
            .ok_or_else(|| OrchestratorError::connection_required(provider))?;

        let health = adapter.test_connection(&connection).await;
        self.record_health(connection, &health).await?;
        Ok(health)
    }

    pub async fn list_connections(&self, workspace_id: Uuid) -> Result<Vec<ProviderConnection>> {
        self.connections.list_connections(workspace_id).await
    }

    pub async fn delete(&self, workspace_id: Uuid, id: Uuid) -> Result<()> {
        if self.connections.delete_connection(workspace_id, id).await? {
            tracing::info!(connection_id = %id, "Provider connection deleted");
            Ok(())
        } else {
            Err(OrchestratorError::NotFound(format!("connection {}", id)))
        }
    }

    pub async fn list_workflows(
        &self,
        workspace_id: Uuid,
        provider: &str,
    ) -> Result<Vec<WorkflowSummary>> {
        let adapter = self.coordinator.providers().get(provider)?;
        let connection = self
            .coordinator
            .resolve_connection(workspace_id, provider)
            .await?;

        match adapter.list_workflows(&connection).await {
            Ok(workflows) => Ok(workflows),
            Err(e) => Err(self.provider_failure(&connection, e).await),
        }
    }

    pub async fn preview_workflow(
        &self,
        workspace_id: Uuid,
        provider: &str,
        workflow_id: &str,
    ) -> Result<WorkflowPreview> {
        let adapter = self.coordinator.providers().get(provider)?;
        let connection = self
            .coordinator
            .resolve_connection(workspace_id, provider)
            .await?;

        match adapter.preview_workflow(&connection, workflow_id).await {
            Ok(preview) => Ok(preview),
            Err(e) => Err(self.provider_failure(&connection, e).await),
        }
    }

    async fn record_health(
        &self,
        connection: ProviderConnection,
        health: &ConnectionHealth,
    ) -> Result<ProviderConnection> {
        let status = match health {
            ConnectionHealth::Healthy => ConnectionStatus::Active,
            ConnectionHealth::Unhealthy(reason) => {
                tracing::warn!(connection_id = %connection.id, reason = %reason, "Connection unhealthy");
                ConnectionStatus::Error
            }
        };

        Ok(self
            .connections
            .mark_connection_status(connection.id, status)
            .await?
            .unwrap_or(connection))
    }

    /// Rejected credentials put the connection into ERROR
    async fn provider_failure(
        &self,
        connection: &ProviderConnection,
        err: ProviderError,
    ) -> OrchestratorError {
        if matches!(err, ProviderError::Auth(_)) {
            if let Err(e) = self
                .connections
                .mark_connection_status(connection.id, ConnectionStatus::Error)
                .await
            {
                tracing::error!(connection_id = %connection.id, "Failed to mark connection: {}", e);
            }
        }
        err.into()
    }
}
