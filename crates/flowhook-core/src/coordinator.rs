// Run Coordinator
//
// Creates run records, dispatches them to provider adapters, issues correlation
// tokens and exposes status queries. `apply_transition` is the single
// serialization point for every status/logs/metadata change: callers that race
// on the same run are linearized by the store's version check, and exactly one
// of them commits.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::ProviderConnection;
use crate::error::{OrchestratorError, Result};
use crate::provider::{ProviderRegistry, RunStartResult, StartRunRequest};
use crate::run::{Run, RunLogEntry, RunStatus, Transition, TransitionDetails};
use crate::token::{generate_token, hash_token, tokens_match};
use crate::traits::{ConnectionStore, NewRun, OrchestratorRegistry, RunStore, RunUpdate};

/// Path segment of the public callback route
pub const CALLBACK_PATH: &str = "/orchestrator/callback";

const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:9300";

/// Configuration for the run coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Externally reachable base URL (including any API prefix)
    pub public_base_url: String,
}

impl CoordinatorConfig {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let base = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_PUBLIC_BASE_URL.to_string());
        let prefix = std::env::var("API_PREFIX").unwrap_or_default();
        Self::new(format!("{}{}", base.trim_end_matches('/'), prefix))
    }

    /// Provider-facing callback URL embedding the correlation token
    pub fn callback_url(&self, token: &str) -> String {
        format!(
            "{}{}/{}",
            self.public_base_url.trim_end_matches('/'),
            CALLBACK_PATH,
            token
        )
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_BASE_URL)
    }
}

/// Run Coordinator - owns the run lifecycle
pub struct RunCoordinator {
    runs: Arc<dyn RunStore>,
    orchestrators: Arc<dyn OrchestratorRegistry>,
    connections: Arc<dyn ConnectionStore>,
    providers: Arc<ProviderRegistry>,
    config: CoordinatorConfig,
}

impl RunCoordinator {
    pub fn new(
        runs: Arc<dyn RunStore>,
        orchestrators: Arc<dyn OrchestratorRegistry>,
        connections: Arc<dyn ConnectionStore>,
        providers: Arc<ProviderRegistry>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            runs,
            orchestrators,
            connections,
            providers,
            config,
        }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Start a run of an orchestrator definition.
    ///
    /// Definition, connection and input problems are returned as errors and
    /// create no run. Once the run row exists, provider failures are recorded
    /// on the run (FAILED) instead of being returned, so the caller always gets
    /// a run to inspect. If the RUNNING write itself fails the provider is not
    /// called, the run is marked FAILED when possible and the store error is
    /// returned.
    pub async fn start_run(&self, orchestrator_id: Uuid, inputs: serde_json::Value) -> Result<Run> {
        let definition = self
            .orchestrators
            .get_orchestrator(orchestrator_id)
            .await?
            .ok_or(OrchestratorError::DefinitionNotFound(orchestrator_id))?;

        let inputs = normalize_inputs(inputs)?;
        let adapter = self.providers.get(&definition.provider)?;
        let connection = self
            .resolve_connection(definition.workspace_id, &definition.provider)
            .await?;

        let token = generate_token();
        let run = self
            .runs
            .create_run(NewRun {
                orchestrator_id,
                workspace_id: definition.workspace_id,
                provider: definition.provider.clone(),
                token_hash: token.token_hash,
                inputs,
            })
            .await?;

        info!(
            run_id = %run.id,
            orchestrator_id = %orchestrator_id,
            provider = %definition.provider,
            "Run created"
        );

        // Committed before the provider call so the run is observable while it is in flight
        let dispatching = self
            .apply_transition(
                run.id,
                RunStatus::Running,
                TransitionDetails::log(format!(
                    "dispatching to {} workflow {}",
                    definition.provider, definition.workflow_id
                )),
            )
            .await;
        let run = match dispatching {
            Ok(transition) => transition.into_run(),
            Err(e) => {
                self.abandon_undispatched(run.id, &e).await;
                return Err(e);
            }
        };

        let callback_url = self.config.callback_url(&token.token);
        let result = adapter
            .start_run(
                &connection,
                StartRunRequest {
                    workflow_id: &definition.workflow_id,
                    inputs: &run.inputs,
                    correlation_token: &token.token,
                    callback_url: &callback_url,
                },
            )
            .await;

        match result {
            Ok(RunStartResult::Accepted) => {
                info!(run_id = %run.id, "Provider accepted run, awaiting callback");
                Ok(run)
            }
            Ok(RunStartResult::Completed(output)) => {
                info!(run_id = %run.id, "Provider completed run synchronously");
                self.settle(
                    run.id,
                    RunStatus::Succeeded,
                    TransitionDetails::log("provider completed synchronously").with_metadata(output),
                )
                .await
            }
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Provider call failed");
                self.settle(
                    run.id,
                    RunStatus::Failed,
                    TransitionDetails::log(format!("provider call failed: {}", e)),
                )
                .await
            }
        }
    }

    pub async fn get_run(&self, id: Uuid) -> Result<Run> {
        self.runs
            .get_run(id)
            .await?
            .ok_or(OrchestratorError::RunNotFound(id))
    }

    /// Runs of an orchestrator, newest first
    pub async fn list_runs(&self, orchestrator_id: Uuid) -> Result<Vec<Run>> {
        self.orchestrators
            .get_orchestrator(orchestrator_id)
            .await?
            .ok_or(OrchestratorError::DefinitionNotFound(orchestrator_id))?;

        self.runs.list_runs(orchestrator_id).await
    }

    /// Resolve a run from a presented correlation token
    pub async fn find_run_by_token(&self, token: &str) -> Result<Option<Run>> {
        let presented = hash_token(token);
        let run = self.runs.find_run_by_token_hash(&presented).await?;
        Ok(run.filter(|run| tokens_match(&run.token_hash, &presented)))
    }

    /// Apply a state machine transition.
    ///
    /// - Into a terminal state while already terminal: `Transition::Unchanged`
    /// - Out of a terminal state, or along an undefined edge: `Conflict`
    /// - Run not in `details.expected_status`, when set: `Conflict`
    /// - Lost a race against a concurrent update: `Conflict`
    pub async fn apply_transition(
        &self,
        run_id: Uuid,
        new_status: RunStatus,
        details: TransitionDetails,
    ) -> Result<Transition> {
        let run = self.get_run(run_id).await?;

        if run.status.is_terminal() {
            if new_status.is_terminal() {
                debug!(
                    run_id = %run_id,
                    status = %run.status,
                    requested = %new_status,
                    "Run already terminal, ignoring repeat transition"
                );
                return Ok(Transition::Unchanged(run));
            }
            return Err(OrchestratorError::conflict(
                run_id,
                format!("run is already {}", run.status),
            ));
        }

        if let Some(expected) = details.expected_status {
            if run.status != expected {
                return Err(OrchestratorError::conflict(
                    run_id,
                    format!("run is {}, expected {}", run.status, expected),
                ));
            }
        }

        if !run.status.can_transition_to(new_status) {
            return Err(OrchestratorError::conflict(
                run_id,
                format!("{} -> {} is not a valid transition", run.status, new_status),
            ));
        }

        let now = Utc::now();
        let update = RunUpdate {
            status: new_status,
            append_logs: details
                .logs
                .into_iter()
                .map(|message| RunLogEntry {
                    timestamp: now,
                    message,
                })
                .collect(),
            metadata: details.metadata,
            started_at: (new_status == RunStatus::Running).then_some(now),
            finished_at: new_status
                .is_terminal()
                .then(|| details.finished_at.unwrap_or(now)),
        };

        match self.runs.update_run(run_id, run.version, update).await? {
            Some(updated) => {
                info!(
                    run_id = %run_id,
                    from = %run.status,
                    to = %new_status,
                    "Run transitioned"
                );
                Ok(Transition::Applied(updated))
            }
            None => {
                debug!(run_id = %run_id, requested = %new_status, "Lost transition race");
                Err(OrchestratorError::conflict(
                    run_id,
                    "a concurrent update was committed first",
                ))
            }
        }
    }

    /// Non-terminal runs older than `max_duration` at `now`
    ///
    /// RUNNING runs age from `started_at`; PENDING runs, whose dispatch never
    /// committed, age from `created_at`.
    pub async fn list_expired_runs(
        &self,
        now: DateTime<Utc>,
        max_duration: std::time::Duration,
        limit: usize,
    ) -> Result<Vec<Run>> {
        let max = chrono::Duration::from_std(max_duration)
            .map_err(|e| OrchestratorError::invalid_input(format!("max duration: {}", e)))?;
        self.runs.list_expired_runs(now - max, limit).await
    }

    /// Resolve an expired run through the regular transition path
    ///
    /// RUNNING becomes TIMED_OUT. PENDING never reached the provider and
    /// becomes FAILED. The transition only commits while the run is still in
    /// the status it was listed with.
    pub async fn expire_run(
        &self,
        run: &Run,
        max_duration: std::time::Duration,
    ) -> Result<Transition> {
        let secs = max_duration.as_secs();
        let (status, details) = match run.status {
            RunStatus::Pending => (
                RunStatus::Failed,
                TransitionDetails::log(format!(
                    "run was never dispatched to the provider within {}s",
                    secs
                )),
            ),
            _ => (
                RunStatus::TimedOut,
                TransitionDetails::log(format!(
                    "run timed out after {}s without a provider callback",
                    secs
                )),
            ),
        };

        self.apply_transition(run.id, status, details.expecting(run.status))
            .await
    }

    /// Load the workspace's connection, requiring it to be ACTIVE
    pub async fn resolve_connection(
        &self,
        workspace_id: Uuid,
        provider: &str,
    ) -> Result<ProviderConnection> {
        match self.connections.get_connection(workspace_id, provider).await? {
            Some(connection) if connection.is_active() => Ok(connection),
            Some(connection) => {
                debug!(
                    connection_id = %connection.id,
                    status = %connection.status,
                    "Connection is not active"
                );
                Err(OrchestratorError::connection_required(provider))
            }
            None => Err(OrchestratorError::connection_required(provider)),
        }
    }

    /// Best-effort FAILED for a run whose RUNNING write did not commit.
    /// Anything still PENDING afterwards is picked up by the timeout sweep.
    async fn abandon_undispatched(&self, run_id: Uuid, cause: &OrchestratorError) {
        warn!(
            run_id = %run_id,
            error = %cause,
            "Could not mark run RUNNING, provider not called"
        );
        let details = TransitionDetails::log(format!(
            "dispatch aborted before reaching the provider: {}",
            cause
        ))
        .expecting(RunStatus::Pending);
        if let Err(e) = self.apply_transition(run_id, RunStatus::Failed, details).await {
            warn!(run_id = %run_id, error = %e, "Run left PENDING until the timeout sweep");
        }
    }

    /// Terminal transition after the provider call; a lost race leaves the winner's record
    async fn settle(
        &self,
        run_id: Uuid,
        status: RunStatus,
        details: TransitionDetails,
    ) -> Result<Run> {
        match self.apply_transition(run_id, status, details).await {
            Ok(transition) => Ok(transition.into_run()),
            Err(e) if e.is_conflict() => self.get_run(run_id).await,
            Err(e) => Err(e),
        }
    }
}

/// Inputs must be a JSON object; null means "no inputs"
fn normalize_inputs(inputs: serde_json::Value) -> Result<serde_json::Value> {
    match inputs {
        serde_json::Value::Null => Ok(serde_json::Value::Object(Default::default())),
        serde_json::Value::Object(_) => Ok(inputs),
        _ => Err(OrchestratorError::invalid_input("inputs must be a JSON object")),
    }
}
