// Callback Ingestion Handler
//
// Receives provider callbacks on the public route. The correlation token in the
// URL is the only credential. Every state change goes through
// RunCoordinator::apply_transition; a callback that loses a race, or arrives
// after the run finished, is acknowledged without touching the run.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::coordinator::RunCoordinator;
use crate::error::Result;
use crate::provider::{parse_standard_callback, CallbackOutcome};
use crate::run::{Run, RunStatus, Transition, TransitionDetails};
use crate::token::{fingerprint, is_valid_token_format};

/// Why a callback was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    UnknownToken,
}

/// Result of ingesting one callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAck {
    /// Callback consumed; `duplicate` when it changed nothing
    Acknowledged {
        run_id: Uuid,
        status: RunStatus,
        duplicate: bool,
    },
    Rejected(RejectReason),
}

impl CallbackAck {
    fn from_transition(transition: Transition) -> Self {
        let duplicate = !transition.was_applied();
        let run = transition.run();
        CallbackAck::Acknowledged {
            run_id: run.id,
            status: run.status,
            duplicate,
        }
    }

    fn duplicate(run: &Run) -> Self {
        CallbackAck::Acknowledged {
            run_id: run.id,
            status: run.status,
            duplicate: true,
        }
    }
}

pub struct CallbackHandler {
    coordinator: Arc<RunCoordinator>,
}

impl CallbackHandler {
    pub fn new(coordinator: Arc<RunCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Ingest a provider callback.
    ///
    /// Only storage failures are returned as errors. Unknown tokens are
    /// rejected; everything else, including repeats, is acknowledged.
    pub async fn handle_callback(&self, token: &str, body: &[u8]) -> Result<CallbackAck> {
        if !is_valid_token_format(token) {
            warn!(fingerprint = %fingerprint(token), "Callback with malformed token");
            return Ok(CallbackAck::Rejected(RejectReason::UnknownToken));
        }

        let Some(run) = self.coordinator.find_run_by_token(token).await? else {
            warn!(fingerprint = %fingerprint(token), "Callback for unknown token");
            return Ok(CallbackAck::Rejected(RejectReason::UnknownToken));
        };

        if run.is_terminal() {
            debug!(run_id = %run.id, status = %run.status, "Duplicate callback for finished run");
            return Ok(CallbackAck::duplicate(&run));
        }

        let outcome = match self.coordinator.providers().get(&run.provider) {
            Ok(adapter) => adapter.parse_callback(body),
            Err(_) => parse_standard_callback(body),
        };

        let (status, details) = match outcome {
            Ok(CallbackOutcome::Succeeded(output)) => (
                RunStatus::Succeeded,
                TransitionDetails::log("provider reported success").with_metadata(output),
            ),
            Ok(CallbackOutcome::Failed(reason)) => (
                RunStatus::Failed,
                TransitionDetails::log(format!("provider reported failure: {}", reason)),
            ),
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Callback payload rejected");
                (
                    RunStatus::Failed,
                    TransitionDetails::log(format!("callback payload could not be parsed: {}", e)),
                )
            }
        };

        match self.coordinator.apply_transition(run.id, status, details).await {
            Ok(transition) => {
                if transition.was_applied() {
                    info!(run_id = %run.id, status = %status, "Callback applied");
                }
                Ok(CallbackAck::from_transition(transition))
            }
            Err(e) if e.is_conflict() => {
                debug!(run_id = %run.id, error = %e, "Callback lost transition race");
                let current = self.coordinator.get_run(run.id).await?;
                Ok(CallbackAck::duplicate(&current))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::memory::{InMemoryStore, ScriptedProvider};
    use crate::orchestrator::NewOrchestrator;
    use crate::provider::{ProviderAdapter, ProviderRegistry};
    use crate::token::generate_token;
    use crate::traits::{ConnectionStore, OrchestratorRegistry};
    use serde_json::json;

    /// A RUNNING run plus the correlation token its provider was handed
    async fn running_run() -> (Arc<RunCoordinator>, CallbackHandler, Run, String) {
        let store = Arc::new(InMemoryStore::new());
        let workspace_id = Uuid::now_v7();
        let definition = store
            .create_orchestrator(NewOrchestrator {
                workspace_id,
                name: "Research digest".to_string(),
                provider: ScriptedProvider::PROVIDER.to_string(),
                workflow_id: "wf-1".to_string(),
                definition: json!({}),
            })
            .await
            .unwrap();
        store
            .upsert_connection(workspace_id, ScriptedProvider::PROVIDER, json!({}))
            .await
            .unwrap();

        let provider = Arc::new(ScriptedProvider::accepting());
        let registry = ProviderRegistry::new().with(provider.clone() as Arc<dyn ProviderAdapter>);
        let coordinator = Arc::new(RunCoordinator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(registry),
            CoordinatorConfig::default(),
        ));
        let run = coordinator
            .start_run(definition.id, json!({"topic": "x"}))
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Running);
        let token = provider.last_token().unwrap();

        (coordinator.clone(), CallbackHandler::new(coordinator), run, token)
    }

    #[tokio::test]
    async fn test_success_callback_records_output() {
        let (coordinator, handler, run, token) = running_run().await;
        let body = json!({"result": "ok", "output": {"count": 3}}).to_string();

        let ack = handler
            .handle_callback(&token, body.as_bytes())
            .await
            .unwrap();
        assert_eq!(
            ack,
            CallbackAck::Acknowledged {
                run_id: run.id,
                status: RunStatus::Succeeded,
                duplicate: false,
            }
        );

        let stored = coordinator.get_run(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Succeeded);
        assert_eq!(stored.metadata, Some(json!({"count": 3})));
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_callback_is_noop() {
        let (coordinator, handler, run, token) = running_run().await;
        let body = json!({"result": "ok", "output": {"count": 3}}).to_string();

        handler
            .handle_callback(&token, body.as_bytes())
            .await
            .unwrap();
        let after_first = coordinator.get_run(run.id).await.unwrap();

        let failure = json!({"result": "error", "error": "late"}).to_string();
        let ack = handler
            .handle_callback(&token, failure.as_bytes())
            .await
            .unwrap();
        assert!(matches!(
            ack,
            CallbackAck::Acknowledged { duplicate: true, status: RunStatus::Succeeded, .. }
        ));

        let after_second = coordinator.get_run(run.id).await.unwrap();
        assert_eq!(after_second.version, after_first.version);
        assert_eq!(after_second.logs, after_first.logs);
        assert_eq!(after_second.finished_at, after_first.finished_at);
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let (coordinator, handler, run, _) = running_run().await;

        let ack = handler
            .handle_callback(&generate_token().token, br#"{"result":"ok"}"#)
            .await
            .unwrap();
        assert_eq!(ack, CallbackAck::Rejected(RejectReason::UnknownToken));

        let ack = handler
            .handle_callback("not-a-token", br#"{"result":"ok"}"#)
            .await
            .unwrap();
        assert_eq!(ack, CallbackAck::Rejected(RejectReason::UnknownToken));

        // No run was touched
        let stored = coordinator.get_run(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Running);
        assert_eq!(stored.version, run.version);
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_run() {
        let (coordinator, handler, run, token) = running_run().await;

        let ack = handler
            .handle_callback(&token, b"{not json")
            .await
            .unwrap();
        assert!(matches!(
            ack,
            CallbackAck::Acknowledged { status: RunStatus::Failed, duplicate: false, .. }
        ));

        let stored = coordinator.get_run(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert!(stored
            .logs
            .iter()
            .any(|entry| entry.message.contains("could not be parsed")));
    }

    #[tokio::test]
    async fn test_failure_callback() {
        let (coordinator, handler, run, token) = running_run().await;

        handler
            .handle_callback(
                &token,
                br#"{"result":"error","error":"node 3 crashed"}"#,
            )
            .await
            .unwrap();

        let stored = coordinator.get_run(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert!(stored
            .logs
            .iter()
            .any(|entry| entry.message == "provider reported failure: node 3 crashed"));
        assert!(stored.metadata.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_callbacks_single_outcome() {
        let (coordinator, handler, run, token) = running_run().await;
        let handler = Arc::new(handler);

        let callbacks = (0..10).map(|i| {
            let handler = handler.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let body = if i % 2 == 0 {
                    json!({"result": "ok", "output": {"i": i}}).to_string()
                } else {
                    json!({"result": "error", "error": format!("boom {}", i)}).to_string()
                };
                handler.handle_callback(&token, body.as_bytes()).await
            })
        });

        let acks: Vec<CallbackAck> = futures::future::join_all(callbacks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        let fresh = acks
            .iter()
            .filter(|ack| matches!(ack, CallbackAck::Acknowledged { duplicate: false, .. }))
            .count();
        assert_eq!(fresh, 1);

        let stored = coordinator.get_run(run.id).await.unwrap();
        assert!(stored.is_terminal());
        for ack in &acks {
            match ack {
                CallbackAck::Acknowledged { status, .. } => assert_eq!(*status, stored.status),
                CallbackAck::Rejected(_) => panic!("callback rejected"),
            }
        }
    }
}
