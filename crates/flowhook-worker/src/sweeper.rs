// Timeout Sweeper
//
// Periodically moves RUNNING runs older than the maximum run duration to
// TIMED_OUT, and PENDING runs whose dispatch never committed to FAILED. Each
// run goes through RunCoordinator::apply_transition, so a
// callback or another sweeper instance racing on the same run leaves exactly
// one winner; the loser is counted as skipped.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use flowhook_core::{Result, RunCoordinator, RunStatus, Transition};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// A zero period would make `tokio::time::interval` panic
fn sweep_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        warn!(
            default_secs = DEFAULT_INTERVAL.as_secs(),
            "Sweep interval must be positive, using the default"
        );
        DEFAULT_INTERVAL
    } else {
        interval
    }
}

/// Configuration for the timeout sweeper
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Runs RUNNING for longer than this are timed out
    pub max_run_duration: Duration,
    /// Delay between sweep passes
    pub interval: Duration,
    /// Maximum runs handled per pass
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            max_run_duration: Duration::from_secs(3600),
            interval: DEFAULT_INTERVAL,
            batch_size: 100,
        }
    }
}

impl SweeperConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            max_run_duration: secs("RUN_MAX_DURATION_SECS", defaults.max_run_duration),
            interval: sweep_interval(secs("SWEEP_INTERVAL_SECS", defaults.interval)),
            batch_size: std::env::var("SWEEP_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.batch_size),
        }
    }

    pub fn with_max_run_duration(mut self, max_run_duration: Duration) -> Self {
        self.max_run_duration = max_run_duration;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = sweep_interval(interval);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: usize,
    /// PENDING runs that never reached a provider, now FAILED
    pub abandoned: usize,
    /// Runs that finished some other way before the sweeper reached them
    pub skipped: usize,
}

pub struct TimeoutSweeper {
    coordinator: Arc<RunCoordinator>,
    config: SweeperConfig,
}

impl TimeoutSweeper {
    pub fn new(coordinator: Arc<RunCoordinator>, config: SweeperConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Run a single sweep pass as of `now`
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired = self
            .coordinator
            .list_expired_runs(now, self.config.max_run_duration, self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for run in expired {
            match self
                .coordinator
                .expire_run(&run, self.config.max_run_duration)
                .await
            {
                Ok(Transition::Applied(_)) if run.status == RunStatus::Pending => {
                    warn!(
                        run_id = %run.id,
                        orchestrator_id = %run.orchestrator_id,
                        "Run stuck in PENDING marked failed"
                    );
                    report.abandoned += 1;
                }
                Ok(Transition::Applied(_)) => {
                    info!(run_id = %run.id, orchestrator_id = %run.orchestrator_id, "Run timed out");
                    report.timed_out += 1;
                }
                Ok(Transition::Unchanged(_)) => report.skipped += 1,
                Err(e) if e.is_conflict() => {
                    debug!(run_id = %run.id, "Run finished before the sweeper reached it");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(run_id = %run.id, error = %e, "Failed to time out run");
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run sweep passes on an interval until the returned handle is shut down
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let period = sweep_interval(self.config.interval);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_secs = period.as_secs(),
                max_run_duration_secs = self.config.max_run_duration.as_secs(),
                "Timeout sweeper started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep_once(Utc::now()).await {
                            Ok(report) => {
                                if report != SweepReport::default() {
                                    info!(
                                        timed_out = report.timed_out,
                                        abandoned = report.abandoned,
                                        skipped = report.skipped,
                                        "Sweep pass finished"
                                    );
                                }
                            }
                            Err(e) => {
                                error!("Timeout sweep failed: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Timeout sweeper: shutdown requested");
                        break;
                    }
                }
            }
        });

        SweeperHandle { shutdown_tx, task }
    }
}

/// Handle to a running sweeper loop
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the loop and wait for the in-flight pass to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Timeout sweeper task ended abnormally: {}", e);
        }
        info!("Timeout sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowhook_core::memory::{InMemoryStore, ScriptedProvider};
    use flowhook_core::{
        CallbackAck, CallbackHandler, ConnectionStore, CoordinatorConfig, NewOrchestrator,
        NewRun, OrchestratorRegistry, ProviderAdapter, ProviderRegistry, Run, RunStore,
    };
    use flowhook_core::token::{generate_token, hash_token};
    use serde_json::json;
    use uuid::Uuid;

    const HOUR: Duration = Duration::from_secs(3600);

    struct Fixture {
        store: Arc<InMemoryStore>,
        provider: Arc<ScriptedProvider>,
        coordinator: Arc<RunCoordinator>,
        orchestrator_id: Uuid,
        workspace_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let workspace_id = Uuid::now_v7();
        let definition = store
            .create_orchestrator(NewOrchestrator {
                workspace_id,
                name: "Nightly import".to_string(),
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

        Fixture {
            store,
            provider,
            coordinator,
            orchestrator_id: definition.id,
            workspace_id,
        }
    }

    impl Fixture {
        /// A RUNNING run that started `age` ago
        async fn running_run(&self, age: Duration) -> Run {
            let run = self
                .coordinator
                .start_run(self.orchestrator_id, json!({}))
                .await
                .unwrap();
            let started_at = Utc::now() - chrono::Duration::from_std(age).unwrap();
            assert!(self.store.backdate_run(run.id, started_at));
            run
        }

        /// A run whose RUNNING write never landed
        async fn pending_run(&self) -> Run {
            self.store
                .create_run(NewRun {
                    orchestrator_id: self.orchestrator_id,
                    workspace_id: self.workspace_id,
                    provider: ScriptedProvider::PROVIDER.to_string(),
                    token_hash: hash_token(&generate_token().token),
                    inputs: json!({}),
                })
                .await
                .unwrap()
        }

        fn sweeper(&self) -> TimeoutSweeper {
            TimeoutSweeper::new(
                self.coordinator.clone(),
                SweeperConfig::default().with_max_run_duration(HOUR),
            )
        }
    }

    #[test]
    fn test_config_builders() {
        let config = SweeperConfig::default()
            .with_interval(Duration::from_secs(5))
            .with_batch_size(10);
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_run_duration, HOUR);
    }

    #[test]
    fn test_zero_interval_falls_back_to_default() {
        let config = SweeperConfig::default().with_interval(Duration::ZERO);
        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert_eq!(sweep_interval(Duration::from_secs(7)), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_spawn_with_zero_interval_does_not_panic() {
        let fx = fixture().await;
        let config = SweeperConfig {
            interval: Duration::ZERO,
            ..SweeperConfig::default()
        };

        let handle = TimeoutSweeper::new(fx.coordinator.clone(), config).spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.task.is_finished());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweep_fails_stuck_pending_runs() {
        let fx = fixture().await;
        let stuck = fx.pending_run().await;
        let running = fx.running_run(Duration::from_secs(60)).await;

        // Too young to expire yet
        let report = fx.sweeper().sweep_once(Utc::now()).await.unwrap();
        assert_eq!(report, SweepReport::default());

        let later = Utc::now() + chrono::Duration::minutes(90);
        let report = fx.sweeper().sweep_once(later).await.unwrap();
        assert_eq!(
            report,
            SweepReport { timed_out: 1, abandoned: 1, skipped: 0 }
        );

        let stuck = fx.coordinator.get_run(stuck.id).await.unwrap();
        assert_eq!(stuck.status, RunStatus::Failed);
        assert!(stuck.finished_at.is_some());
        assert_eq!(
            stuck.logs.last().unwrap().message,
            "run was never dispatched to the provider within 3600s"
        );
        assert_eq!(
            fx.coordinator.get_run(running.id).await.unwrap().status,
            RunStatus::TimedOut
        );
        // Only the RUNNING run ever reached the provider
        assert_eq!(fx.provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_times_out_stale_runs() {
        let fx = fixture().await;
        let stale = fx.running_run(2 * HOUR).await;
        let fresh = fx.running_run(Duration::from_secs(60)).await;

        let report = fx.sweeper().sweep_once(Utc::now()).await.unwrap();
        assert_eq!(
            report,
            SweepReport { timed_out: 1, abandoned: 0, skipped: 0 }
        );

        let stale = fx.coordinator.get_run(stale.id).await.unwrap();
        assert_eq!(stale.status, RunStatus::TimedOut);
        assert!(stale.finished_at.is_some());
        assert!(stale
            .logs
            .iter()
            .any(|entry| entry.message == "run timed out after 3600s without a provider callback"));

        let fresh = fx.coordinator.get_run(fresh.id).await.unwrap();
        assert_eq!(fresh.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_late_callback_after_timeout_is_noop() {
        let fx = fixture().await;
        let run = fx.running_run(2 * HOUR).await;
        fx.sweeper().sweep_once(Utc::now()).await.unwrap();
        let timed_out = fx.coordinator.get_run(run.id).await.unwrap();

        let token = fx.provider.last_token().unwrap();
        let handler = CallbackHandler::new(fx.coordinator.clone());
        let ack = handler
            .handle_callback(&token, br#"{"result":"ok","output":{}}"#)
            .await
            .unwrap();
        assert!(matches!(ack, CallbackAck::Acknowledged { duplicate: true, .. }));

        let after = fx.coordinator.get_run(run.id).await.unwrap();
        assert_eq!(after.status, RunStatus::TimedOut);
        assert_eq!(after.version, timed_out.version);
    }

    #[tokio::test]
    async fn test_batch_size_limits_pass() {
        let fx = fixture().await;
        for _ in 0..3 {
            fx.running_run(2 * HOUR).await;
        }

        let sweeper = TimeoutSweeper::new(
            fx.coordinator.clone(),
            SweeperConfig::default()
                .with_max_run_duration(HOUR)
                .with_batch_size(2),
        );
        assert_eq!(sweeper.sweep_once(Utc::now()).await.unwrap().timed_out, 2);
        assert_eq!(sweeper.sweep_once(Utc::now()).await.unwrap().timed_out, 1);
        assert_eq!(
            sweeper.sweep_once(Utc::now()).await.unwrap(),
            SweepReport::default()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sweepers_time_out_once() {
        let fx = fixture().await;
        let run = fx.running_run(2 * HOUR).await;

        let passes = (0..4).map(|_| {
            let sweeper = fx.sweeper();
            tokio::spawn(async move { sweeper.sweep_once(Utc::now()).await })
        });
        let reports: Vec<SweepReport> = futures::future::join_all(passes)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        let timed_out: usize = reports.iter().map(|r| r.timed_out).sum();
        assert_eq!(timed_out, 1);

        let stored = fx.coordinator.get_run(run.id).await.unwrap();
        let timeout_lines = stored
            .logs
            .iter()
            .filter(|entry| entry.message.starts_with("run timed out"))
            .count();
        assert_eq!(timeout_lines, 1);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_runs_until_shutdown() {
        let fx = fixture().await;
        let run = fx.running_run(2 * HOUR).await;

        let handle = TimeoutSweeper::new(
            fx.coordinator.clone(),
            SweeperConfig::default()
                .with_max_run_duration(HOUR)
                .with_interval(Duration::from_millis(10)),
        )
        .spawn();

        let mut status = RunStatus::Running;
        for _ in 0..200 {
            status = fx.coordinator.get_run(run.id).await.unwrap().status;
            if status == RunStatus::TimedOut {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, RunStatus::TimedOut);

        handle.shutdown().await;
    }
}
