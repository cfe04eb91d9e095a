// Run domain types and state machine
//
// A Run is one execution attempt of an orchestrator definition against a
// provider. Status only moves along the edges encoded in `RunStatus::can_transition_to`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Run status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet dispatched (transient)
    Pending,
    /// Dispatched to the provider, awaiting completion
    Running,
    Succeeded,
    Failed,
    /// No callback arrived within the maximum run duration
    TimedOut,
}

impl RunStatus {
    /// SUCCEEDED, FAILED and TIMED_OUT admit no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::TimedOut
        )
    }

    /// Whether `self -> next` is an edge of the run state machine
    ///
    /// PENDING -> FAILED only recovers runs whose RUNNING write never landed;
    /// such runs were never handed to a provider.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Pending, RunStatus::Running | RunStatus::Failed) => true,
            (RunStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            "timed_out" => Ok(RunStatus::TimedOut),
            _ => Err(format!("Unknown run status: {}", s)),
        }
    }
}

/// One timestamped line in a run's append-only log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl RunLogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

/// Run - one execution attempt of an orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Run {
    pub id: Uuid,
    pub orchestrator_id: Uuid,
    pub workspace_id: Uuid,
    /// Provider tag the run was dispatched to
    pub provider: String,
    pub status: RunStatus,
    /// SHA-256 of the correlation token; the plaintext token is never stored
    #[serde(skip_serializing, default)]
    #[cfg_attr(feature = "openapi", schema(ignore))]
    pub token_hash: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub inputs: serde_json::Value,
    #[serde(default)]
    pub logs: Vec<RunLogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version, bumped on every committed update
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Optional payload accompanying a transition request
#[derive(Debug, Clone, Default)]
pub struct TransitionDetails {
    /// Lines appended to the run log
    pub logs: Vec<String>,
    pub metadata: Option<serde_json::Value>,
    /// Defaults to now when entering a terminal state
    pub finished_at: Option<DateTime<Utc>>,
    /// Refuse the transition unless the run is currently in this status
    pub expected_status: Option<RunStatus>,
}

impl TransitionDetails {
    pub fn log(message: impl Into<String>) -> Self {
        Self {
            logs: vec![message.into()],
            ..Default::default()
        }
    }

    pub fn with_log(mut self, message: impl Into<String>) -> Self {
        self.logs.push(message.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_finished_at(mut self, finished_at: DateTime<Utc>) -> Self {
        self.finished_at = Some(finished_at);
        self
    }

    pub fn expecting(mut self, status: RunStatus) -> Self {
        self.expected_status = Some(status);
        self
    }
}

/// Outcome of `RunCoordinator::apply_transition`
#[derive(Debug, Clone)]
pub enum Transition {
    /// The transition was committed
    Applied(Run),
    /// Run was already terminal; the repeat request was accepted as a no-op
    Unchanged(Run),
}

impl Transition {
    pub fn run(&self) -> &Run {
        match self {
            Transition::Applied(run) | Transition::Unchanged(run) => run,
        }
    }

    pub fn into_run(self) -> Run {
        match self {
            Transition::Applied(run) | Transition::Unchanged(run) => run,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RunStatus; 5] = [
        RunStatus::Pending,
        RunStatus::Running,
        RunStatus::Succeeded,
        RunStatus::Failed,
        RunStatus::TimedOut,
    ];

    #[test]
    fn test_terminal_states() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::TimedOut.is_terminal());
    }

    #[test]
    fn test_no_edges_out_of_terminal_states() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_defined_edges() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::Succeeded));
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::TimedOut));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Pending));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Succeeded));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::TimedOut));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in ALL {
            assert_eq!(status.to_string().parse::<RunStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_token_not_serialized() {
        let now = Utc::now();
        let run = Run {
            id: Uuid::now_v7(),
            orchestrator_id: Uuid::now_v7(),
            workspace_id: Uuid::now_v7(),
            provider: "n8n".to_string(),
            status: RunStatus::Running,
            token_hash: "0a1b2c3d4e5f".to_string(),
            inputs: serde_json::json!({"topic": "x"}),
            logs: vec![],
            metadata: None,
            started_at: Some(now),
            finished_at: None,
            version: 2,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&run).unwrap();
        assert!(json.get("token_hash").is_none());
        assert_eq!(json["status"], "running");
        assert!(!json.to_string().contains("0a1b2c3d4e5f"));
    }
}
