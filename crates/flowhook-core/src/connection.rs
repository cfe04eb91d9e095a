// Provider connection domain types
//
// Connections hold per-workspace provider credentials. The coordinator only
// reads `status`; `credentials` are interpreted by the provider adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Connection status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Error,
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Active => write!(f, "active"),
            ConnectionStatus::Error => write!(f, "error"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

impl std::str::FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ConnectionStatus::Active),
            "error" => Ok(ConnectionStatus::Error),
            "disconnected" => Ok(ConnectionStatus::Disconnected),
            _ => Err(format!("Unknown connection status: {}", s)),
        }
    }
}

/// ProviderConnection - credentials binding a workspace to a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ProviderConnection {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub provider: String,
    /// Opaque credentials, owned by the connection store
    #[serde(skip_serializing, default)]
    #[cfg_attr(feature = "openapi", schema(ignore))]
    pub credentials: serde_json::Value,
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderConnection {
    pub fn is_active(&self) -> bool {
        self.status == ConnectionStatus::Active
    }
}
