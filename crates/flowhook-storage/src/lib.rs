// Postgres storage layer with sqlx
//
// This crate provides database implementations for the flowhook-core traits:
// - Database: typed queries over the orchestrators, provider_connections and orchestrator_runs tables
// - StorageBackend: RunStore + OrchestratorRegistry + ConnectionStore over Postgres or memory

pub mod backend;
pub mod models;
pub mod repositories;

pub use backend::StorageBackend;
pub use models::*;
pub use repositories::*;
