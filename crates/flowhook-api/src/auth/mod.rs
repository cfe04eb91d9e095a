// Authentication for the workspace-facing routes
//
// The provider callback route never uses these extractors; the correlation
// token in its URL is the only credential it accepts.

pub mod api_key;
pub mod config;
pub mod middleware;

pub use config::{AuthConfig, AuthMode};
pub use middleware::{AuthState, Caller};
