// HTTP API routes
//
// Each submodule handles one resource with its own AppState. The callback
// route is the only one that does not extract a Caller.

pub mod callback;
pub mod common;
pub mod orchestrators;
pub mod providers;

pub use common::{ErrorResponse, ListResponse};
