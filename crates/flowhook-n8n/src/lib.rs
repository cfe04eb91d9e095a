// n8n provider for Flowhook
//
// Implements flowhook_core::ProviderAdapter for n8n. Provider crates depend on
// core and are registered in the ProviderRegistry at startup.

mod adapter;

use std::sync::Arc;

use flowhook_core::ProviderRegistry;

pub use adapter::{N8nAdapter, PROVIDER};

/// Register the n8n adapter with the provider registry
///
/// # Example
///
/// ```ignore
/// use flowhook_core::ProviderRegistry;
///
/// let mut registry = ProviderRegistry::new();
/// flowhook_n8n::register_provider(&mut registry);
/// ```
pub fn register_provider(registry: &mut ProviderRegistry) {
    registry.register(Arc::new(N8nAdapter::from_env()));
}
