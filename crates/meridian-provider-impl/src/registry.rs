use meridian_provider_core::ProviderRegistry;

use crate::builtin::builtin_provider_seeds;

/// Registers every built-in provider implementation into `registry`.
///
/// Called once at bootstrap; the resulting registry is shared (behind an
/// `Arc`) across all request handlers for the lifetime of the process.
pub fn register_builtin_providers(registry: &mut ProviderRegistry) {
    for seed in builtin_provider_seeds() {
        registry.register(seed.provider);
    }
}
