use std::sync::Arc;

use meridian_provider_core::UpstreamProvider;

use crate::providers::{
    aistudio::AIStudioProvider, antigravity::AntigravityProvider, claude::ClaudeProvider,
    claudecode::ClaudeCodeProvider, codex::CodexProvider, custom::CustomProvider,
    deepseek::DeepSeekProvider, geminicli::GeminiCliProvider, nvidia::NvidiaProvider,
    openai::OpenAIProvider, vertex::VertexProvider, vertexexpress::VertexExpressProvider,
};

/// One entry in the built-in provider table: a stable name plus the boxed
/// trait object the registry will dispatch to.
pub struct BuiltinProviderSeed {
    pub name: &'static str,
    pub provider: Arc<dyn UpstreamProvider>,
}

/// Every provider implementation shipped with this crate, in registration order.
pub fn builtin_provider_seeds() -> Vec<BuiltinProviderSeed> {
    let providers: Vec<Arc<dyn UpstreamProvider>> = vec![
        Arc::new(OpenAIProvider::new()),
        Arc::new(ClaudeProvider::new()),
        Arc::new(AIStudioProvider::new()),
        Arc::new(VertexExpressProvider::new()),
        Arc::new(VertexProvider::new()),
        Arc::new(GeminiCliProvider::new()),
        Arc::new(ClaudeCodeProvider::new()),
        Arc::new(CodexProvider::new()),
        Arc::new(AntigravityProvider::new()),
        Arc::new(NvidiaProvider::new()),
        Arc::new(DeepSeekProvider::new()),
        Arc::new(CustomProvider::new()),
    ];

    providers
        .into_iter()
        .map(|provider| BuiltinProviderSeed {
            name: provider.name(),
            provider,
        })
        .collect()
}
