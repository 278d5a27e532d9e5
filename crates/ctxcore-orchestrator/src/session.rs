//! Per-session mutable state (§5): everything the Orchestrator's
//! serialization point for one session protects.

use std::sync::Arc;

use ctxcore_context::{ActiveContextManager, CheckpointCompressor, ModelSummarizer, PromptAssembler, Tier};
use ctxcore_llm::ModelProvider;
use ctxcore_tokens::TokenCounter;

/// Configuration for [`crate::Orchestrator::start_session`].
#[derive(Clone, Debug)]
pub struct StartSessionConfig {
    /// Which registered model provider to bind on session start.
    pub model_id: String,
    /// Which mode template to assemble the system prompt from.
    pub mode_name: String,
}

/// Everything a session's single serialization point guards: the Active
/// Context, and the per-model collaborators sized to the bound provider.
pub struct SessionState {
    pub(crate) manager: ActiveContextManager,
    pub(crate) compressor: CheckpointCompressor,
    pub(crate) assembler: Arc<PromptAssembler>,
    pub(crate) counter: Arc<TokenCounter>,
    pub(crate) provider: Arc<dyn ModelProvider>,
    pub(crate) tier: Tier,
    pub(crate) model_id: String,
    pub(crate) mode_name: String,
}

impl SessionState {
    /// Build the per-model collaborators (counter, compressor, assembler)
    /// for a freshly bound `provider`, without touching the Active Context
    /// (the caller decides separately whether to rebuild the system prompt
    /// and recompute the tier).
    pub(crate) fn rebind_provider(
        provider: Arc<dyn ModelProvider>,
        templates: Arc<dyn ctxcore_context::ModeTemplateStore>,
        tools: Arc<dyn ctxcore_context::ToolRegistry>,
    ) -> (Arc<TokenCounter>, CheckpointCompressor, Arc<PromptAssembler>) {
        let counter = Arc::new(TokenCounter::with_provider(provider.clone()));
        let summarizer: Arc<dyn ctxcore_context::Summarizer> = Arc::new(ModelSummarizer::new(provider.clone()));
        let compressor = CheckpointCompressor::new(summarizer, counter.clone());
        let assembler = Arc::new(PromptAssembler::new(templates, tools, counter.clone()));
        (counter, compressor, assembler)
    }
}
