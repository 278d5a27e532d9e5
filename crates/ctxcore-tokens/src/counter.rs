//! [`TokenCounter`]: the single counting authority shared by the Active
//! Context Manager, the Checkpoint Compressor, and the Prompt Assembler.
//!
//! Per §4.1, a 4-chars/token heuristic is acceptable only when no
//! model-specific counter is available, and its use must be flagged in
//! telemetry. This counter warns once per model per process rather than on
//! every call, to keep logs useful under load.

use std::sync::Arc;

use ctxcore_core::Message;
use ctxcore_llm::ModelProvider;
use dashmap::DashSet;
use tracing::warn;

use crate::heuristic::{estimate_message_tokens, estimate_messages_tokens, estimate_text_tokens};

/// Counts tokens for text and messages, preferring a bound model provider's
/// own tokenizer and falling back to the chars/4 heuristic.
pub struct TokenCounter {
    provider: Option<Arc<dyn ModelProvider>>,
    warned_models: DashSet<String>,
}

impl TokenCounter {
    /// A counter with no model provider bound: always uses the heuristic.
    #[must_use]
    pub fn heuristic_only() -> Self {
        Self {
            provider: None,
            warned_models: DashSet::new(),
        }
    }

    /// A counter backed by a model provider, falling back to the heuristic
    /// when the provider has no tokenizer for the given text.
    #[must_use]
    pub fn with_provider(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider: Some(provider),
            warned_models: DashSet::new(),
        }
    }

    fn flag_heuristic_use(&self, model_id: &str) {
        if self.warned_models.insert(model_id.to_owned()) {
            warn!(model_id, "using heuristic token estimate (chars/4); no model-specific counter available");
        }
    }

    /// Count tokens in `text` for `model_id` (§4.1 `count(text, model_id)`).
    pub async fn count(&self, text: &str, model_id: &str) -> u32 {
        if let Some(provider) = &self.provider {
            if let Ok(Some(count)) = provider.count_tokens(text).await {
                return count;
            }
        }
        self.flag_heuristic_use(model_id);
        estimate_text_tokens(text)
    }

    /// Count tokens in a single message. Prefers the message's own cached
    /// `token_count` if present, otherwise estimates.
    pub async fn count_message(&self, message: &Message, model_id: &str) -> u32 {
        if let Some(cached) = message.token_count {
            return cached;
        }
        if let Some(provider) = &self.provider {
            if let Ok(Some(count)) = provider.count_tokens(&message.text_content()).await {
                return count;
            }
        }
        self.flag_heuristic_use(model_id);
        estimate_message_tokens(message)
    }

    /// Count tokens across a slice of messages.
    pub async fn count_messages(&self, messages: &[Message], model_id: &str) -> u32 {
        if self.provider.is_none() {
            self.flag_heuristic_use(model_id);
            return estimate_messages_tokens(messages);
        }
        let mut total = 0u32;
        for message in messages {
            total += self.count_message(message, model_id).await;
        }
        total
    }
}
