//! The `ModelProvider` trait.
//!
//! One call in, one string out. The Checkpoint Compressor uses this to
//! summarize spans of messages; the Token Counter uses `count_tokens` as
//! the model-specific counter when one is available, falling back to the
//! 4-chars/token heuristic otherwise (§4.1).

use async_trait::async_trait;
use ctxcore_core::Message;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors a model provider call can raise.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network/transport failure talking to the provider.
    #[error("transport error: {message}")]
    Transport {
        /// Error description.
        message: String,
    },

    /// The provider rejected the request (auth, invalid model, bad request).
    #[error("provider rejected request ({status}): {message}")]
    Rejected {
        /// Provider-reported status code, if any.
        status: u16,
        /// Error description.
        message: String,
    },

    /// The provider was rate-limited.
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay.
        retry_after_ms: u64,
    },

    /// The call exceeded its deadline.
    #[error("timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },
}

impl ProviderError {
    /// Whether a caller may usefully retry this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::RateLimited { .. } | Self::Timeout { .. } => true,
            Self::Rejected { status, .. } => *status >= 500,
        }
    }
}

/// A request to summarize or otherwise transform a span of messages.
#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    /// Optional system prompt (e.g. the compression template for a level).
    pub system_prompt: Option<String>,
    /// The messages to send.
    pub messages: Vec<Message>,
    /// Maximum tokens the response may use (§4.5 step 4: `B_level + margin`).
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature. The Compressor always uses a fixed low value.
    pub temperature: Option<f64>,
}

/// Capability surface consumed by the Checkpoint Compressor and, for
/// model-specific counting, the Token Counter (§6).
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Model identifier this provider answers for.
    fn model_id(&self) -> &str;

    /// Send a request, returning the model's full text response.
    async fn chat(&self, request: &ChatRequest) -> ProviderResult<String>;

    /// Count tokens in `text` using the model's own tokenizer, if available.
    ///
    /// Returns `None` when the provider has no model-specific counter; the
    /// caller must then fall back to the heuristic (§4.1).
    async fn count_tokens(&self, text: &str) -> ProviderResult<Option<u32>>;

    /// The model's advertised context window, in tokens (§4.6 input `W`).
    async fn advertised_context(&self) -> ProviderResult<u32>;
}
