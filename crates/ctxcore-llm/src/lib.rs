//! The model-provider capability surface (§6).
//!
//! The provider itself is explicitly out of scope (§1): this crate only
//! states the contract the Checkpoint Compressor and Token Counter consume
//! it through — `chat`, `count_tokens`, `advertised_context` — as a small
//! object-safe trait, the way `tron-llm::provider::Provider` states the
//! contract for the runtime's streaming callers. Unlike `tron-llm`, no
//! streaming is required here (§6: "No streaming required for the
//! Compressor"): a single request produces a single text response.

#![deny(unsafe_code)]

pub mod provider;

pub use provider::{
    ChatRequest, ModelProvider, ProviderError, ProviderResult,
};
