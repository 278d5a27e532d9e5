//! The Token Counter (§4.1).
//!
//! `count(text, model_id) → u32` is pure and deterministic for a given
//! model. [`TokenCounter`] prefers a model-specific counter through
//! [`ctxcore_llm::ModelProvider::count_tokens`] and falls back to the
//! 4-chars/token heuristic — the same heuristic the Checkpoint Compressor
//! uses to size its own outputs, so the two never disagree (§4.1: "it must
//! be the *same* function the Compressor uses to size outputs").

#![deny(unsafe_code)]

pub mod constants;
pub mod counter;
pub mod heuristic;

pub use counter::TokenCounter;
pub use heuristic::{estimate_message_tokens, estimate_messages_tokens, estimate_text_tokens};
