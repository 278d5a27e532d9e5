//! Summarizer trait used by the Checkpoint Compressor (§4.5 steps 3-4),
//! plus a keyword-extraction fallback and the message-serialization helper
//! that turns a span into the transcript sent to the model.

use async_trait::async_trait;
use ctxcore_core::{AssistantContent, Message, MessageRole, ToolResultMessageContent, UserMessageContent};

const MAX_SERIALIZED_CHARS: usize = 12_000;
const ASSISTANT_TEXT_LIMIT: usize = 300;
const TOOL_RESULT_TEXT_LIMIT: usize = 150;

/// Errors raised while summarizing a span of messages.
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    /// The model call itself failed.
    #[error("summarizer call failed: {0}")]
    CallFailed(String),
    /// The model's response could not be interpreted as a summary.
    #[error("failed to parse summarizer response: {0}")]
    ParseError(String),
}

/// Produces a summary for a span of messages, targeting `budget_tokens`.
///
/// Implementations:
/// - [`ModelSummarizer`] — calls a bound [`ctxcore_llm::ModelProvider`].
/// - [`KeywordSummarizer`] — fast, model-free fallback used when the model
///   call fails or on the Compressor's retry-with-tighter-template path.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `messages`, aiming for roughly `budget_tokens`.
    async fn summarize(&self, messages: &[Message], budget_tokens: u32) -> Result<String, SummarizerError>;
}

/// Calls a bound model provider with a level-specific prompt.
pub struct ModelSummarizer {
    provider: std::sync::Arc<dyn ctxcore_llm::ModelProvider>,
}

impl ModelSummarizer {
    /// A summarizer backed by `provider`.
    #[must_use]
    pub fn new(provider: std::sync::Arc<dyn ctxcore_llm::ModelProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Summarizer for ModelSummarizer {
    async fn summarize(&self, messages: &[Message], budget_tokens: u32) -> Result<String, SummarizerError> {
        let transcript = serialize_messages(messages);
        let prompt = format!(
            "Summarize the following conversation span in at most {budget_tokens} tokens. \
             Respond with only the summary text, no preamble.\n\n{transcript}"
        );
        let request = ctxcore_llm::provider::ChatRequest {
            system_prompt: None,
            messages: vec![Message::user(prompt, 0.0)],
            max_output_tokens: Some(budget_tokens + 64),
            temperature: Some(0.0),
        };
        let response = self
            .provider
            .chat(&request)
            .await
            .map_err(|e| SummarizerError::CallFailed(e.to_string()))?;
        let trimmed = response.trim();
        if trimmed.is_empty() {
            return Err(SummarizerError::ParseError("empty summary".into()));
        }
        Ok(trimmed.to_owned())
    }
}

/// Fast, model-free fallback: concatenates user requests and notes tools
/// used. Used as the "tighter template" retry path and when the model
/// summarizer itself fails.
pub struct KeywordSummarizer;

impl KeywordSummarizer {
    /// A new keyword summarizer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for KeywordSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for KeywordSummarizer {
    async fn summarize(&self, messages: &[Message], budget_tokens: u32) -> Result<String, SummarizerError> {
        if messages.is_empty() {
            return Ok("(no messages in span)".to_owned());
        }
        let mut user_texts = Vec::new();
        let mut tool_names = Vec::new();
        for msg in messages {
            match &msg.role {
                MessageRole::User { .. } => {
                    let text = msg.text_content();
                    if !text.is_empty() {
                        user_texts.push(truncate(&text, 120));
                    }
                }
                MessageRole::Assistant { content } => {
                    for block in content {
                        if let AssistantContent::ToolUse { name, .. } = block {
                            if !tool_names.contains(name) {
                                tool_names.push(name.clone());
                            }
                        }
                    }
                }
                MessageRole::System { .. } | MessageRole::Tool { .. } => {}
            }
        }
        let mut narrative = format!("{} messages summarized.", messages.len());
        if !user_texts.is_empty() {
            narrative.push_str(&format!(" Requests: {}.", user_texts.join("; ")));
        }
        if !tool_names.is_empty() {
            narrative.push_str(&format!(" Tools used: {}.", tool_names.join(", ")));
        }
        Ok(truncate(&narrative, (budget_tokens as usize) * 4))
    }
}

/// Flatten a span of messages into a line-based transcript for the
/// summarization prompt, capping total length.
#[must_use]
pub fn serialize_messages(messages: &[Message]) -> String {
    let mut lines = Vec::new();
    for msg in messages {
        match &msg.role {
            MessageRole::System { content } => lines.push(format!("[SYSTEM] {content}")),
            MessageRole::User { content } => {
                let text = match content {
                    UserMessageContent::Text(t) => t.clone(),
                    UserMessageContent::Blocks(_) => msg.text_content(),
                };
                if !text.is_empty() {
                    lines.push(format!("[USER] {text}"));
                }
            }
            MessageRole::Assistant { content } => {
                for block in content {
                    match block {
                        AssistantContent::Text { text } => {
                            lines.push(format!("[ASSISTANT] {}", truncate(text, ASSISTANT_TEXT_LIMIT)));
                        }
                        AssistantContent::ToolUse { name, .. } => {
                            lines.push(format!("[TOOL_CALL] {name}()"));
                        }
                        AssistantContent::Thinking { .. } => {}
                    }
                }
            }
            MessageRole::Tool { content, is_error, .. } => {
                let text = match content {
                    ToolResultMessageContent::Text(t) => t.clone(),
                    ToolResultMessageContent::Blocks(_) => msg.text_content(),
                };
                let label = if *is_error == Some(true) { "TOOL_ERROR" } else { "TOOL_RESULT" };
                lines.push(format!("[{label}] {}", truncate(&text, TOOL_RESULT_TEXT_LIMIT)));
            }
        }
    }
    cap_transcript(&lines.join("\n"), MAX_SERIALIZED_CHARS)
}

fn cap_transcript(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_owned();
    }
    let quarter = max_chars / 4;
    let head_end = text.char_indices().nth(quarter).map_or(text.len(), |(i, _)| i);
    let head = &text[..head_end];
    let tail_start = text.len().saturating_sub(quarter);
    let tail_boundary = (tail_start..=text.len()).find(|&i| text.is_char_boundary(i)).unwrap_or(text.len());
    let tail = &text[tail_boundary..];
    let omitted = text.len().saturating_sub(head.len() + tail.len());
    format!("{head}\n[... {omitted} characters omitted ...]\n{tail}")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_owned();
    }
    let boundary = (0..=max_len).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0);
    format!("{}...", &s[..boundary])
}
