//! The 4-chars/token heuristic fallback.
//!
//! Pure functions, no I/O: text and message sizes in, token counts out.
//! Mirrors the per-content-type breakdown a model-specific counter would
//! give (text, thinking, tool use, tool result, image) so swapping in a
//! real tokenizer later changes only `counter.rs`, not call sites.

use ctxcore_core::{AssistantContent, Message, MessageRole, ToolResultContent, ToolResultMessageContent, UserContent, UserMessageContent};

use crate::constants::{CHARS_PER_TOKEN, DEFAULT_URL_IMAGE_TOKENS, MESSAGE_OVERHEAD_CHARS, MIN_IMAGE_TOKENS};

/// Convert a character count into a token count, rounding up.
#[must_use]
pub fn chars_to_tokens(chars: usize) -> u32 {
    u32::try_from(chars.div_ceil(CHARS_PER_TOKEN as usize)).unwrap_or(u32::MAX)
}

/// Estimate tokens for plain text.
#[must_use]
pub fn estimate_text_tokens(text: &str) -> u32 {
    chars_to_tokens(text.len())
}

/// Estimate tokens for a base64-encoded image, given its encoded length.
///
/// Base64 overhead is ~33% (actual bytes ≈ length × 0.75); a mixed-content
/// compression ratio of 5 converts bytes to estimated pixels; Anthropic's
/// image formula is `tokens = pixels / 750`, floored at [`MIN_IMAGE_TOKENS`].
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn estimate_base64_image_tokens(data_len: usize) -> u32 {
    let estimated_bytes = data_len as f64 * 0.75;
    let estimated_pixels = estimated_bytes * 5.0;
    let tokens = (estimated_pixels / 750.0).ceil() as u32;
    tokens.max(MIN_IMAGE_TOKENS)
}

fn user_content_chars(content: &UserContent) -> usize {
    match content {
        UserContent::Text { text } => text.len(),
        UserContent::Image { data, .. } => {
            (estimate_base64_image_tokens(data.len()) * CHARS_PER_TOKEN) as usize
        }
    }
}

fn assistant_content_chars(content: &AssistantContent) -> usize {
    match content {
        AssistantContent::Text { text } => text.len(),
        AssistantContent::Thinking { thinking, .. } => thinking.len(),
        AssistantContent::ToolUse {
            id, name, arguments, ..
        } => {
            let args_str = serde_json::to_string(arguments).unwrap_or_default();
            id.len() + name.len() + args_str.len()
        }
    }
}

fn tool_result_content_chars(content: &ToolResultContent) -> usize {
    match content {
        ToolResultContent::Text { text } => text.len(),
        ToolResultContent::Image { data, .. } => {
            (estimate_base64_image_tokens(data.len()) * CHARS_PER_TOKEN) as usize
        }
    }
}

/// Estimate tokens for a single message, including a small fixed overhead
/// for role framing (`MESSAGE_OVERHEAD_CHARS`).
#[must_use]
pub fn estimate_message_tokens(message: &Message) -> u32 {
    let role_str = match &message.role {
        MessageRole::System { .. } => "system",
        MessageRole::User { .. } => "user",
        MessageRole::Assistant { .. } => "assistant",
        MessageRole::Tool { .. } => "tool",
    };
    let mut chars = role_str.len() + MESSAGE_OVERHEAD_CHARS;

    match &message.role {
        MessageRole::System { content } => chars += content.len(),
        MessageRole::User { content } => match content {
            UserMessageContent::Text(text) => chars += text.len(),
            UserMessageContent::Blocks(blocks) => {
                chars += blocks.iter().map(user_content_chars).sum::<usize>();
            }
        },
        MessageRole::Assistant { content } => {
            chars += content.iter().map(assistant_content_chars).sum::<usize>();
        }
        MessageRole::Tool {
            tool_call_id,
            content,
            ..
        } => {
            chars += tool_call_id.len();
            match content {
                ToolResultMessageContent::Text(text) => chars += text.len(),
                ToolResultMessageContent::Blocks(blocks) => {
                    chars += blocks.iter().map(tool_result_content_chars).sum::<usize>();
                }
            }
        }
    }

    chars_to_tokens(chars)
}

/// Estimate tokens for a slice of messages.
#[must_use]
pub fn estimate_messages_tokens(messages: &[Message]) -> u32 {
    messages.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chars_to_tokens_rounds_up() {
        assert_eq!(chars_to_tokens(8), 2);
        assert_eq!(chars_to_tokens(9), 3);
        assert_eq!(chars_to_tokens(1), 1);
        assert_eq!(chars_to_tokens(0), 0);
    }

    #[test]
    fn image_tokens_small_hits_floor() {
        assert_eq!(estimate_base64_image_tokens(1000), MIN_IMAGE_TOKENS);
    }

    #[test]
    fn image_tokens_large_exceeds_floor() {
        // 100_000 chars -> bytes=75000, pixels=375000, ceil(375000/750)=500
        assert_eq!(estimate_base64_image_tokens(100_000), 500);
    }

    #[test]
    fn url_image_uses_fixed_default() {
        assert_eq!(DEFAULT_URL_IMAGE_TOKENS, 1500);
    }

    #[test]
    fn message_tokens_user_text() {
        let msg = Message::user("Hello, how are you?", 0.0);
        // "user"(4) + 10 + "Hello, how are you?"(19) = 33 / 4 = 9 (ceil)
        assert_eq!(estimate_message_tokens(&msg), 9);
    }

    #[test]
    fn message_tokens_empty_still_has_overhead() {
        let msg = Message::user("", 0.0);
        assert_eq!(estimate_message_tokens(&msg), 4); // ceil(14/4)
    }

    #[test]
    fn message_tokens_tool_result() {
        let msg = Message::tool_result("toolu_01", "result data", false, 0.0);
        // "tool"(4) + 10 + "toolu_01"(8) + "result data"(11) = 33 -> 9
        assert_eq!(estimate_message_tokens(&msg), 9);
    }

    #[test]
    fn message_tokens_always_positive() {
        for msg in [
            Message::user("", 0.0),
            Message::assistant("", 0.0),
            Message::tool_result("", "", false, 0.0),
        ] {
            assert!(estimate_message_tokens(&msg) > 0);
        }
    }

    #[test]
    fn longer_content_means_more_tokens() {
        let short = Message::user("hi", 0.0);
        let long = Message::user("a".repeat(1000), 0.0);
        assert!(estimate_message_tokens(&long) > estimate_message_tokens(&short));
    }

    #[test]
    fn messages_tokens_sums_individual() {
        let messages = vec![Message::user("Hello", 0.0), Message::assistant("Hi!", 0.0)];
        let total = estimate_messages_tokens(&messages);
        let individual_sum: u32 = messages.iter().map(estimate_message_tokens).sum();
        assert_eq!(total, individual_sum);
    }

    #[test]
    fn system_message_tokens() {
        let msg = Message::system("You are a helpful assistant.", 0.0);
        assert!(estimate_message_tokens(&msg) > 0);
    }
}
