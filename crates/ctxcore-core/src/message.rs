//! The conversation message model (§3 `Message`).
//!
//! A [`Message`] is immutable after creation: `id`, `role`, `content`, and
//! `timestamp` never change once a message exists. `token_count` is filled
//! in lazily by whoever first counts the message (the Active Context
//! Manager or the Session History Store) and is otherwise `None`.
//!
//! Four roles, per §3: `system`, `user`, `assistant`, `tool`. The system
//! role exists so the Active Context's `system_prompt` field (§3) can be a
//! first-class `Message` rather than a bare string, matching the
//! "immutable after creation, owned jointly" contract the rest of the
//! model relies on.

use serde::{Deserialize, Serialize};

use crate::content::{AssistantContent, ToolResultContent, UserContent};
use crate::ids::MessageId;

/// Content of a user message: either a plain string or structured blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserMessageContent {
    /// Simple text.
    Text(String),
    /// Structured content blocks (text interleaved with images).
    Blocks(Vec<UserContent>),
}

/// Content of a tool message: either a plain string or structured blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultMessageContent {
    /// Simple text.
    Text(String),
    /// Structured content blocks.
    Blocks(Vec<ToolResultContent>),
}

/// The role-specific payload of a message, discriminated by `role` on the
/// wire. Kept separate from [`Message`] so the shared `id`/`timestamp`/
/// `token_count` fields aren't duplicated per variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum MessageRole {
    /// The system prompt. At most meaningful once per Active Context; never
    /// compressed, reordered, or counted as "recent".
    #[serde(rename = "system")]
    System {
        /// The system prompt text.
        content: String,
    },
    /// A message from the human operator.
    #[serde(rename = "user")]
    User {
        /// Message content.
        content: UserMessageContent,
    },
    /// A response generated by the model.
    #[serde(rename = "assistant")]
    Assistant {
        /// Content blocks (text, thinking, tool use).
        content: Vec<AssistantContent>,
    },
    /// The result of executing a tool call.
    #[serde(rename = "tool")]
    Tool {
        /// The tool call this result answers.
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Result content.
        content: ToolResultMessageContent,
        /// Whether the tool execution errored.
        #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// A single entry in the conversation (§3 `Message`).
///
/// Owned jointly: a copy always lives in the Session History (permanent);
/// it may additionally live in the Active Context (ephemeral) or be
/// referenced, by id only, from a Checkpoint's `origin_message_ids`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Globally unique within a session (§3 invariant).
    pub id: MessageId,
    /// Role-specific payload.
    #[serde(flatten)]
    pub role: MessageRole,
    /// Epoch milliseconds.
    pub timestamp: f64,
    /// Cached token count, filled in by whoever first counts this message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
}

impl Message {
    /// Build a system-prompt message with a fresh id and `token_count:
    /// None`.
    #[must_use]
    pub fn system(text: impl Into<String>, timestamp: f64) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::System {
                content: text.into(),
            },
            timestamp,
            token_count: None,
        }
    }

    /// Build a plain-text user message.
    #[must_use]
    pub fn user(text: impl Into<String>, timestamp: f64) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::User {
                content: UserMessageContent::Text(text.into()),
            },
            timestamp,
            token_count: None,
        }
    }

    /// Build a plain-text assistant message.
    #[must_use]
    pub fn assistant(text: impl Into<String>, timestamp: f64) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::Assistant {
                content: vec![AssistantContent::text(text)],
            },
            timestamp,
            token_count: None,
        }
    }

    /// Build a tool-result message.
    #[must_use]
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        text: impl Into<String>,
        is_error: bool,
        timestamp: f64,
    ) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::Tool {
                tool_call_id: tool_call_id.into(),
                content: ToolResultMessageContent::Text(text.into()),
                is_error: if is_error { Some(true) } else { None },
            },
            timestamp,
            token_count: None,
        }
    }

    /// `true` for `system` messages.
    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self.role, MessageRole::System { .. })
    }

    /// `true` for `user` messages.
    #[must_use]
    pub fn is_user(&self) -> bool {
        matches!(self.role, MessageRole::User { .. })
    }

    /// `true` for `assistant` messages.
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        matches!(self.role, MessageRole::Assistant { .. })
    }

    /// `true` for `tool` messages.
    #[must_use]
    pub fn is_tool(&self) -> bool {
        matches!(self.role, MessageRole::Tool { .. })
    }

    /// Flatten this message's content to plain text, for serialization into
    /// compression prompts and token estimation fallbacks.
    #[must_use]
    pub fn text_content(&self) -> String {
        match &self.role {
            MessageRole::System { content } => content.clone(),
            MessageRole::User { content } => match content {
                UserMessageContent::Text(t) => t.clone(),
                UserMessageContent::Blocks(blocks) => {
                    crate::content::extract_text_from_user_content(blocks)
                }
            },
            MessageRole::Assistant { content } => content
                .iter()
                .filter_map(AssistantContent::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
            MessageRole::Tool { content, .. } => match content {
                ToolResultMessageContent::Text(t) => t.clone(),
                ToolResultMessageContent::Blocks(blocks) => blocks
                    .iter()
                    .filter_map(|b| match b {
                        ToolResultContent::Text { text } => Some(text.as_str()),
                        ToolResultContent::Image { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            },
        }
    }

    /// Return a copy with `token_count` set. Does not mutate the original
    /// (messages are immutable after creation per §3); callers that want to
    /// cache a count replace their stored copy with this one.
    #[must_use]
    pub fn with_token_count(mut self, count: u32) -> Self {
        self.token_count = Some(count);
        self
    }
}
