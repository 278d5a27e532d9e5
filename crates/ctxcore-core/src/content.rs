//! Content block types.
//!
//! The primitive building blocks that appear inside messages. Kept separate
//! from [`crate::message`] because the Token Counter needs to size each
//! block variant independently (text, thinking, tool use, tool result,
//! image) without depending on the message-level role discrimination.

use serde::{Deserialize, Serialize};

/// Content that can appear in user messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserContent {
    /// Plain text.
    #[serde(rename = "text")]
    Text {
        /// The text.
        text: String,
    },
    /// Base64-encoded image.
    #[serde(rename = "image")]
    Image {
        /// Base64-encoded image data.
        data: String,
        /// MIME type, e.g. `image/png`.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Content that can appear in assistant messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AssistantContent {
    /// Plain text.
    #[serde(rename = "text")]
    Text {
        /// The text.
        text: String,
    },
    /// Extended thinking.
    #[serde(rename = "thinking")]
    Thinking {
        /// The thinking text.
        thinking: String,
        /// Verification signature, if the provider returned one.
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// A tool invocation requested by the model.
    #[serde(rename = "tool_use")]
    ToolUse {
        /// Tool call id.
        id: String,
        /// Tool name.
        name: String,
        /// Tool arguments.
        arguments: serde_json::Map<String, serde_json::Value>,
    },
}

/// Content that can appear in tool result messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolResultContent {
    /// Plain text.
    #[serde(rename = "text")]
    Text {
        /// The text.
        text: String,
    },
    /// Base64-encoded image.
    #[serde(rename = "image")]
    Image {
        /// Base64-encoded image data.
        data: String,
        /// MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl UserContent {
    /// Create a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// `true` if this is a text block.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// The text, if this is a text block.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

impl AssistantContent {
    /// Create a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// `true` if this is a text block.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// `true` if this is a thinking block.
    #[must_use]
    pub fn is_thinking(&self) -> bool {
        matches!(self, Self::Thinking { .. })
    }

    /// `true` if this is a tool-use block.
    #[must_use]
    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse { .. })
    }

    /// The text, if this is a text block.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Thinking { .. } | Self::ToolUse { .. } => None,
        }
    }
}

impl ToolResultContent {
    /// Create a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Extract and join text from user content blocks.
#[must_use]
pub fn extract_text_from_user_content(content: &[UserContent]) -> String {
    content
        .iter()
        .filter_map(UserContent::as_text)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_content_text_roundtrip() {
        let uc = UserContent::text("hi");
        assert!(uc.is_text());
        assert_eq!(uc.as_text(), Some("hi"));
        let json = serde_json::to_value(&uc).unwrap();
        assert_eq!(json, json!({"type": "text", "text": "hi"}));
        let back: UserContent = serde_json::from_value(json).unwrap();
        assert_eq!(back, uc);
    }

    #[test]
    fn user_content_image_is_not_text() {
        let uc = UserContent::Image {
            data: "d".into(),
            mime_type: "image/png".into(),
        };
        assert!(!uc.is_text());
        assert_eq!(uc.as_text(), None);
    }

    #[test]
    fn assistant_content_variants() {
        let text = AssistantContent::text("hello");
        assert!(text.is_text());
        assert!(!text.is_thinking());
        assert!(!text.is_tool_use());

        let thinking = AssistantContent::Thinking {
            thinking: "hmm".into(),
            signature: None,
        };
        assert!(thinking.is_thinking());

        let tool_use = AssistantContent::ToolUse {
            id: "tc-1".into(),
            name: "bash".into(),
            arguments: serde_json::Map::new(),
        };
        assert!(tool_use.is_tool_use());
    }

    #[test]
    fn tool_result_content_text() {
        let trc = ToolResultContent::text("output");
        let json = serde_json::to_value(&trc).unwrap();
        assert_eq!(json, json!({"type": "text", "text": "output"}));
    }

    #[test]
    fn extract_text_from_user_content_mixed() {
        let content = vec![
            UserContent::text("first"),
            UserContent::Image {
                data: "d".into(),
                mime_type: "image/png".into(),
            },
            UserContent::text("second"),
        ];
        assert_eq!(extract_text_from_user_content(&content), "first\nsecond");
    }

    #[test]
    fn extract_text_from_user_content_empty() {
        let content: Vec<UserContent> = vec![];
        assert_eq!(extract_text_from_user_content(&content), "");
    }
}
