use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

/// Non-text content that arrives alongside an assistant response.
/// Parts are append-only while the message is streaming.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Part {
    /// A chain-of-thought segment.
    Reasoning { text: String },
    /// A tool the model invoked while producing the response.
    ToolInvocation {
        tool_name: String,
        arguments: serde_json::Value,
        result: Option<String>,
    },
    /// A citation the response drew from.
    Source { url: String, title: Option<String> },
}

/// A file attached to a user message.
///
/// Created at selection time with a local preview URL and zero progress;
/// the upload coordinator advances `upload_progress` and swaps `url` for
/// the stable media path once the upload resolves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub url: String,
    pub upload_progress: u8,
}

/// A single message in a conversation.
///
/// `content` grows monotonically only while `role` is `Assistant` and the
/// message is the one currently streaming; it is immutable otherwise.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub parts: Vec<Part>,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a user message with its resolved attachments.
    pub fn user(content: String, attachments: Vec<Attachment>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content,
            parts: Vec::new(),
            attachments,
            created_at: Utc::now(),
        }
    }

    /// Create the empty assistant message a stream writes into.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: String::new(),
            parts: Vec::new(),
            attachments: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}
