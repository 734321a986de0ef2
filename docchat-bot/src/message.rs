//! Message types for channel communication.

use serde::{Deserialize, Serialize};

/// Inbound message from the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (channel-specific)
    pub id: String,
    /// Chat the message was sent in (replies go here)
    pub chat_id: String,
    /// User identifier (session key)
    pub user_id: String,
    /// Sender username, when the platform provides one
    #[serde(default)]
    pub username: Option<String>,
    /// Message content
    pub content: MessageContent,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
    /// Trace ID assigned on receipt
    pub trace_id: String,
}

/// Message content types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    /// Plain text message (a question)
    Text { text: String },
    /// Bot command such as `/start` or `/reset`
    Command { name: String, args: String },
    /// File/document message
    Document {
        file_id: String,
        file_name: Option<String>,
        mime_type: Option<String>,
        size_bytes: Option<u64>,
    },
}

impl MessageContent {
    /// Parse text into a command when it starts with `/`.
    ///
    /// `/reset@docchat_bot now` becomes `Command { name: "reset", args: "now" }`.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Text {
                text: text.to_string(),
            };
        };

        let (head, args) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(h, a)| (h, a.trim()));
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        if name.is_empty() {
            return Self::Text {
                text: text.to_string(),
            };
        }

        Self::Command {
            name,
            args: args.to_string(),
        }
    }
}

impl ChannelMessage {
    /// Get the text content if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Callback query received when a user presses an inline button.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from_user_id: String,
    pub from_username: Option<String>,
    pub chat_id: String,
    pub message_id: i64,
    pub data: String,
    pub trace_id: String,
}

/// Any update the dispatcher handles.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message(ChannelMessage),
    Callback(CallbackQuery),
}

impl InboundEvent {
    /// User the event belongs to.
    pub fn user_id(&self) -> &str {
        match self {
            Self::Message(m) => &m.user_id,
            Self::Callback(c) => &c.from_user_id,
        }
    }

    /// Chat the event came from.
    pub fn chat_id(&self) -> &str {
        match self {
            Self::Message(m) => &m.chat_id,
            Self::Callback(c) => &c.chat_id,
        }
    }

    pub fn trace_id(&self) -> &str {
        match self {
            Self::Message(m) => &m.trace_id,
            Self::Callback(c) => &c.trace_id,
        }
    }
}

/// Follow-up actions offered under every answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionAction {
    /// Drop the current document and wait for a new one
    NewDocument,
    /// Empty the conversation history, keep the document
    ClearHistory,
}

impl SessionAction {
    /// Actions attached to an answer, in display order.
    pub const ANSWER_ACTIONS: [Self; 2] = [Self::NewDocument, Self::ClearHistory];

    /// Callback payload sent back by the platform.
    pub const fn callback_data(self) -> &'static str {
        match self {
            Self::NewDocument => "new_chat",
            Self::ClearHistory => "clear_history",
        }
    }

    /// Button label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::NewDocument => "📥 Upload a new PDF",
            Self::ClearHistory => "🔄 Clear history",
        }
    }

    /// Parse a callback payload.
    pub fn from_callback_data(data: &str) -> Option<Self> {
        match data {
            "new_chat" => Some(Self::NewDocument),
            "clear_history" => Some(Self::ClearHistory),
            _ => None,
        }
    }
}
