//! Session and conversation turn types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a turn in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Question from the user
    User,
    /// Answer from the QA service
    Assistant,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message of the replayed history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-user association between an ingested document and its conversation.
///
/// The document handle never changes; uploading another document creates a
/// new session. History only changes through the controller, which keeps
/// user and assistant turns paired.
#[derive(Debug, Clone)]
pub struct Session {
    user_id: String,
    document_handle: String,
    document_label: String,
    history: Vec<Turn>,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with empty history.
    pub fn new(
        user_id: impl Into<String>,
        document_handle: impl Into<String>,
        document_label: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            document_handle: document_handle.into(),
            document_label: document_label.into(),
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Handle returned by the QA service for the current document.
    pub fn document_handle(&self) -> &str {
        &self.document_handle
    }

    /// Display name of the current document.
    pub fn document_label(&self) -> &str {
        &self.document_label
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn push_turn(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    /// Drop turns beyond `len`; used to roll back a failed question.
    pub(crate) fn truncate_history(&mut self, len: usize) {
        self.history.truncate(len);
    }

    pub(crate) fn clear_history(&mut self) {
        self.history.clear();
    }
}
