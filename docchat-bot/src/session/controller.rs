//! Session lifecycle controller.
//!
//! Every user is either without a session or has exactly one active session
//! bound to an ingested document. All transitions run while the user's slot
//! is held, so concurrent events from one user are applied in order.

use super::store::SessionStore;
use super::types::{Session, Turn};
use crate::qa::{Conversation, DocumentIngestion, QaError};
use chrono::Utc;
use docchat_common::config::DocumentsConfig;
use docchat_common::util::format_bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

// ============================================================================
// Errors
// ============================================================================

/// Input rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unsupported file type: {file_name}")]
    UnsupportedType { file_name: String },

    #[error("file is too large: {} (limit {})", format_bytes(*.size), format_bytes(*.limit))]
    TooLarge { size: u64, limit: u64 },

    #[error("question is empty")]
    EmptyQuestion,
}

/// Controller error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Ingestion(String),

    #[error("{0}")]
    Conversation(String),
}

impl From<QaError> for SessionError {
    fn from(err: QaError) -> Self {
        match err {
            QaError::Ingestion(detail) => Self::Ingestion(detail),
            QaError::Conversation(detail) => Self::Conversation(detail),
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Label of the new document
    pub label: String,
    /// Label of the document this upload replaced, if any
    pub replaced: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskOutcome {
    Answered { answer: String },
    NoSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The session for this document was closed
    Closed { label: String },
    NothingToReset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared { label: String },
    NoSession,
}

// ============================================================================
// Document Policy
// ============================================================================

/// Which documents are accepted for ingestion.
#[derive(Debug, Clone)]
pub struct DocumentPolicy {
    allowed_extensions: Vec<String>,
    max_file_bytes: u64,
}

impl DocumentPolicy {
    pub fn new(allowed_extensions: Vec<String>, max_file_bytes: u64) -> Self {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            max_file_bytes,
        }
    }

    pub fn from_config(config: &DocumentsConfig) -> Self {
        Self::new(config.allowed_extensions.clone(), config.max_file_bytes)
    }

    /// Check the file name and, when known, the size.
    pub fn check(&self, file_name: &str, size: Option<u64>) -> Result<(), ValidationError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        let allowed = extension.is_some_and(|ext| self.allowed_extensions.contains(&ext));
        if !allowed {
            return Err(ValidationError::UnsupportedType {
                file_name: file_name.to_string(),
            });
        }

        match size {
            Some(size) if size > self.max_file_bytes => Err(ValidationError::TooLarge {
                size,
                limit: self.max_file_bytes,
            }),
            _ => Ok(()),
        }
    }
}

impl Default for DocumentPolicy {
    fn default() -> Self {
        Self::from_config(&DocumentsConfig::default())
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Orchestrates uploads, questions and resets against the QA service.
pub struct SessionController {
    store: SessionStore,
    ingestion: Arc<dyn DocumentIngestion>,
    conversation: Arc<dyn Conversation>,
    policy: DocumentPolicy,
    releases: TaskTracker,
}

impl SessionController {
    pub fn new(
        store: SessionStore,
        ingestion: Arc<dyn DocumentIngestion>,
        conversation: Arc<dyn Conversation>,
        policy: DocumentPolicy,
    ) -> Self {
        Self {
            store,
            ingestion,
            conversation,
            policy,
            releases: TaskTracker::new(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Validate a document before it is downloaded.
    pub fn check_document(&self, file_name: &str, size: Option<u64>) -> Result<(), SessionError> {
        self.policy.check(file_name, size).map_err(SessionError::from)
    }

    /// Ingest a document and make it the user's active session.
    ///
    /// On failure the previous state is untouched. On success any previous
    /// session is replaced and its handle released in the background.
    pub async fn upload(
        &self,
        user_id: &str,
        file_bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<UploadOutcome, SessionError> {
        self.check_document(file_name, Some(file_bytes.len() as u64))?;

        let mut slot = self.store.lock(user_id).await;
        let handle = self.ingestion.ingest(file_bytes, file_name).await?;

        let displaced = slot.put(Session::new(user_id, handle, file_name));
        drop(slot);

        tracing::info!(
            document = %file_name,
            replaced = displaced.is_some(),
            active_sessions = self.store.active_sessions(),
            "Session started"
        );

        let replaced = displaced.map(|old| {
            let label = old.document_label().to_string();
            self.release_in_background(old);
            label
        });

        Ok(UploadOutcome {
            label: file_name.to_string(),
            replaced,
        })
    }

    /// Ask a question about the user's current document.
    ///
    /// History grows by a user turn and an assistant turn together, or not
    /// at all.
    pub async fn ask(&self, user_id: &str, question: &str) -> Result<AskOutcome, SessionError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion.into());
        }

        let mut slot = self.store.lock(user_id).await;
        let Some(session) = slot.session_mut() else {
            return Ok(AskOutcome::NoSession);
        };

        let checkpoint = session.history().len();
        session.push_turn(Turn::user(question));

        match self
            .conversation
            .ask(session.document_handle(), session.history())
            .await
        {
            Ok(answer) => {
                session.push_turn(Turn::assistant(answer.clone()));
                tracing::debug!(turns = session.history().len(), "Question answered");
                Ok(AskOutcome::Answered { answer })
            }
            Err(e) => {
                session.truncate_history(checkpoint);
                Err(e.into())
            }
        }
    }

    /// Close the user's session and release its document.
    pub async fn reset(&self, user_id: &str) -> ResetOutcome {
        let removed = self.store.lock(user_id).await.remove();

        match removed {
            Some(session) => {
                let label = session.document_label().to_string();
                tracing::info!(
                    document = %label,
                    age_secs = (Utc::now() - session.created_at()).num_seconds(),
                    active_sessions = self.store.active_sessions(),
                    "Session closed"
                );
                self.release_in_background(session);
                ResetOutcome::Closed { label }
            }
            None => ResetOutcome::NothingToReset,
        }
    }

    /// Drop any session so the next upload starts fresh. Valid in either state.
    pub async fn start_new_document(&self, user_id: &str) -> ResetOutcome {
        self.reset(user_id).await
    }

    /// Empty the history while keeping the document.
    pub async fn clear_history(&self, user_id: &str) -> ClearOutcome {
        let mut slot = self.store.lock(user_id).await;
        let label = slot.session().map(|s| s.document_label().to_string());

        match label {
            Some(label) if slot.clear_history() => ClearOutcome::Cleared { label },
            _ => ClearOutcome::NoSession,
        }
    }

    pub async fn has_session(&self, user_id: &str) -> bool {
        self.store.lock(user_id).await.session().is_some()
    }

    /// Wait up to `grace` for background releases to finish.
    ///
    /// Returns `false` if some were still running at the deadline.
    pub async fn drain_releases(&self, grace: Duration) -> bool {
        self.releases.close();
        let pending = self.releases.len();
        let drained = tokio::time::timeout(grace, self.releases.wait())
            .await
            .is_ok();
        if !drained {
            tracing::warn!(
                pending = self.releases.len(),
                "Shutting down with document releases still in flight"
            );
        } else if pending > 0 {
            tracing::info!(released = pending, "Pending document releases finished");
        }
        drained
    }

    fn release_in_background(&self, session: Session) {
        let ingestion = Arc::clone(&self.ingestion);
        self.releases.spawn(async move {
            if let Err(e) = ingestion.release(session.document_handle()).await {
                tracing::warn!(
                    user_id = %session.user_id(),
                    document = %session.document_label(),
                    "Failed to release document: {e}"
                );
            }
        });
    }
}
