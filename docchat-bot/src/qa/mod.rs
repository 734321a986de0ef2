//! Document question-answering backend.
//!
//! The bot never reads a PDF itself. A document is handed to the QA service,
//! which returns an opaque handle; every question is then answered by the
//! service from that handle plus the replayed conversation history.

pub mod chatpdf;

pub use chatpdf::ChatPdfClient;

use crate::session::Turn;
use async_trait::async_trait;

/// Answer used when the service replies without any content.
pub const FALLBACK_ANSWER: &str = "No answer available.";

/// Result type for QA backend operations.
pub type QaResult<T> = Result<T, QaError>;

/// QA backend error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QaError {
    /// Uploading or deleting a document failed
    #[error("{0}")]
    Ingestion(String),

    /// Asking a question failed
    #[error("{0}")]
    Conversation(String),
}

/// Uploads documents to the QA service and releases them.
#[async_trait]
pub trait DocumentIngestion: Send + Sync {
    /// Upload a document; returns the handle used for later questions.
    async fn ingest(&self, file_bytes: Vec<u8>, file_name: &str) -> QaResult<String>;

    /// Delete a previously ingested document. Callers treat this as best-effort.
    async fn release(&self, document_handle: &str) -> QaResult<()>;
}

/// Asks questions about an ingested document.
#[async_trait]
pub trait Conversation: Send + Sync {
    /// Send the full history (newest user turn last) and return the answer text.
    async fn ask(&self, document_handle: &str, history: &[Turn]) -> QaResult<String>;
}
