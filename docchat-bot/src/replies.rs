//! User-facing texts.

use crate::session::ValidationError;
use docchat_common::util::format_bytes;

pub const TOAST_NEW_DOCUMENT: &str = "Starting over! 🆕";
pub const TOAST_HISTORY_CLEARED: &str = "History cleared! 🧹";
pub const TOAST_NO_SESSION: &str = "No active session to clear!";

/// Name used when the platform gives no file name.
pub const DEFAULT_FILE_NAME: &str = "document.pdf";

const UPLOAD_SUGGESTIONS: &[&str] = &[
    "Check that the PDF is not corrupted",
    "Make sure the file is not password-protected",
    "Upload a different PDF",
];

const QUESTION_SUGGESTIONS: &[&str] = &[
    "Rephrase your question",
    "Check your internet connection",
    "Use /reset and upload the PDF again",
];

fn bullets(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("• {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn welcome() -> String {
    "👋 Welcome to the PDF Chat Assistant!\n\n\
     I can read PDF documents and answer questions about their contents. How to use me:\n\n\
     1️⃣ Send me a PDF file\n\
     2️⃣ Once it is uploaded, ask any question about it\n\
     3️⃣ Use /reset to close the current document\n\n\
     📝 Tips:\n\
     • Specific questions get better answers\n\
     • You can upload a new PDF at any time\n\
     • The conversation is remembered until you reset\n\n\
     Ready? Send a PDF! 📚"
        .to_string()
}

pub fn upload_status(file_name: &str) -> String {
    format!("📤 Processing: {file_name}\n\nPlease wait while I analyze the document...")
}

pub fn upload_success(file_name: &str) -> String {
    format!(
        "✅ Uploaded: {file_name}\n\n\
         Now you can:\n\
         • Ask any question about the document\n\
         • Upload another PDF to switch documents\n\
         • Use /reset to start over\n\n\
         What would you like to know about your PDF? 🤔"
    )
}

pub fn upload_failed(detail: &str) -> String {
    format!(
        "❌ Sorry, something went wrong while processing the PDF.\n\n\
         Error details: {detail}\n\n\
         Try to:\n{}",
        bullets(UPLOAD_SUGGESTIONS)
    )
}

pub fn validation(err: &ValidationError) -> String {
    match err {
        ValidationError::UnsupportedType { .. } => {
            "⚠️ Please send a PDF file.\n\nMake sure the file has a .pdf extension.".to_string()
        }
        ValidationError::TooLarge { size, limit } => format!(
            "⚠️ This file is too large ({}).\n\nThe largest PDF I can accept is {}.",
            format_bytes(*size),
            format_bytes(*limit)
        ),
        ValidationError::EmptyQuestion => {
            "✏️ Please type a question about your document.".to_string()
        }
    }
}

pub fn upload_first() -> String {
    "📥 Please send a PDF file first!\n\nI need a document to answer questions about.".to_string()
}

pub fn question_failed(detail: &str) -> String {
    format!(
        "❌ Sorry, I could not process your question.\n\n\
         Error: {detail}\n\n\
         Try to:\n{}",
        bullets(QUESTION_SUGGESTIONS)
    )
}

/// Answer body; `**bold**` markers are left for the transport to render.
pub fn answer(text: &str) -> String {
    format!("🤖 Answer:\n{text}")
}

pub fn reset_done(label: &str) -> String {
    format!(
        "✨ Reset complete!\n\n\
         • Closed: {label}\n\
         • Conversation history deleted\n\n\
         Send a new PDF whenever you are ready!"
    )
}

pub fn nothing_to_reset() -> String {
    "ℹ️ There is no active document. Send a PDF to get started!".to_string()
}

pub fn new_document_ready() -> String {
    "Ready for a new document! 📚\nSend a PDF to get started.".to_string()
}

pub fn history_cleared() -> String {
    "Conversation history cleared.\nYour PDF is still loaded, ask away!".to_string()
}

pub fn unknown_command(name: &str) -> String {
    format!("🤷 Unknown command /{name}.\n\nUse /start for instructions or /reset to close the current document.")
}
