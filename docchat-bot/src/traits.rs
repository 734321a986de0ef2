//! Channel traits for implementing chat transports.

use crate::message::SessionAction;
use async_trait::async_trait;
use std::path::Path;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("File download failed: {0}")]
    Download(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outbound surface of a chat platform.
///
/// The dispatcher only talks to the platform through this trait, so tests can
/// record replies without a network.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Send plain text; returns the platform message ID.
    async fn send_text(&self, chat_id: &str, text: &str) -> ChannelResult<i64>;

    /// Send lightly marked-up text (`**bold**`) with inline action buttons.
    ///
    /// Returns the ID of the last message sent.
    async fn send_formatted(
        &self,
        chat_id: &str,
        text: &str,
        actions: &[SessionAction],
    ) -> ChannelResult<i64>;

    /// Replace the text of a previously sent message.
    async fn edit_text(&self, chat_id: &str, message_id: i64, text: &str) -> ChannelResult<()>;

    /// Acknowledge a button press, optionally with a short toast.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> ChannelResult<()>;

    /// Show a typing indicator.
    async fn send_typing(&self, chat_id: &str) -> ChannelResult<()>;

    /// Download a file into `dest`; returns the number of bytes written.
    async fn download_to(&self, file_id: &str, dest: &Path) -> ChannelResult<u64>;
}
