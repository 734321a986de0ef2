//! Docchat Bot - ask questions about a PDF from Telegram.
//!
//! A user uploads a PDF, the bot hands it to ChatPDF and keeps a per-user
//! session holding the returned document handle and the conversation so far.
//! Each question is answered by ChatPDF from the handle plus the replayed
//! history.
//!
//! ## Architecture
//!
//! ```text
//! Telegram ── getUpdates ──→ TelegramChannel ──→ Dispatcher ──→ SessionController
//!                                                    │              │
//! Telegram ←── sendMessage ←── Channel ←─────────────┘         ChatPdfClient
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod dispatcher;
pub mod message;
pub mod qa;
pub mod replies;
pub mod session;
pub mod staging;
pub mod telegram;
pub mod traits;

pub use dispatcher::Dispatcher;
pub use message::{CallbackQuery, ChannelMessage, InboundEvent, MessageContent, SessionAction};
pub use qa::{ChatPdfClient, Conversation, DocumentIngestion, QaError, QaResult};
pub use session::{
    AskOutcome, ClearOutcome, DocumentPolicy, ResetOutcome, Session, SessionController,
    SessionError, SessionStore, Turn, TurnRole, UploadOutcome, ValidationError,
};
pub use staging::StagedDocument;
pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelError, ChannelResult};

use anyhow::Context;
use docchat_common::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of the queue between the poller and the dispatcher.
const EVENT_QUEUE_SIZE: usize = 256;

/// How long shutdown waits for in-flight events and document releases.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Start the bot and run until the poller stops or Ctrl-C is received.
pub async fn start_bot(config: &Config) -> anyhow::Result<()> {
    let bot_token = config
        .telegram_bot_token()
        .context("TELEGRAM_BOT_TOKEN is not set")?;
    let api_key = config
        .chatpdf_api_key()
        .context("CHATPDF_API_KEY is not set")?;

    let telegram = Arc::new(TelegramChannel::from_config(&config.telegram, bot_token));
    telegram.init().await?;

    if let Err(e) = telegram.register_commands(telegram::BOT_COMMANDS).await {
        tracing::warn!(error = %e, "Failed to register bot commands");
    }

    let chatpdf = Arc::new(ChatPdfClient::from_config(&config.chatpdf, api_key));
    let controller = Arc::new(SessionController::new(
        SessionStore::new(),
        chatpdf.clone(),
        chatpdf,
        DocumentPolicy::from_config(&config.documents),
    ));

    let staging_dir = config.documents.staging_path();
    staging::prepare_dir(&staging_dir).await.with_context(|| {
        format!(
            "Failed to create staging directory {}",
            staging_dir.display()
        )
    })?;

    let dispatcher = Arc::new(Dispatcher::new(telegram.clone(), controller, staging_dir));

    let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let mut processor_handle = Dispatcher::spawn_processor(dispatcher.clone(), rx);

    tracing::info!("Bot is ready to process PDFs");

    let listened = tokio::select! {
        result = telegram.listen(tx) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    // The poller's sender is gone; let the processor route what it already has.
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut processor_handle)
        .await
        .is_err()
    {
        processor_handle.abort();
    }
    if dispatcher.shutdown(SHUTDOWN_GRACE).await {
        tracing::info!("Shutdown complete");
    }

    listened?;
    Ok(())
}
