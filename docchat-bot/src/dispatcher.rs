//! Routes inbound events to the session controller and renders the outcome.
//!
//! Each user's events run one after another on that user's worker task, in
//! the order they were received; different users run concurrently. Failures
//! are turned into replies or logged here; nothing propagates back to the
//! polling loop.

use crate::message::{CallbackQuery, ChannelMessage, InboundEvent, MessageContent, SessionAction};
use crate::replies;
use crate::session::{
    AskOutcome, ClearOutcome, ResetOutcome, SessionController, SessionError, UploadOutcome,
};
use crate::staging::StagedDocument;
use crate::traits::{Channel, ChannelResult};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// Queues feeding the live per-user workers, keyed by user ID.
type UserQueues = DashMap<String, mpsc::UnboundedSender<InboundEvent>>;

/// Inbound event dispatcher.
pub struct Dispatcher {
    channel: Arc<dyn Channel>,
    controller: Arc<SessionController>,
    staging_dir: PathBuf,
    workers: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        channel: Arc<dyn Channel>,
        controller: Arc<SessionController>,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            channel,
            controller,
            staging_dir,
            workers: TaskTracker::new(),
        }
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    /// Handle one event inside a span carrying its trace ID.
    pub async fn handle(&self, event: InboundEvent) {
        let span = tracing::info_span!(
            "update",
            channel = self.channel.name(),
            trace_id = %event.trace_id(),
            user_id = %event.user_id(),
            chat_id = %event.chat_id(),
        );

        async {
            let result = match event {
                InboundEvent::Message(msg) => self.on_message(msg).await,
                InboundEvent::Callback(cb) => self.on_callback(cb).await,
            };

            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to deliver reply");
            }
        }
        .instrument(span)
        .await;
    }

    async fn on_message(&self, msg: ChannelMessage) -> ChannelResult<()> {
        match &msg.content {
            MessageContent::Command { name, .. } => self.on_command(&msg, name).await,
            MessageContent::Text { text } => self.on_question(&msg, text).await,
            MessageContent::Document {
                file_id,
                file_name,
                size_bytes,
                ..
            } => {
                let file_name = file_name
                    .as_deref()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or(replies::DEFAULT_FILE_NAME);
                self.on_document(&msg, file_id, file_name, *size_bytes).await
            }
        }
    }

    async fn on_command(&self, msg: &ChannelMessage, name: &str) -> ChannelResult<()> {
        let reply = match name {
            "start" | "help" => replies::welcome(),
            "reset" => match self.controller.reset(&msg.user_id).await {
                ResetOutcome::Closed { label } => replies::reset_done(&label),
                ResetOutcome::NothingToReset => replies::nothing_to_reset(),
            },
            other => replies::unknown_command(other),
        };

        self.channel.send_text(&msg.chat_id, &reply).await?;
        Ok(())
    }

    async fn on_question(&self, msg: &ChannelMessage, question: &str) -> ChannelResult<()> {
        if !self.controller.has_session(&msg.user_id).await {
            self.channel
                .send_text(&msg.chat_id, &replies::upload_first())
                .await?;
            return Ok(());
        }

        if let Err(e) = self.channel.send_typing(&msg.chat_id).await {
            tracing::debug!(error = %e, "Typing indicator failed");
        }

        match self.controller.ask(&msg.user_id, question).await {
            Ok(AskOutcome::Answered { answer }) => {
                self.channel
                    .send_formatted(
                        &msg.chat_id,
                        &replies::answer(&answer),
                        &SessionAction::ANSWER_ACTIONS,
                    )
                    .await?;
            }
            Ok(AskOutcome::NoSession) => {
                self.channel
                    .send_text(&msg.chat_id, &replies::upload_first())
                    .await?;
            }
            Err(SessionError::Validation(v)) => {
                self.channel
                    .send_text(&msg.chat_id, &replies::validation(&v))
                    .await?;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Question failed");
                self.channel
                    .send_text(&msg.chat_id, &replies::question_failed(&e.to_string()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn on_document(
        &self,
        msg: &ChannelMessage,
        file_id: &str,
        file_name: &str,
        size_bytes: Option<u64>,
    ) -> ChannelResult<()> {
        if let Err(SessionError::Validation(v)) =
            self.controller.check_document(file_name, size_bytes)
        {
            tracing::info!(document = %file_name, reason = %v, "Document rejected");
            self.channel
                .send_text(&msg.chat_id, &replies::validation(&v))
                .await?;
            return Ok(());
        }

        let status_id = self
            .channel
            .send_text(&msg.chat_id, &replies::upload_status(file_name))
            .await?;

        let reply = match self.ingest(msg, file_id, file_name).await {
            Ok(outcome) => replies::upload_success(&outcome.label),
            Err(SessionError::Validation(v)) => replies::validation(&v),
            Err(e) => {
                tracing::warn!(document = %file_name, error = %e, "Upload failed");
                replies::upload_failed(&e.to_string())
            }
        };

        self.channel
            .edit_text(&msg.chat_id, status_id, &reply)
            .await
    }

    /// Download into a staged file and hand it to the controller.
    async fn ingest(
        &self,
        msg: &ChannelMessage,
        file_id: &str,
        file_name: &str,
    ) -> Result<UploadOutcome, SessionError> {
        let staged = StagedDocument::create_in(&self.staging_dir, file_name)
            .map_err(|e| SessionError::Ingestion(format!("cannot stage file: {e}")))?;

        self.channel
            .download_to(file_id, staged.path())
            .await
            .map_err(|e| SessionError::Ingestion(e.to_string()))?;

        let bytes = staged
            .read()
            .await
            .map_err(|e| SessionError::Ingestion(format!("cannot read staged file: {e}")))?;

        self.controller
            .upload(&msg.user_id, bytes, staged.file_name())
            .await
    }

    async fn on_callback(&self, cb: CallbackQuery) -> ChannelResult<()> {
        let Some(action) = SessionAction::from_callback_data(&cb.data) else {
            tracing::warn!(data = %cb.data, "Unknown callback data");
            return self.channel.answer_callback(&cb.id, None).await;
        };

        match action {
            SessionAction::NewDocument => {
                self.controller.start_new_document(&cb.from_user_id).await;
                self.channel
                    .answer_callback(&cb.id, Some(replies::TOAST_NEW_DOCUMENT))
                    .await?;
                self.channel
                    .send_text(&cb.chat_id, &replies::new_document_ready())
                    .await?;
            }
            SessionAction::ClearHistory => match self.controller.clear_history(&cb.from_user_id).await {
                ClearOutcome::Cleared { .. } => {
                    self.channel
                        .answer_callback(&cb.id, Some(replies::TOAST_HISTORY_CLEARED))
                        .await?;
                    self.channel
                        .send_text(&cb.chat_id, &replies::history_cleared())
                        .await?;
                }
                ClearOutcome::NoSession => {
                    self.channel
                        .answer_callback(&cb.id, Some(replies::TOAST_NO_SESSION))
                        .await?;
                }
            },
        }
        Ok(())
    }

    /// Spawn the loop that routes each event to its user's worker.
    pub fn spawn_processor(
        dispatcher: Arc<Self>,
        mut rx: mpsc::Receiver<InboundEvent>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Dispatcher started");
            let queues: Arc<UserQueues> = Arc::new(DashMap::new());

            while let Some(event) = rx.recv().await {
                Self::route(&dispatcher, &queues, event);
            }

            tracing::info!("Dispatcher stopped");
        })
    }

    /// Queue an event behind the user's earlier events, starting a worker if
    /// the user has none.
    fn route(dispatcher: &Arc<Self>, queues: &Arc<UserQueues>, event: InboundEvent) {
        let user_id = event.user_id().to_string();

        // The shard read lock is held across the send, so the worker cannot
        // deregister in between.
        let event = match queues.get(&user_id) {
            Some(tx) => match tx.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(event);
        queues.insert(user_id.clone(), tx);

        let worker = Arc::clone(dispatcher);
        let queues = Arc::clone(queues);
        dispatcher.workers.spawn(async move {
            worker.drain_user_queue(&queues, &user_id, rx).await;
        });
    }

    /// Handle one user's events in order until the queue is empty.
    async fn drain_user_queue(
        &self,
        queues: &UserQueues,
        user_id: &str,
        mut rx: mpsc::UnboundedReceiver<InboundEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            self.handle(event).await;

            if queues.remove_if(user_id, |_, _| rx.is_empty()).is_some() {
                break;
            }
        }
    }

    /// Wait up to `grace` for in-flight events, then for pending releases.
    ///
    /// Returns `false` if anything was still running at the deadline.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.workers.close();
        let handled = tokio::time::timeout(grace, self.workers.wait())
            .await
            .is_ok();
        if !handled {
            tracing::warn!(
                in_flight = self.workers.len(),
                "Shutting down with events still in flight"
            );
        }

        self.controller.drain_releases(grace).await && handled
    }
}
