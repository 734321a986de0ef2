//! Dispatcher tests with a recording channel and a scripted QA backend.

use async_trait::async_trait;
use docchat_bot::qa::QaResult;
use docchat_bot::{
    CallbackQuery, Channel, ChannelError, ChannelMessage, ChannelResult, Conversation,
    Dispatcher, DocumentIngestion, DocumentPolicy, InboundEvent, MessageContent, QaError,
    SessionAction, SessionController, SessionStore, Turn,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────────────
// Test doubles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text {
        chat_id: String,
        text: String,
    },
    Formatted {
        text: String,
        actions: Vec<SessionAction>,
    },
    Edit {
        message_id: i64,
        text: String,
    },
    Callback {
        id: String,
        text: Option<String>,
    },
    Typing,
}

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    fail_download: AtomicBool,
    slow_first_typing: AtomicBool,
    staged_paths: Mutex<Vec<PathBuf>>,
}

impl RecordingChannel {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } | Sent::Formatted { text, .. } | Sent::Edit { text, .. } => {
                    Some(text)
                }
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> ChannelResult<i64> {
        self.record(Sent::Text {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        });
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 100)
    }

    async fn send_formatted(
        &self,
        _chat_id: &str,
        text: &str,
        actions: &[SessionAction],
    ) -> ChannelResult<i64> {
        self.record(Sent::Formatted {
            text: text.to_string(),
            actions: actions.to_vec(),
        });
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 100)
    }

    async fn edit_text(&self, _chat_id: &str, message_id: i64, text: &str) -> ChannelResult<()> {
        self.record(Sent::Edit {
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> ChannelResult<()> {
        self.record(Sent::Callback {
            id: callback_id.to_string(),
            text: text.map(String::from),
        });
        Ok(())
    }

    async fn send_typing(&self, _chat_id: &str) -> ChannelResult<()> {
        if self.slow_first_typing.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.record(Sent::Typing);
        Ok(())
    }

    async fn download_to(&self, _file_id: &str, dest: &Path) -> ChannelResult<u64> {
        self.staged_paths.lock().unwrap().push(dest.to_path_buf());
        if self.fail_download.load(Ordering::SeqCst) {
            return Err(ChannelError::Download("file is too big".into()));
        }
        let bytes = b"%PDF-1.4 fake";
        tokio::fs::write(dest, bytes)
            .await
            .map_err(|e| ChannelError::Internal(e.to_string()))?;
        Ok(bytes.len() as u64)
    }
}

#[derive(Default)]
struct ScriptedQa {
    fail_ingest: AtomicBool,
    fail_ask: AtomicBool,
    fail_release: AtomicBool,
    ingested: Mutex<Vec<(String, usize)>>,
    release_attempts: Mutex<Vec<String>>,
}

#[async_trait]
impl DocumentIngestion for ScriptedQa {
    async fn ingest(&self, file_bytes: Vec<u8>, file_name: &str) -> QaResult<String> {
        if self.fail_ingest.load(Ordering::SeqCst) {
            return Err(QaError::Ingestion("ChatPDF returned 400 Bad Request".into()));
        }
        self.ingested
            .lock()
            .unwrap()
            .push((file_name.to_string(), file_bytes.len()));
        Ok("src_1".into())
    }

    async fn release(&self, document_handle: &str) -> QaResult<()> {
        self.release_attempts
            .lock()
            .unwrap()
            .push(document_handle.to_string());
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(QaError::Ingestion("ChatPDF returned 500".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Conversation for ScriptedQa {
    async fn ask(&self, _document_handle: &str, _history: &[Turn]) -> QaResult<String> {
        if self.fail_ask.load(Ordering::SeqCst) {
            return Err(QaError::Conversation("ChatPDF returned 502 Bad Gateway".into()));
        }
        Ok("The total is **42**.".into())
    }
}

struct Harness {
    channel: Arc<RecordingChannel>,
    qa: Arc<ScriptedQa>,
    dispatcher: Arc<Dispatcher>,
    _staging: tempfile::TempDir,
}

fn harness() -> Harness {
    let channel = Arc::new(RecordingChannel::default());
    let qa = Arc::new(ScriptedQa::default());
    let staging = tempfile::tempdir().unwrap();

    let controller = Arc::new(SessionController::new(
        SessionStore::new(),
        qa.clone(),
        qa.clone(),
        DocumentPolicy::default(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        channel.clone(),
        controller,
        staging.path().to_path_buf(),
    ));

    Harness {
        channel,
        qa,
        dispatcher,
        _staging: staging,
    }
}

fn message(content: MessageContent) -> InboundEvent {
    InboundEvent::Message(ChannelMessage {
        id: "1".into(),
        chat_id: "42".into(),
        user_id: "42".into(),
        username: Some("alice".into()),
        content,
        timestamp: 0,
        trace_id: "trace-test".into(),
    })
}

fn text(text: &str) -> InboundEvent {
    message(MessageContent::from_text(text))
}

fn document(file_name: Option<&str>) -> InboundEvent {
    message(MessageContent::Document {
        file_id: "file-1".into(),
        file_name: file_name.map(String::from),
        mime_type: Some("application/pdf".into()),
        size_bytes: Some(13),
    })
}

fn callback(data: &str) -> InboundEvent {
    InboundEvent::Callback(CallbackQuery {
        id: "cbq-1".into(),
        from_user_id: "42".into(),
        from_username: None,
        chat_id: "42".into(),
        message_id: 7,
        data: data.into(),
        trace_id: "trace-test".into(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands and questions
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_sends_welcome() {
    let h = harness();
    h.dispatcher.handle(text("/start")).await;

    let texts = h.channel.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("Welcome"));
    assert!(texts[0].contains("/reset"));
}

#[tokio::test]
async fn test_question_without_document() {
    let h = harness();
    h.dispatcher.handle(text("hello")).await;

    assert_eq!(
        h.channel.sent(),
        vec![Sent::Text {
            chat_id: "42".into(),
            text: docchat_bot::replies::upload_first(),
        }]
    );
}

#[tokio::test]
async fn test_unknown_command() {
    let h = harness();
    h.dispatcher.handle(text("/frobnicate")).await;

    assert!(h.channel.texts()[0].contains("/frobnicate"));
}

#[tokio::test]
async fn test_reset_without_session() {
    let h = harness();
    h.dispatcher.handle(text("/reset")).await;

    assert_eq!(
        h.channel.texts(),
        vec![docchat_bot::replies::nothing_to_reset()]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Documents
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_document_upload_edits_status_message() {
    let h = harness();
    h.dispatcher.handle(document(Some("report.pdf"))).await;

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 2);
    let Sent::Text { text: status, .. } = &sent[0] else {
        panic!("expected status message");
    };
    assert!(status.contains("Processing: report.pdf"));
    let Sent::Edit { message_id, text } = &sent[1] else {
        panic!("expected status edit");
    };
    assert_eq!(*message_id, 100);
    assert!(text.contains("Uploaded: report.pdf"));

    assert_eq!(
        h.qa.ingested.lock().unwrap().clone(),
        vec![("report.pdf".to_string(), 13)]
    );
}

#[tokio::test]
async fn test_staged_file_removed_after_success() {
    let h = harness();
    h.dispatcher.handle(document(Some("report.pdf"))).await;

    let paths = h.channel.staged_paths.lock().unwrap().clone();
    assert_eq!(paths.len(), 1);
    assert!(!paths[0].exists());
}

#[tokio::test]
async fn test_staged_file_removed_after_ingestion_failure() {
    let h = harness();
    h.qa.fail_ingest.store(true, Ordering::SeqCst);
    h.dispatcher.handle(document(Some("report.pdf"))).await;

    let paths = h.channel.staged_paths.lock().unwrap().clone();
    assert_eq!(paths.len(), 1);
    assert!(!paths[0].exists());

    let texts = h.channel.texts();
    let last = texts.last().unwrap();
    assert!(last.contains("ChatPDF returned 400 Bad Request"));
    assert!(last.contains("password-protected"));
}

#[tokio::test]
async fn test_download_failure_reported_in_status() {
    let h = harness();
    h.channel.fail_download.store(true, Ordering::SeqCst);
    h.dispatcher.handle(document(Some("report.pdf"))).await;

    let sent = h.channel.sent();
    let Some(Sent::Edit { text, .. }) = sent.last() else {
        panic!("expected status edit");
    };
    assert!(text.contains("file is too big"));
    assert!(h.qa.ingested.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_non_pdf_rejected_before_download() {
    let h = harness();
    h.dispatcher.handle(document(Some("notes.docx"))).await;

    assert!(h.channel.staged_paths.lock().unwrap().is_empty());
    let texts = h.channel.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains(".pdf"));
}

#[tokio::test]
async fn test_missing_file_name_defaults_to_document_pdf() {
    let h = harness();
    h.dispatcher.handle(document(None)).await;

    assert_eq!(h.qa.ingested.lock().unwrap()[0].0, "document.pdf");
}

// ─────────────────────────────────────────────────────────────────────────────
// Answers and buttons
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_answer_has_prefix_and_actions() {
    let h = harness();
    h.dispatcher.handle(document(Some("report.pdf"))).await;
    h.dispatcher.handle(text("What is the total?")).await;

    let sent = h.channel.sent();
    assert!(sent.contains(&Sent::Typing));
    assert_eq!(
        sent.last(),
        Some(&Sent::Formatted {
            text: "🤖 Answer:\nThe total is **42**.".into(),
            actions: SessionAction::ANSWER_ACTIONS.to_vec(),
        })
    );
}

#[tokio::test]
async fn test_question_failure_reports_detail_and_keeps_history() {
    let h = harness();
    h.dispatcher.handle(document(Some("report.pdf"))).await;
    h.dispatcher.handle(text("first")).await;

    h.qa.fail_ask.store(true, Ordering::SeqCst);
    h.dispatcher.handle(text("second")).await;

    let texts = h.channel.texts();
    let reply = texts.last().unwrap();
    assert!(reply.contains("could not process your question"));
    assert!(reply.contains("ChatPDF returned 502 Bad Gateway"));
    assert!(reply.contains("Rephrase your question"));
    assert!(reply.contains("/reset"));

    let session = h.dispatcher.controller().store().get("42").await.unwrap();
    assert_eq!(
        session.history(),
        &[Turn::user("first"), Turn::assistant("The total is **42**.")]
    );
}

#[tokio::test]
async fn test_release_failure_is_not_shown_to_user() {
    let h = harness();
    h.qa.fail_release.store(true, Ordering::SeqCst);

    h.dispatcher.handle(document(Some("a.pdf"))).await;
    h.dispatcher.handle(document(Some("b.pdf"))).await;
    h.dispatcher.handle(text("/reset")).await;
    assert!(h.dispatcher.shutdown(Duration::from_secs(5)).await);

    assert_eq!(h.qa.release_attempts.lock().unwrap().len(), 2);
    assert!(h.dispatcher.controller().store().get("42").await.is_none());

    let texts = h.channel.texts();
    assert_eq!(texts.len(), 5);
    assert!(texts[3].contains("Uploaded: b.pdf"));
    assert!(texts[4].contains("Closed: b.pdf"));
    assert!(texts.iter().all(|t| !t.contains("500")));
}

#[tokio::test]
async fn test_reset_names_closed_document() {
    let h = harness();
    h.dispatcher.handle(document(Some("report.pdf"))).await;
    h.dispatcher.handle(text("/reset")).await;

    let texts = h.channel.texts();
    assert!(texts.last().unwrap().contains("Closed: report.pdf"));

    h.dispatcher.handle(text("hello")).await;
    assert_eq!(
        h.channel.texts().last().unwrap(),
        &docchat_bot::replies::upload_first()
    );
}

#[tokio::test]
async fn test_clear_history_callback_without_session() {
    let h = harness();
    h.dispatcher.handle(callback("clear_history")).await;

    assert_eq!(
        h.channel.sent(),
        vec![Sent::Callback {
            id: "cbq-1".into(),
            text: Some("No active session to clear!".into()),
        }]
    );
}

#[tokio::test]
async fn test_clear_history_callback_with_session() {
    let h = harness();
    h.dispatcher.handle(document(Some("report.pdf"))).await;
    h.dispatcher.handle(callback("clear_history")).await;

    let sent = h.channel.sent();
    assert!(sent.contains(&Sent::Callback {
        id: "cbq-1".into(),
        text: Some("History cleared! 🧹".into()),
    }));
    assert!(h.channel.texts().last().unwrap().contains("still loaded"));
}

#[tokio::test]
async fn test_new_document_callback_drops_session() {
    let h = harness();
    h.dispatcher.handle(document(Some("report.pdf"))).await;
    h.dispatcher.handle(callback("new_chat")).await;

    assert!(h.channel.sent().contains(&Sent::Callback {
        id: "cbq-1".into(),
        text: Some("Starting over! 🆕".into()),
    }));

    h.dispatcher.handle(text("hello")).await;
    assert_eq!(
        h.channel.texts().last().unwrap(),
        &docchat_bot::replies::upload_first()
    );
}

#[tokio::test]
async fn test_unknown_callback_is_acknowledged() {
    let h = harness();
    h.dispatcher.handle(callback("bogus")).await;

    assert_eq!(
        h.channel.sent(),
        vec![Sent::Callback {
            id: "cbq-1".into(),
            text: None,
        }]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Processor
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_processor_handles_queued_events() {
    let h = harness();
    let (tx, rx) = mpsc::channel(8);
    let handle = Dispatcher::spawn_processor(h.dispatcher.clone(), rx);

    tx.send(text("/start")).await.unwrap();
    drop(tx);
    handle.await.unwrap();

    assert!(h.dispatcher.shutdown(Duration::from_secs(5)).await);
    assert_eq!(h.channel.texts().len(), 1);
}

#[tokio::test]
async fn test_processor_answers_one_users_questions_in_order() {
    let h = harness();
    h.dispatcher.handle(document(Some("report.pdf"))).await;
    h.channel.slow_first_typing.store(true, Ordering::SeqCst);

    let (tx, rx) = mpsc::channel(8);
    let handle = Dispatcher::spawn_processor(h.dispatcher.clone(), rx);
    tx.send(text("q1")).await.unwrap();
    tx.send(text("q2")).await.unwrap();
    drop(tx);
    handle.await.unwrap();
    assert!(h.dispatcher.shutdown(Duration::from_secs(5)).await);

    let session = h.dispatcher.controller().store().get("42").await.unwrap();
    let questions: Vec<&str> = session
        .history()
        .iter()
        .step_by(2)
        .map(|t| t.content.as_str())
        .collect();
    assert_eq!(questions, vec!["q1", "q2"]);
    assert_eq!(session.history().len(), 4);
}

#[tokio::test]
async fn test_processor_keeps_reset_behind_earlier_question() {
    let h = harness();
    h.dispatcher.handle(document(Some("report.pdf"))).await;
    h.channel.slow_first_typing.store(true, Ordering::SeqCst);

    let (tx, rx) = mpsc::channel(8);
    let handle = Dispatcher::spawn_processor(h.dispatcher.clone(), rx);
    tx.send(text("What is the total?")).await.unwrap();
    tx.send(text("/reset")).await.unwrap();
    drop(tx);
    handle.await.unwrap();
    assert!(h.dispatcher.shutdown(Duration::from_secs(5)).await);

    let texts = h.channel.texts();
    let n = texts.len();
    assert!(texts[n - 2].starts_with("🤖 Answer:"));
    assert!(texts[n - 1].contains("Closed: report.pdf"));
}
