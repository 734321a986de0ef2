//! Telegram channel adapter.
//!
//! Provides the `TelegramChannel` implementation for receiving updates by
//! long polling and sending replies through the Telegram Bot API.

pub mod format;

use crate::message::{CallbackQuery, ChannelMessage, InboundEvent, MessageContent, SessionAction};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use docchat_common::config::TelegramConfig;
use docchat_common::logging::generate_trace_id;
use docchat_common::util::sanitize_for_log;
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Telegram caps messages at 4096 characters; leave room for the byte/char gap.
const MAX_MESSAGE_LEN: usize = 4000;

/// Delay before retrying a failed getUpdates call.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Commands shown in the Telegram client menu.
pub const BOT_COMMANDS: &[(&str, &str)] = &[
    ("start", "Show how to use the bot"),
    ("reset", "Close the current document and clear history"),
];

// ============================================================================
// Telegram Channel
// ============================================================================

/// Telegram channel - long-polls the Bot API for updates.
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel against the public Bot API.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::from_config(&TelegramConfig::default(), bot_token)
    }

    /// Create a channel from configuration.
    pub fn from_config(config: &TelegramConfig, bot_token: impl Into<String>) -> Self {
        // The HTTP timeout must outlive the long-poll window.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            bot_token: bot_token.into(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            poll_timeout_secs: config.poll_timeout_secs,
            client,
        }
    }

    /// Point the channel at a different Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{file_path}", self.api_base, self.bot_token)
    }

    /// POST a Bot API method and return its `result` field.
    async fn call(&self, method: &str, body: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!(sanitize_for_log(&e.to_string())))?;

        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram {method} failed ({status}): {err}");
        }

        let mut data: serde_json::Value = resp.json().await?;
        Ok(data
            .get_mut("result")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Verify the bot token by calling getMe; returns the bot username.
    pub async fn init(&self) -> ChannelResult<String> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Connection(sanitize_for_log(&e.to_string())))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Auth(format!("Invalid bot token: {err}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;
        let username = data
            .get("result")
            .and_then(|r| r.get("username"))
            .and_then(|u| u.as_str())
            .unwrap_or("unknown")
            .to_string();

        tracing::info!(bot = %username, "Telegram channel initialized");
        Ok(username)
    }

    /// Register the command menu (`/start`, `/reset`).
    pub async fn register_commands(&self, commands: &[(&str, &str)]) -> ChannelResult<()> {
        let commands: Vec<serde_json::Value> = commands
            .iter()
            .map(|(command, description)| {
                serde_json::json!({ "command": command, "description": description })
            })
            .collect();

        self.call("setMyCommands", &serde_json::json!({ "commands": commands }))
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        Ok(())
    }

    /// Long-poll getUpdates and forward parsed events until the receiver closes.
    pub async fn listen(&self, tx: mpsc::Sender<InboundEvent>) -> ChannelResult<()> {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for updates...");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message", "callback_query"]
            });

            let resp = match self.client.post(self.api_url("getUpdates")).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {}", sanitize_for_log(&e.to_string()));
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            let data: serde_json::Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Telegram parse error: {}", sanitize_for_log(&e.to_string()));
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            if data.get("ok").and_then(serde_json::Value::as_bool) == Some(false) {
                let description = data
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or("unknown error");
                tracing::warn!("Telegram getUpdates rejected: {description}");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }

            let Some(results) = data.get("result").and_then(serde_json::Value::as_array) else {
                continue;
            };

            for update in results {
                if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
                    offset = uid + 1;
                }

                let Some(event) = parse_update(update) else {
                    continue;
                };

                tracing::debug!(
                    trace_id = %event.trace_id(),
                    user_id = %event.user_id(),
                    chat_id = %event.chat_id(),
                    "Telegram update received"
                );

                if tx.send(event).await.is_err() {
                    tracing::info!("Update receiver closed, stopping Telegram listener");
                    return Ok(());
                }
            }
        }
    }

    /// Send one chunk as HTML, falling back to plain text if Telegram rejects the markup.
    async fn send_html_chunk(
        &self,
        chat_id: &str,
        chunk: &str,
        reply_markup: Option<&serde_json::Value>,
    ) -> anyhow::Result<i64> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": format::convert_to_telegram_html(chunk),
            "parse_mode": "HTML"
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup.clone();
        }

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!(sanitize_for_log(&e.to_string())))?;

        if resp.status().is_success() {
            let data: serde_json::Value = resp.json().await?;
            return message_id_of(&data);
        }

        let status = resp.status();
        let error_text = resp.text().await.unwrap_or_default();

        // Telegram returns "Bad Request: can't parse entities" for HTML errors
        if status.as_u16() == 400 && error_text.contains("parse entities") {
            tracing::warn!(
                "Telegram HTML parsing failed, retrying without parse_mode: {}",
                error_text
            );

            let mut body_plain = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk
            });
            if let Some(markup) = reply_markup {
                body_plain["reply_markup"] = markup.clone();
            }

            let result = self.call("sendMessage", &body_plain).await?;
            return result
                .get("message_id")
                .and_then(serde_json::Value::as_i64)
                .ok_or_else(|| anyhow::anyhow!("Missing message_id in response"));
        }

        anyhow::bail!("Telegram sendMessage failed: {error_text}")
    }

    async fn fetch_file_path(&self, file_id: &str) -> anyhow::Result<String> {
        let result = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }))
            .await?;

        result
            .get("file_path")
            .and_then(|p| p.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("Missing file_path in getFile response"))
    }
}

fn message_id_of(data: &serde_json::Value) -> anyhow::Result<i64> {
    data.get("result")
        .and_then(|r| r.get("message_id"))
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| anyhow::anyhow!("Missing message_id in response"))
}

/// Build an inline keyboard with one action per row.
fn inline_keyboard(actions: &[SessionAction]) -> serde_json::Value {
    let rows: Vec<Vec<serde_json::Value>> = actions
        .iter()
        .map(|action| {
            vec![serde_json::json!({
                "text": action.label(),
                "callback_data": action.callback_data()
            })]
        })
        .collect();

    serde_json::json!({ "inline_keyboard": rows })
}

/// Split a message into chunks that fit within Telegram's limit.
fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.len() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_pos = chunk
            .rfind("\n\n")
            .or_else(|| chunk.rfind('\n'))
            .or_else(|| chunk.rfind(". ").map(|p| p + 1))
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        let actual_split = if split_pos == 0 { limit } else { split_pos };

        chunks.push(remaining[..actual_split].to_string());
        remaining = remaining[actual_split..].trim_start();
    }

    chunks
}

// ============================================================================
// Update Parsing
// ============================================================================

/// Parse one getUpdates entry into an event. Unsupported updates yield `None`.
pub fn parse_update(update: &serde_json::Value) -> Option<InboundEvent> {
    if let Some(cb) = update.get("callback_query") {
        return parse_callback_query(cb).map(InboundEvent::Callback);
    }

    update
        .get("message")
        .and_then(parse_message)
        .map(InboundEvent::Message)
}

fn parse_callback_query(callback: &serde_json::Value) -> Option<CallbackQuery> {
    let id = callback.get("id")?.as_str()?.to_string();
    let data = callback.get("data")?.as_str()?.to_string();

    let from = callback.get("from")?;
    let from_user_id = from.get("id")?.as_i64()?.to_string();
    let from_username = from
        .get("username")
        .and_then(|u| u.as_str())
        .map(String::from);

    let message = callback.get("message")?;
    let chat_id = message.get("chat")?.get("id")?.as_i64()?.to_string();
    let message_id = message.get("message_id")?.as_i64()?;

    Some(CallbackQuery {
        id,
        from_user_id,
        from_username,
        chat_id,
        message_id,
        data,
        trace_id: generate_trace_id(),
    })
}

fn parse_message(message: &serde_json::Value) -> Option<ChannelMessage> {
    let chat_id = message.get("chat")?.get("id")?.as_i64()?.to_string();
    let from = message.get("from")?;
    let user_id = from.get("id")?.as_i64()?.to_string();
    let username = from
        .get("username")
        .and_then(|u| u.as_str())
        .map(String::from);

    let content = if let Some(text) = message.get("text").and_then(|v| v.as_str()) {
        MessageContent::from_text(text)
    } else if let Some(doc) = message.get("document") {
        MessageContent::Document {
            file_id: doc.get("file_id")?.as_str()?.to_string(),
            file_name: doc
                .get("file_name")
                .and_then(|v| v.as_str())
                .map(String::from),
            mime_type: doc
                .get("mime_type")
                .and_then(|v| v.as_str())
                .map(String::from),
            size_bytes: doc.get("file_size").and_then(serde_json::Value::as_u64),
        }
    } else {
        return None;
    };

    let timestamp = message
        .get("date")
        .and_then(serde_json::Value::as_i64)
        .map_or_else(|| chrono::Utc::now().timestamp_millis(), |secs| secs * 1000);

    Some(ChannelMessage {
        id: message
            .get("message_id")
            .and_then(serde_json::Value::as_i64)
            .map(|id| id.to_string())
            .unwrap_or_default(),
        chat_id,
        user_id,
        username,
        content,
        timestamp,
        trace_id: generate_trace_id(),
    })
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> ChannelResult<i64> {
        let mut last_id = 0;
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let result = self
                .call(
                    "sendMessage",
                    &serde_json::json!({ "chat_id": chat_id, "text": chunk }),
                )
                .await
                .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

            last_id = result
                .get("message_id")
                .and_then(serde_json::Value::as_i64)
                .ok_or_else(|| ChannelError::SendFailed("Missing message_id in response".into()))?;
        }
        Ok(last_id)
    }

    async fn send_formatted(
        &self,
        chat_id: &str,
        text: &str,
        actions: &[SessionAction],
    ) -> ChannelResult<i64> {
        let keyboard = (!actions.is_empty()).then(|| inline_keyboard(actions));
        let chunks = split_message(text, MAX_MESSAGE_LEN);
        let last = chunks.len().saturating_sub(1);

        let mut last_id = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            // Buttons go under the final chunk only.
            let markup = if i == last { keyboard.as_ref() } else { None };
            last_id = self
                .send_html_chunk(chat_id, chunk, markup)
                .await
                .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        }
        Ok(last_id)
    }

    async fn edit_text(&self, chat_id: &str, message_id: i64, text: &str) -> ChannelResult<()> {
        self.call(
            "editMessageText",
            &serde_json::json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "text": text
            }),
        )
        .await
        .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> ChannelResult<()> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if let Some(t) = text {
            body["text"] = serde_json::Value::String(t.to_string());
        }

        self.call("answerCallbackQuery", &body)
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: &str) -> ChannelResult<()> {
        self.call(
            "sendChatAction",
            &serde_json::json!({ "chat_id": chat_id, "action": "typing" }),
        )
        .await
        .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn download_to(&self, file_id: &str, dest: &Path) -> ChannelResult<u64> {
        let file_path = self
            .fetch_file_path(file_id)
            .await
            .map_err(|e| ChannelError::Download(e.to_string()))?;

        let resp = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(|e| ChannelError::Download(sanitize_for_log(&e.to_string())))?;

        if !resp.status().is_success() {
            return Err(ChannelError::Download(format!(
                "Failed to download file from Telegram: {}",
                resp.status()
            )));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ChannelError::Internal(format!("Cannot open staging file: {e}")))?;

        let mut written: u64 = 0;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| ChannelError::Download(sanitize_for_log(&e.to_string())))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ChannelError::Internal(format!("Cannot write staging file: {e}")))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| ChannelError::Internal(format!("Cannot write staging file: {e}")))?;

        tracing::debug!(file_id = %file_id, bytes = written, "Telegram file downloaded");
        Ok(written)
    }
}
