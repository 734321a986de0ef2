//! ChatPDF REST client.

use super::{Conversation, DocumentIngestion, QaError, QaResult, FALLBACK_ANSWER};
use crate::session::Turn;
use async_trait::async_trait;
use docchat_common::config::ChatPdfConfig;
use docchat_common::util::{sanitize_for_log, truncate_with_ellipsis};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upstream error bodies are cut to this many characters before being shown.
const MAX_ERROR_DETAIL: usize = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddFileResponse {
    source_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    source_id: &'a str,
    reference_sources: bool,
    messages: &'a [Turn],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    sources: [&'a str; 1],
}

/// ChatPDF API client implementing both ingestion and conversation.
pub struct ChatPdfClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ChatPdfClient {
    /// Create a client with default timeouts.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let config = ChatPdfConfig {
            base_url: base_url.into(),
            ..ChatPdfConfig::default()
        };
        Self::from_config(&config, api_key)
    }

    /// Create a client from configuration.
    pub fn from_config(config: &ChatPdfConfig, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

/// Describe a transport failure without leaking credentials.
fn describe_send_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request to ChatPDF timed out".to_string()
    } else if e.is_connect() {
        format!("cannot reach ChatPDF: {}", sanitize_for_log(&e.to_string()))
    } else {
        sanitize_for_log(&e.to_string())
    }
}

/// Read a non-2xx response into a short error detail.
async fn describe_status(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let body = truncate_with_ellipsis(body.trim(), MAX_ERROR_DETAIL);
    if body.is_empty() {
        format!("ChatPDF returned {status}")
    } else {
        format!("ChatPDF returned {status}: {body}")
    }
}

#[async_trait]
impl DocumentIngestion for ChatPdfClient {
    async fn ingest(&self, file_bytes: Vec<u8>, file_name: &str) -> QaResult<String> {
        let size = file_bytes.len();
        let part = Part::bytes(file_bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| QaError::Ingestion(e.to_string()))?;
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(self.endpoint("sources/add-file"))
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| QaError::Ingestion(describe_send_error(&e)))?;

        if !resp.status().is_success() {
            return Err(QaError::Ingestion(describe_status(resp).await));
        }

        let body: AddFileResponse = resp
            .json()
            .await
            .map_err(|e| QaError::Ingestion(format!("unexpected ChatPDF response: {e}")))?;

        let source_id = body
            .source_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| QaError::Ingestion("ChatPDF response has no sourceId".into()))?;

        tracing::info!(file_name = %file_name, bytes = size, "Document ingested");
        Ok(source_id)
    }

    async fn release(&self, document_handle: &str) -> QaResult<()> {
        let resp = self
            .client
            .post(self.endpoint("sources/delete"))
            .header("x-api-key", &self.api_key)
            .json(&DeleteRequest {
                sources: [document_handle],
            })
            .send()
            .await
            .map_err(|e| QaError::Ingestion(describe_send_error(&e)))?;

        if !resp.status().is_success() {
            return Err(QaError::Ingestion(describe_status(resp).await));
        }

        tracing::debug!("Document released");
        Ok(())
    }
}

#[async_trait]
impl Conversation for ChatPdfClient {
    async fn ask(&self, document_handle: &str, history: &[Turn]) -> QaResult<String> {
        let request = ChatRequest {
            source_id: document_handle,
            reference_sources: true,
            messages: history,
        };

        let resp = self
            .client
            .post(self.endpoint("chats/message"))
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| QaError::Conversation(describe_send_error(&e)))?;

        if !resp.status().is_success() {
            return Err(QaError::Conversation(describe_status(resp).await));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| QaError::Conversation(format!("unexpected ChatPDF response: {e}")))?;

        Ok(body
            .content
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string()))
    }
}
