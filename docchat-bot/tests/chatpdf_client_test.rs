//! HTTP contract tests for the ChatPDF client.

use docchat_bot::qa::FALLBACK_ANSWER;
use docchat_bot::{ChatPdfClient, Conversation, DocumentIngestion, QaError, Turn};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "sec_test_key";

async fn client() -> (MockServer, ChatPdfClient) {
    let server = MockServer::start().await;
    let client = ChatPdfClient::new(server.uri(), API_KEY);
    (server, client)
}

// ─────────────────────────────────────────────────────────────────────────────
// Ingestion
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ingest_uploads_multipart_file() {
    let (server, client) = client().await;

    Mock::given(method("POST"))
        .and(path("/sources/add-file"))
        .and(header("x-api-key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sourceId": "src_abc" })))
        .expect(1)
        .mount(&server)
        .await;

    let handle = client
        .ingest(b"%PDF-1.4 test".to_vec(), "report.pdf")
        .await
        .unwrap();
    assert_eq!(handle, "src_abc");

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("filename=\"report.pdf\""));
    assert!(body.contains("application/pdf"));
    assert!(body.contains("%PDF-1.4 test"));
}

#[tokio::test]
async fn test_ingest_non_success_is_ingestion_error() {
    let (server, client) = client().await;

    Mock::given(method("POST"))
        .and(path("/sources/add-file"))
        .respond_with(ResponseTemplate::new(400).set_body_string("PDF is password protected"))
        .mount(&server)
        .await;

    let err = client.ingest(b"%PDF".to_vec(), "locked.pdf").await.unwrap_err();
    let QaError::Ingestion(detail) = err else {
        panic!("expected ingestion error");
    };
    assert!(detail.contains("400"));
    assert!(detail.contains("password protected"));
}

#[tokio::test]
async fn test_ingest_missing_source_id_is_error() {
    let (server, client) = client().await;

    Mock::given(method("POST"))
        .and(path("/sources/add-file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = client.ingest(b"%PDF".to_vec(), "report.pdf").await.unwrap_err();
    assert!(matches!(err, QaError::Ingestion(_)));
}

#[tokio::test]
async fn test_ingest_unreachable_service() {
    let client = ChatPdfClient::new("http://127.0.0.1:9", API_KEY);
    let err = client.ingest(b"%PDF".to_vec(), "report.pdf").await.unwrap_err();
    let QaError::Ingestion(detail) = err else {
        panic!("expected ingestion error");
    };
    assert!(!detail.contains(API_KEY));
}

#[tokio::test]
async fn test_release_posts_source_list() {
    let (server, client) = client().await;

    Mock::given(method("POST"))
        .and(path("/sources/delete"))
        .and(header("x-api-key", API_KEY))
        .and(body_json(json!({ "sources": ["src_abc"] })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.release("src_abc").await.unwrap();
}

#[tokio::test]
async fn test_release_failure_is_reported() {
    let (server, client) = client().await;

    Mock::given(method("POST"))
        .and(path("/sources/delete"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(matches!(
        client.release("src_abc").await,
        Err(QaError::Ingestion(_))
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ask_replays_history() {
    let (server, client) = client().await;

    Mock::given(method("POST"))
        .and(path("/chats/message"))
        .and(header("x-api-key", API_KEY))
        .and(body_json(json!({
            "sourceId": "src_abc",
            "referenceSources": true,
            "messages": [
                { "role": "user", "content": "What is the total revenue?" },
                { "role": "assistant", "content": "**$4.2M** in 2023." },
                { "role": "user", "content": "And in 2022?" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "$3.9M in 2022.",
            "references": [{ "pageNumber": 3 }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let history = vec![
        Turn::user("What is the total revenue?"),
        Turn::assistant("**$4.2M** in 2023."),
        Turn::user("And in 2022?"),
    ];
    let answer = client.ask("src_abc", &history).await.unwrap();
    assert_eq!(answer, "$3.9M in 2022.");
}

#[tokio::test]
async fn test_ask_missing_content_uses_fallback() {
    let (server, client) = client().await;

    Mock::given(method("POST"))
        .and(path("/chats/message"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "references": [] })))
        .mount(&server)
        .await;

    let answer = client.ask("src_abc", &[Turn::user("hi")]).await.unwrap();
    assert_eq!(answer, FALLBACK_ANSWER);
}

#[tokio::test]
async fn test_ask_non_json_body_is_conversation_error() {
    let (server, client) = client().await;

    Mock::given(method("POST"))
        .and(path("/chats/message"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = client.ask("src_abc", &[Turn::user("hi")]).await.unwrap_err();
    assert!(matches!(err, QaError::Conversation(_)));
}

#[tokio::test]
async fn test_ask_non_success_is_conversation_error() {
    let (server, client) = client().await;

    Mock::given(method("POST"))
        .and(path("/chats/message"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "source not found" })))
        .mount(&server)
        .await;

    let err = client.ask("src_gone", &[Turn::user("hi")]).await.unwrap_err();
    let QaError::Conversation(detail) = err else {
        panic!("expected conversation error");
    };
    assert!(detail.contains("404"));
    assert!(detail.contains("source not found"));
}
