//! Gemini Contract Tests
//!
//! Verify the `generateContent` wire format and how each upstream outcome maps
//! to a reply or a canned substitute.

use avatar_relay::config::LlmConfig;
use avatar_relay::llm::{self, GeminiClient, LlmError, ReplyGenerator};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn client(server: &MockServer) -> GeminiClient {
    GeminiClient::new(LlmConfig {
        base_url: server.uri(),
        api_key: "test-key".into(),
        ..LlmConfig::default()
    })
}

fn reply_body(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"parts": [{"text": text}], "role": "model"},
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn test_request_carries_prompt_config_and_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{"parts": [{"text": "Hello there"}]}],
            "generationConfig": {"maxOutputTokens": 800}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("Hi! How can I help?")))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server).generate("Hello there").await;
    assert_eq!(reply.unwrap(), "Hi! How can I help?");
}

#[tokio::test]
async fn test_blocked_prompt_maps_to_blocked_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"promptFeedback": {"blockReason": "SAFETY"}})),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client.generate("something rude").await.unwrap_err();
    assert!(matches!(err, LlmError::Blocked(ref r) if r == "SAFETY"));
    assert_eq!(llm::respond(&client, "something rude").await, llm::REPLY_BLOCKED);
}

#[tokio::test]
async fn test_server_error_maps_to_unreachable_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": 500, "message": "Internal error encountered.", "status": "INTERNAL"}
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    match client.generate("hi").await {
        Err(LlmError::Http { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "Internal error encountered.");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
    assert_eq!(llm::respond(&client, "hi").await, llm::REPLY_UNREACHABLE);
}

#[tokio::test]
async fn test_malformed_body_maps_to_unexpected_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(matches!(
        client.generate("hi").await,
        Err(LlmError::InvalidResponse(_))
    ));
    assert_eq!(llm::respond(&client, "hi").await, llm::REPLY_UNEXPECTED);
}

#[tokio::test]
async fn test_empty_candidates_map_to_unexpected_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    assert_eq!(llm::respond(&client(&server), "hi").await, llm::REPLY_UNEXPECTED);
}

#[tokio::test]
async fn test_unreachable_host_maps_to_unreachable_reply() {
    let client = GeminiClient::new(LlmConfig {
        base_url: "http://127.0.0.1:1".into(),
        api_key: "test-key".into(),
        timeout_secs: 2,
        ..LlmConfig::default()
    });
    let err = client.generate("hi").await.unwrap_err();
    assert!(matches!(err, LlmError::Request(_) | LlmError::Timeout(_)));
    assert!(!err.to_string().contains("test-key"));
    assert_eq!(err.fallback_reply(), llm::REPLY_UNREACHABLE);
}

/// Serve one response whose body stops short of its declared length.
async fn truncated_body_server() -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let body_len = text[..split]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= split + 4 + body_len {
                    break;
                }
            }
        }
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 4096\r\n\r\n{\"candidates\": [",
            )
            .await
            .unwrap();
        socket.flush().await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_body_cut_off_mid_read_maps_to_unreachable_reply() {
    let client = GeminiClient::new(LlmConfig {
        base_url: truncated_body_server().await,
        api_key: "test-key".into(),
        timeout_secs: 5,
        ..LlmConfig::default()
    });

    let err = client.generate("hi").await.unwrap_err();
    assert!(matches!(err, LlmError::Request(_) | LlmError::Timeout(_)), "{err:?}");
    assert!(!err.to_string().contains("test-key"));
    assert_eq!(err.fallback_reply(), llm::REPLY_UNREACHABLE);
}
