//! HTTP-level tests for `OpenAiCompatClient` against a wiremock server
//! emulating an OpenAI-compatible chat completion endpoint, plus streamed
//! turns through `SessionOrchestrator` over the real client.

use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chat_session_api::config::{LlmConfig, SessionConfig};
use chat_session_api::models::{ChatRequest, Message, MessageEncoding};
use chat_session_api::services::{CompletionProvider, OpenAiCompatClient, SessionEvent, SessionOrchestrator};
use chat_session_api::store::{MemoryStore, Namespace};
use chat_session_api::SessionError;

fn mock_config(server: &MockServer, api_key: Option<&str>) -> LlmConfig {
    LlmConfig {
        scheme: "http".into(),
        host: server.address().to_string(),
        api_key: api_key.map(str::to_string),
        default_model: "test-model".into(),
        connect_timeout_seconds: 2,
        first_byte_timeout_seconds: 1,
        stream_timeout_seconds: 3,
    }
}

fn orchestrator(client: OpenAiCompatClient) -> SessionOrchestrator {
    let config = SessionConfig {
        ttl_seconds: 3600,
        encoding: MessageEncoding::Json,
        welcome_message: "Welcome!".into(),
        system_prompt: None,
    };
    SessionOrchestrator::new(
        Arc::new(client),
        Arc::new(MemoryStore::new()),
        Namespace::new("compat-test:").unwrap(),
        &config,
        "test-model",
    )
}

fn stream_request(input: &str) -> ChatRequest {
    ChatRequest {
        input: input.into(),
        stream: true,
        ..ChatRequest::default()
    }
}

/// State token of the `Done` event; `None` when the turn did not complete.
fn session_token(events: &[Result<SessionEvent, SessionError>]) -> Option<String> {
    events.iter().find_map(|e| match e {
        Ok(SessionEvent::Done(reply)) => reply.state.clone(),
        _ => None,
    })
}

fn client(server: &MockServer) -> OpenAiCompatClient {
    OpenAiCompatClient::new(&mock_config(server, None)).unwrap()
}

fn prompt() -> Vec<Message> {
    vec![Message::system("You are terse."), Message::user("2+2?")]
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

fn sse_body(fragments: &[&str], with_done: bool) -> String {
    let mut body = String::from("data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n");
    for fragment in fragments {
        let chunk = json!({ "choices": [{ "index": 0, "delta": { "content": fragment } }] });
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
    if with_done {
        body.push_str("data: [DONE]\n\n");
    }
    body
}

// ── Blocking completion ────────────────────────────────────────────────

#[tokio::test]
async fn complete_returns_assistant_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-mock-key"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": false,
            "messages": [
                { "role": "system", "content": "You are terse." },
                { "role": "user", "content": "2+2?" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("4")))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiCompatClient::new(&mock_config(&server, Some("sk-mock-key"))).unwrap();
    let reply = client.complete(&prompt(), "test-model").await.unwrap();

    assert_eq!(reply, Message::assistant("4"));
}

#[tokio::test]
async fn complete_empty_choices_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = client(&server).complete(&prompt(), "test-model").await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidResponse(_)), "got {err:?}");
}

#[tokio::test]
async fn complete_malformed_json_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("this is not json"))
        .mount(&server)
        .await;

    let err = client(&server).complete(&prompt(), "test-model").await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidResponse(_)), "got {err:?}");
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "2")
                .set_body_json(json!({ "error": { "message": "slow down" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).complete(&prompt(), "test-model").await.unwrap_err();
    assert_eq!(err, SessionError::RateLimited { retry_after_ms: Some(2000) });
}

#[tokio::test]
async fn server_error_is_upstream_error_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).complete(&prompt(), "test-model").await.unwrap_err();
    match err {
        SessionError::Upstream(msg) => assert!(msg.contains("500") && msg.contains("boom")),
        other => panic!("expected Upstream, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_first_byte_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client(&server).complete(&prompt(), "test-model").await.unwrap_err();
    assert!(matches!(err, SessionError::UpstreamTimeout(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_endpoint_is_upstream_error() {
    let config = LlmConfig {
        scheme: "http".into(),
        host: "127.0.0.1:1".into(),
        api_key: None,
        default_model: "m".into(),
        connect_timeout_seconds: 1,
        first_byte_timeout_seconds: 2,
        stream_timeout_seconds: 2,
    };
    let client = OpenAiCompatClient::new(&config).unwrap();

    let err = client.complete(&prompt(), "m").await.unwrap_err();
    assert!(
        matches!(err, SessionError::Upstream(_) | SessionError::UpstreamTimeout(_)),
        "got {err:?}"
    );
}

// ── Streaming ──────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_concatenation_matches_complete() {
    let server = MockServer::start().await;
    let fragments = ["The ", "answer", " is ", "4."];

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&fragments, true)),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("The answer is 4.")))
        .mount(&server)
        .await;

    let client = client(&server);

    let streamed: Vec<String> = client
        .stream(&prompt(), "test-model")
        .await
        .unwrap()
        .map(|f| f.unwrap())
        .collect()
        .await;
    let complete = client.complete(&prompt(), "test-model").await.unwrap();

    assert_eq!(streamed, fragments);
    assert_eq!(streamed.concat(), complete.content);
}

#[tokio::test]
async fn stream_without_done_marker_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&["a", "b"], false)),
        )
        .mount(&server)
        .await;

    let items: Vec<_> = client(&server)
        .stream(&prompt(), "test-model")
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0], Ok("a".to_string()));
    assert_eq!(items[1], Ok("b".to_string()));
    assert!(matches!(items[2], Err(SessionError::InvalidResponse(_))), "got {:?}", items[2]);
}

#[tokio::test]
async fn stream_rate_limited_before_first_fragment() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let result = client(&server).stream(&prompt(), "test-model").await;
    assert!(matches!(result, Err(SessionError::RateLimited { retry_after_ms: None })));
}

#[tokio::test]
async fn stream_malformed_chunk_yields_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\ndata: {broken\n\n"),
        )
        .mount(&server)
        .await;

    let items: Vec<_> = client(&server)
        .stream(&prompt(), "test-model")
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok("ok".to_string()));
    assert!(matches!(items[1], Err(SessionError::InvalidResponse(_))));
}

// ── Model listing ──────────────────────────────────────────────────────

#[tokio::test]
async fn list_models_reads_ids() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "id": "llama3.1:8b", "object": "model" },
                { "id": "mistral:7b", "object": "model" }
            ]
        })))
        .mount(&server)
        .await;

    let models = client(&server).list_models().await.unwrap();
    assert_eq!(models, vec!["llama3.1:8b", "mistral:7b"]);
}

// ── Streamed turns end to end ──────────────────────────────────────────

#[tokio::test]
async fn truncated_stream_saves_only_the_user_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("data: {\"choices\":[{\"delta\":{\"content\":\"The answer is\"}}]}\n\n"),
        )
        .mount(&server)
        .await;

    let orch = orchestrator(client(&server));
    let mut request = stream_request("2+2?");
    request.state = Some("truncated".into());

    let events: Vec<_> = orch.handle_stream(request).await.unwrap().collect().await;

    assert_eq!(events[0], Ok(SessionEvent::Fragment("The answer is".into())));
    assert!(matches!(events.last(), Some(Err(SessionError::InvalidResponse(_)))));
    assert_eq!(session_token(&events), None);
    assert_eq!(orch.inspect("truncated").await.unwrap(), vec![Message::user("2+2?")]);
}

/// Serves one SSE chunk on the first connection, then holds the socket
/// open without sending anything else.
async fn stalling_sse_server(first_chunk: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 16 * 1024];
        let _ = socket.read(&mut buf).await;

        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
        let chunk = format!("{:x}\r\n{}\r\n", first_chunk.len(), first_chunk);
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(chunk.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });

    addr.to_string()
}

#[tokio::test]
async fn stalled_stream_hits_overall_timeout() {
    let host = stalling_sse_server("data: {\"choices\":[{\"delta\":{\"content\":\"The answer\"}}]}\n\n").await;
    let config = LlmConfig {
        scheme: "http".into(),
        host,
        api_key: None,
        default_model: "test-model".into(),
        connect_timeout_seconds: 1,
        first_byte_timeout_seconds: 1,
        stream_timeout_seconds: 2,
    };
    let orch = orchestrator(OpenAiCompatClient::new(&config).unwrap());
    let mut request = stream_request("2+2?");
    request.state = Some("stalled".into());

    let events: Vec<_> = orch.handle_stream(request).await.unwrap().collect().await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Ok(SessionEvent::Fragment("The answer".into())));
    assert!(matches!(events[1], Err(SessionError::UpstreamTimeout(_))), "got {:?}", events[1]);
    assert_eq!(orch.inspect("stalled").await.unwrap(), vec![Message::user("2+2?")]);
}
