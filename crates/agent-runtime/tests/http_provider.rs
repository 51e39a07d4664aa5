//! HttpProvider against fake provider endpoints

use std::time::Duration;

use agent_core::provider::{Dialect, GenerationOptions, LlmProvider, ProviderConfig};
use agent_core::tool::{ToolDescriptor, ToolExecutor, ToolRegistry};
use agent_core::{AgentError, Message};
use agent_runtime::HttpProvider;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(dialect: Dialect, base_url: String, models: &[&str]) -> HttpProvider {
    let config = ProviderConfig::new(
        "fake",
        dialect,
        "sk-test",
        base_url,
        models.iter().map(|m| (*m).to_string()).collect(),
        Duration::from_secs(5),
    )
    .unwrap();
    HttpProvider::new(config).unwrap()
}

fn tools() -> Vec<ToolDescriptor> {
    ToolRegistry::with_builtins().schema()
}

fn sse(frames: &[Value]) -> String {
    let mut body: String = frames.iter().map(|f| format!("data: {f}\n\n")).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

fn event_stream(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

async fn collect_stream(provider: &HttpProvider) -> (agent_core::UnifiedResponse, Vec<String>) {
    let mut chunks = Vec::new();
    let mut sink = |s: &str| chunks.push(s.to_string());
    let response = provider
        .chat_stream(&[Message::user("hi")], &tools(), &GenerationOptions::default(), &mut sink)
        .await
        .unwrap();
    (response, chunks)
}

#[tokio::test]
async fn test_openai_buffered_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "m1", "stream": false, "tool_choice": "auto"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": "Checking the time.",
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_current_time", "arguments": "{}"}
                }]
            }}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(
        Dialect::OpenAi,
        format!("{}/v1/chat/completions", server.uri()),
        &["m1"],
    );
    let response = provider
        .chat(&[Message::user("what time is it?")], &tools(), &GenerationOptions::default())
        .await
        .unwrap();

    assert_eq!(response.text, "Checking the time.");
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call_1");
    assert_eq!(response.tool_calls[0].name, "get_current_time");
    assert_eq!(response.usage.total_tokens, 17);
}

#[tokio::test]
async fn test_anthropic_buffered_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/anthropic/v1/messages"))
        .and(header("x-api-key", "sk-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({"model": "glm-5", "system": "Be brief."})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "Sure."},
                {"type": "tool_use", "id": "tu_1", "name": "get_current_time", "input": {"utc_offset_hours": 8}}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 7}
        })))
        .mount(&server)
        .await;

    let provider = provider(
        Dialect::resolve(None, &format!("{}/api/anthropic", server.uri())),
        format!("{}/api/anthropic", server.uri()),
        &["glm-5"],
    );
    let messages = [Message::system("Be brief."), Message::user("time in Beijing?")];
    let response = provider
        .chat(&messages, &tools(), &GenerationOptions::default())
        .await
        .unwrap();

    assert_eq!(response.text, "Sure.");
    let args: Value = serde_json::from_str(&response.tool_calls[0].arguments).unwrap();
    assert_eq!(args, json!({"utc_offset_hours": 8}));
    assert_eq!(response.usage.total_tokens, 27);
}

#[tokio::test]
async fn test_openai_stream() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"choices": [{"delta": {"content": "Hel"}}]}),
        json!({"choices": [{"delta": {"content": "lo"}}]}),
        json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "call_9", "function": {"name": "get_current_time", "arguments": "{\"utc_"}}
        ]}}]}),
        json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "offset_hours\":1}"}}
        ]}}]}),
    ]);
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(event_stream(body))
        .mount(&server)
        .await;

    let provider = provider(Dialect::OpenAi, server.uri(), &["m1"]);
    let (response, chunks) = collect_stream(&provider).await;

    assert_eq!(chunks, vec!["Hel", "lo"]);
    assert_eq!(response.text, "Hello");
    assert_eq!(response.tool_calls[0].id, "call_9");
    assert_eq!(response.tool_calls[0].arguments, r#"{"utc_offset_hours":1}"#);
    assert_eq!(response.usage.total_tokens, 0);
}

#[tokio::test]
async fn test_anthropic_stream() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"type": "message_start", "message": {"id": "msg_1"}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "One moment."}}),
        json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "tu_2", "name": "get_current_time"}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{}"}}),
        json!({"type": "content_block_stop", "index": 1}),
        json!({"type": "message_stop"}),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(event_stream(body))
        .mount(&server)
        .await;

    let provider = provider(Dialect::Anthropic, server.uri(), &["glm-5"]);
    let (response, chunks) = collect_stream(&provider).await;

    assert_eq!(chunks, vec!["One moment."]);
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "tu_2");
    assert_eq!(response.tool_calls[0].arguments, "{}");
}

#[tokio::test]
async fn test_unknown_model_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "gone"})))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "renamed"})))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": {"message": "模型不存在"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "live"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "from live"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(Dialect::OpenAi, server.uri(), &["gone", "renamed", "live"]);
    let response = provider
        .chat(&[Message::user("hi")], &[], &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(response.text, "from live");
}

#[tokio::test]
async fn test_stream_falls_back_on_404() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "gone"})))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "live"})))
        .respond_with(event_stream(sse(&[json!({"choices": [{"delta": {"content": "ok"}}]})])))
        .mount(&server)
        .await;

    let provider = provider(Dialect::OpenAi, server.uri(), &["gone", "live"]);
    let (response, chunks) = collect_stream(&provider).await;
    assert_eq!(response.text, "ok");
    assert_eq!(chunks, vec!["ok"]);
}

#[tokio::test]
async fn test_auth_failure_stops_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "m1"})))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid model key"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "m2"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = provider(Dialect::OpenAi, server.uri(), &["m1", "m2"]);
    let err = provider
        .chat(&[Message::user("hi")], &[], &GenerationOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(err.to_string(), "LLM API error: 401 - invalid model key");
}

#[tokio::test]
async fn test_exhausted_fallback_returns_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such model"))
        .expect(2)
        .mount(&server)
        .await;

    let provider = provider(Dialect::OpenAi, server.uri(), &["a", "b"]);
    let err = provider
        .chat(&[Message::user("hi")], &[], &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Provider { status: 404, .. }));
}

#[tokio::test]
async fn test_timeout_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let config = ProviderConfig::new(
        "slow",
        Dialect::OpenAi,
        "k",
        server.uri(),
        vec!["a".into(), "b".into()],
        Duration::from_millis(50),
    )
    .unwrap();
    let provider = HttpProvider::new(config).unwrap();

    let err = provider
        .chat(&[Message::user("hi")], &[], &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Transport(_)));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"max_tokens": 10, "messages": [{"role": "user", "content": "ping"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "pong"}}]
        })))
        .mount(&server)
        .await;

    let healthy = provider(Dialect::OpenAi, server.uri(), &["m1"]);
    assert!(healthy.health_check().await.unwrap());

    let down = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&down)
        .await;
    let unhealthy = provider(Dialect::OpenAi, down.uri(), &["m1"]);
    assert!(!unhealthy.health_check().await.unwrap());
}

/// Consume one request: headers plus a `content-length` body
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|l| {
                    l.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap())
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }
}

/// Serve a single event-stream response, sleeping before each frame
async fn paced_stream_server(frames: Vec<(Duration, String)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;

        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        for (pause, frame) in frames {
            tokio::time::sleep(pause).await;
            if socket.write_all(frame.as_bytes()).await.is_err() {
                return;
            }
        }
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}")
}

fn text_frame(text: &str) -> String {
    format!("data: {}\n\n", json!({"choices": [{"delta": {"content": text}}]}))
}

fn paced_provider(base_url: String, timeout: Duration) -> HttpProvider {
    let config =
        ProviderConfig::new("paced", Dialect::OpenAi, "k", base_url, vec!["m1".into()], timeout).unwrap();
    HttpProvider::new(config).unwrap()
}

#[tokio::test]
async fn test_active_stream_outlives_timeout() {
    let gap = Duration::from_millis(150);
    let mut frames: Vec<(Duration, String)> = (0..5).map(|i| (gap, text_frame(&format!("p{i} ")))).collect();
    frames.push((gap, "data: [DONE]\n\n".to_string()));
    let base_url = paced_stream_server(frames).await;

    // Whole stream takes ~900ms; no single gap reaches the 300ms timeout
    let provider = paced_provider(base_url, Duration::from_millis(300));
    let (response, chunks) = collect_stream(&provider).await;

    assert_eq!(chunks, vec!["p0 ", "p1 ", "p2 ", "p3 ", "p4 "]);
    assert_eq!(response.text, "p0 p1 p2 p3 p4 ");
}

#[tokio::test]
async fn test_stalled_stream_times_out() {
    let frames = vec![
        (Duration::ZERO, text_frame("first")),
        (Duration::from_millis(800), text_frame("late")),
    ];
    let base_url = paced_stream_server(frames).await;
    let provider = paced_provider(base_url, Duration::from_millis(200));

    let mut chunks = Vec::new();
    let mut sink = |s: &str| chunks.push(s.to_string());
    let err = provider
        .chat_stream(&[Message::user("hi")], &[], &GenerationOptions::default(), &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::StreamTransport(_)), "got {err:?}");
    assert_eq!(chunks, vec!["first"]);
}
