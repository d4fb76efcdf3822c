use axum::body::{Body, Bytes};
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use claude_azure_proxy::proxy::build_client;
use claude_azure_proxy::translate::anthropic_types::*;
use claude_azure_proxy::translate::openai_types::ChatCompletionResponse;
use claude_azure_proxy::translate::{build_destination_request, convert_response, Reframer};
use claude_azure_proxy::{build_router, AppState, ModelMapper, ProxyConfig};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ────────────────────────────────────────────────────────────────
// Mock Azure deployment
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RecordedCall {
    api_key: Option<String>,
    query: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct MockAzure {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockAzure {
    fn last_call(&self) -> RecordedCall {
        self.calls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("mock Azure was never called")
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

const STREAM_BODY: &str = concat!(
    "data: {\"id\":\"chatcmpl-s1\",\"model\":\"gpt-test\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"},\"finish_reason\":null}]}\n\n",
    "data: {\"id\":\"chatcmpl-s1\",\"model\":\"gpt-test\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
    ": keep-alive\n\n",
    "data: {\"id\":\"chatcmpl-s1\",\"model\":\"gpt-test\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
    "data: {\"id\":\"chatcmpl-s1\",\"model\":\"gpt-test\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
);

fn text_frame(text: &str, finish_reason: Option<&str>) -> Bytes {
    let chunk = json!({
        "id": "chatcmpl-slow",
        "model": "gpt-test",
        "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": finish_reason}]
    });
    Bytes::from(format!("data: {}\n\n", chunk))
}

/// A stream whose total duration is longer than the proxy's timeout, with
/// short gaps between chunks.
fn slow_stream_body() -> Body {
    Body::from_stream(async_stream::stream! {
        yield Ok::<_, Infallible>(text_frame("Hel", None));
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(400)).await;
            yield Ok(Bytes::from_static(b": keep-alive\n\n"));
        }
        yield Ok(text_frame("lo", Some("length")));
        yield Ok(Bytes::from_static(b"data: [DONE]\n\n"));
    })
}

async fn mock_chat_completions(
    State(mock): State<MockAzure>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    Json(body): Json<Value>,
) -> Response {
    let api_key = headers
        .get("api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    mock.calls.lock().unwrap().push(RecordedCall {
        api_key,
        query,
        body: body.clone(),
    });

    match body["model"].as_str().unwrap_or_default() {
        "missing-deployment" => (
            StatusCode::NOT_FOUND,
            r#"{"error":{"code":"DeploymentNotFound"}}"#,
        )
            .into_response(),
        "busy-deployment" => (StatusCode::SERVICE_UNAVAILABLE, "overloaded").into_response(),
        "slow-deployment" => {
            ([(header::CONTENT_TYPE, "text/event-stream")], slow_stream_body()).into_response()
        }
        "broken-deployment" => Json(json!({"id": "chatcmpl-x", "choices": []})).into_response(),
        _ if body["stream"] == json!(true) => {
            ([(header::CONTENT_TYPE, "text/event-stream")], STREAM_BODY).into_response()
        }
        _ if body.get("tools").is_some() => Json(json!({
            "id": "chatcmpl-t1",
            "model": "gpt-test",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_weather1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"London\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 8, "total_tokens": 28}
        }))
        .into_response(),
        _ => Json(json!({
            "id": "chatcmpl-1",
            "model": "gpt-test",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello there!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }))
        .into_response(),
    }
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Start a mock Azure deployment and a proxy pointed at it. Returns the proxy URL.
async fn start_proxy() -> (String, MockAzure) {
    let mock = MockAzure::default();
    let azure_url = serve(
        Router::new()
            .route("/openai/v1/chat/completions", post(mock_chat_completions))
            .with_state(mock.clone()),
    )
    .await;

    let mut config = ProxyConfig::default();
    config.azure.endpoint = Some(format!("{}/", azure_url));
    config.azure.api_key = Some("test-key".to_string());
    config.timeout_secs = 1;
    config.default_model = "gpt-test".to_string();
    config.models = HashMap::from([
        ("claude-missing".to_string(), "missing-deployment".to_string()),
        ("claude-busy".to_string(), "busy-deployment".to_string()),
        ("claude-broken".to_string(), "broken-deployment".to_string()),
        ("claude-slow".to_string(), "slow-deployment".to_string()),
    ]);

    let client = build_client(&config).unwrap();
    let state = Arc::new(AppState::new(config, client));
    let proxy_url = serve(build_router(state)).await;
    (proxy_url, mock)
}

async fn post_messages(proxy_url: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/v1/messages", proxy_url))
        .json(&body)
        .send()
        .await
        .unwrap()
}

/// Event names of an SSE body, in order.
fn event_names(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("event: "))
        .map(str::to_string)
        .collect()
}

// ────────────────────────────────────────────────────────────────
// Library surface
// ────────────────────────────────────────────────────────────────

#[test]
fn test_request_translation_roundtrip() {
    let req: MessagesRequest = serde_json::from_value(json!({
        "model": "claude-sonnet-4-5-20250929",
        "max_tokens": 50,
        "system": "You are a helpful assistant.",
        "messages": [{"role": "user", "content": "Hello"}]
    }))
    .unwrap();

    let mut mapping = HashMap::new();
    mapping.insert("claude-sonnet-4-5-20250929".to_string(), "gpt-4o".to_string());
    let azure_req = build_destination_request(&req, &ModelMapper::new(mapping, "gpt-4o-mini"));

    assert_eq!(azure_req.model, "gpt-4o");
    assert_eq!(azure_req.max_tokens, 50);
    assert!(!azure_req.stream);
    assert_eq!(azure_req.messages.len(), 2);
    assert_eq!(azure_req.messages[0].role, "system");
    assert_eq!(azure_req.messages[1].role, "user");
    assert!(azure_req.tools.is_none());
}

#[test]
fn test_response_translation() {
    let azure_resp: ChatCompletionResponse = serde_json::from_value(json!({
        "id": "chatcmpl-test",
        "model": "gpt-4o",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello there!"}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
    }))
    .unwrap();

    let result = convert_response(&azure_resp).unwrap();

    assert_eq!(result.id, "msg_chatcmpl-test");
    assert_eq!(result.response_type, "message");
    assert_eq!(result.role, "assistant");
    assert_eq!(result.model, "gpt-4o");
    assert_eq!(result.stop_reason, Some("end_turn".to_string()));
    assert_eq!(result.usage.input_tokens, 5);
    assert_eq!(result.usage.output_tokens, 3);
}

#[test]
fn test_reframer_basic() {
    let mut reframer = Reframer::new();

    let events = reframer.push_line(
        r#"data: {"id":"c1","model":"gpt-4o","choices":[{"delta":{"content":"Hi"}}]}"#,
    );
    let names: Vec<_> = events.iter().map(StreamEvent::event_name).collect();
    assert_eq!(
        names,
        vec!["message_start", "content_block_start", "content_block_delta"]
    );

    let final_events = reframer.push_line("data: [DONE]");
    let names: Vec<_> = final_events.iter().map(StreamEvent::event_name).collect();
    assert_eq!(
        names,
        vec!["content_block_stop", "message_delta", "message_stop"]
    );
    assert!(reframer.is_closed());
}

// ────────────────────────────────────────────────────────────────
// End to end through a mock Azure deployment
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_non_streaming_roundtrip() {
    let (proxy_url, mock) = start_proxy().await;

    let resp = post_messages(
        &proxy_url,
        json!({
            "model": "claude-anything",
            "max_tokens": 100,
            "system": "Be brief.",
            "messages": [{"role": "user", "content": "Hi"}]
        }),
    )
    .await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], "msg_chatcmpl-1");
    assert_eq!(body["type"], "message");
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["model"], "gpt-test");
    assert_eq!(body["content"], json!([{"type": "text", "text": "Hello there!"}]));
    assert_eq!(body["stop_reason"], "end_turn");
    assert_eq!(body["stop_sequence"], Value::Null);
    assert_eq!(body["usage"], json!({"input_tokens": 12, "output_tokens": 3}));

    let call = mock.last_call();
    assert_eq!(call.api_key.as_deref(), Some("test-key"));
    assert_eq!(call.query.as_deref(), Some("api-version=2025-04-01-preview"));
    assert_eq!(call.body["model"], "gpt-test");
    assert_eq!(call.body["max_tokens"], 100);
    assert_eq!(call.body["stream"], false);
    assert_eq!(
        call.body["messages"],
        json!([
            {"role": "system", "content": "Be brief."},
            {"role": "user", "content": "Hi"}
        ])
    );
}

#[tokio::test]
async fn test_tool_roundtrip() {
    let (proxy_url, mock) = start_proxy().await;

    let resp = post_messages(
        &proxy_url,
        json!({
            "model": "claude-anything",
            "max_tokens": 200,
            "tools": [{
                "name": "get_weather",
                "description": "Get current weather for a city",
                "input_schema": {"type": "object", "properties": {"city": {"type": "string"}}}
            }],
            "messages": [
                {"role": "user", "content": "Weather in Paris?"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "toolu_prev", "name": "get_weather", "input": {"city": "Paris"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_prev", "content": "18C"}
                ]},
                {"role": "user", "content": "And London?"}
            ]
        }),
    )
    .await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["stop_reason"], "tool_use");
    assert_eq!(
        body["content"],
        json!([{
            "type": "tool_use",
            "id": "toolu_weather1",
            "name": "get_weather",
            "input": {"city": "London"}
        }])
    );

    let call = mock.last_call();
    assert_eq!(call.body["tool_choice"], "auto");
    assert_eq!(call.body["tools"][0]["type"], "function");
    assert_eq!(call.body["tools"][0]["function"]["name"], "get_weather");

    let messages = call.body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], Value::Null);
    assert_eq!(messages[1]["tool_calls"][0]["id"], "call_prev");
    assert_eq!(
        messages[1]["tool_calls"][0]["function"]["arguments"],
        r#"{"city":"Paris"}"#
    );
    assert_eq!(messages[2]["role"], "tool");
    assert_eq!(messages[2]["tool_call_id"], "call_prev");
    assert_eq!(messages[2]["content"], "18C");
}

#[tokio::test]
async fn test_streaming_roundtrip() {
    let (proxy_url, mock) = start_proxy().await;

    let resp = post_messages(
        &proxy_url,
        json!({
            "model": "claude-anything",
            "stream": true,
            "messages": [{"role": "user", "content": "Hi"}]
        }),
    )
    .await;

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()[reqwest::header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(resp.headers()[reqwest::header::CACHE_CONTROL], "no-cache");

    let body = resp.text().await.unwrap();
    assert_eq!(
        event_names(&body),
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_delta",
            "message_stop",
        ]
    );

    let data: Vec<Value> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();
    assert_eq!(data[0]["message"]["id"], "msg_chatcmpl-s1");
    assert_eq!(data[0]["message"]["model"], "gpt-test");
    assert_eq!(data[2]["delta"], json!({"type": "text_delta", "text": "Hel"}));
    assert_eq!(data[3]["delta"], json!({"type": "text_delta", "text": "lo"}));
    assert_eq!(data[7], json!({"type": "message_stop"}));

    assert_eq!(mock.last_call().body["stream"], true);
}

#[tokio::test]
async fn test_stream_longer_than_timeout_is_not_cut_off() {
    let (proxy_url, _mock) = start_proxy().await;

    let resp = post_messages(
        &proxy_url,
        json!({
            "model": "claude-slow",
            "stream": true,
            "messages": [{"role": "user", "content": "Hi"}]
        }),
    )
    .await;

    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("\"lo\""));
    assert!(body.contains("\"stop_reason\":\"max_tokens\""));
    assert_eq!(
        event_names(&body),
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_delta",
            "message_stop",
        ]
    );
}

#[tokio::test]
async fn test_upstream_client_error_keeps_status() {
    let (proxy_url, _mock) = start_proxy().await;

    let resp = post_messages(
        &proxy_url,
        json!({"model": "claude-missing", "messages": [{"role": "user", "content": "Hi"}]}),
    )
    .await;

    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Azure API error:"));
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("DeploymentNotFound"));
}

#[tokio::test]
async fn test_upstream_server_error_is_api_error() {
    let (proxy_url, _mock) = start_proxy().await;

    for stream in [false, true] {
        let resp = post_messages(
            &proxy_url,
            json!({
                "model": "claude-busy",
                "stream": stream,
                "messages": [{"role": "user", "content": "Hi"}]
            }),
        )
        .await;

        assert_eq!(resp.status(), 503);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["type"], "api_error");
        assert_eq!(body["error"]["message"], "Azure API error: overloaded");
    }
}

#[tokio::test]
async fn test_malformed_upstream_response_is_internal_error() {
    let (proxy_url, _mock) = start_proxy().await;

    let resp = post_messages(
        &proxy_url,
        json!({"model": "claude-broken", "messages": [{"role": "user", "content": "Hi"}]}),
    )
    .await;

    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "api_error");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Internal server error:"));
}

#[tokio::test]
async fn test_invalid_body_is_rejected_before_upstream() {
    let (proxy_url, mock) = start_proxy().await;

    let resp = post_messages(&proxy_url, json!({"max_tokens": 10})).await;

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_health_and_root() {
    let (proxy_url, _mock) = start_proxy().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", proxy_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["proxy"], "claude-azure-proxy");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));

    let root: Value = client
        .get(&proxy_url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(root["name"], "claude-azure-proxy");
    assert_eq!(root["endpoints"]["messages"], "POST /v1/messages");
}
