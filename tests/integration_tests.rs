//! Integration tests for the chat endpoint.
//! These drive the router end to end with a scripted model and fake market data.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use stock_chat::agents::{ChatAgent, InMemoryCheckpointStore};
use stock_chat::api::{build_router, AppState};
use stock_chat::llm::ChatMessage;
use stock_chat::test_utils::{FakeMarketData, ScriptedModel, ScriptedTurn};
use stock_chat::tools::ToolRegistry;
use tower::ServiceExt;

const SYSTEM_PROMPT: &str = "You are a stock analyst.";

fn app(model: &ScriptedModel, data: &FakeMarketData) -> Router {
    let agent = ChatAgent::new(
        Arc::new(model.clone()),
        ToolRegistry::with_stock_tools(Arc::new(data.clone())),
        Arc::new(InMemoryCheckpointStore::new()),
        8,
        16,
    );
    build_router(Arc::new(AppState {
        agent: Arc::new(agent),
        system_prompt: SYSTEM_PROMPT.to_string(),
    }))
}

fn chat_body(content: &str, thread_id: &str) -> Value {
    json!({
        "prompt": {"content": content, "id": "p1", "role": "user"},
        "threadId": thread_id,
        "responseId": "r1"
    })
}

fn post(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Plain answer streams back with the event-stream headers
#[tokio::test]
async fn test_chat_streams_tokens_with_headers() {
    let model = ScriptedModel::new(vec![ScriptedTurn::text(&["Hello", " there", "!"])]);
    let app = app(&model, &FakeMarketData::new());

    let (status, headers, body) = send(&app, post(chat_body("hi", "t1").to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-transform");
    assert_eq!(headers[header::CONNECTION], "keep-alive");
    assert_eq!(body, "Hello there!");

    let requests = model.requests();
    assert_eq!(
        requests[0],
        vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user("hi")]
    );
}

/// Price question goes through the tool exactly once
#[tokio::test]
async fn test_price_question_uses_tool() {
    let model = ScriptedModel::new(vec![
        ScriptedTurn::tool_call("call_1", "get_stock_price", json!({"ticker": "AAPL"})),
        ScriptedTurn::text(&["AAPL last closed at ", "$190.12", "."]),
    ]);
    let data = FakeMarketData::new().with_price("AAPL", 190.12);
    let app = app(&model, &data);

    let (status, _, body) = send(
        &app,
        post(chat_body("What is AAPL's current price?", "t1").to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "AAPL last closed at $190.12.");
    assert_eq!(
        data.calls(),
        vec![("latest_price".to_string(), "AAPL".to_string())]
    );
}

/// A later request on the same thread sees the earlier exchange
#[tokio::test]
async fn test_thread_history_carries_over() {
    let model = ScriptedModel::new(vec![
        ScriptedTurn::text(&["Got it."]),
        ScriptedTurn::text(&["MSFT."]),
        ScriptedTurn::text(&["Nothing yet."]),
    ]);
    let app = app(&model, &FakeMarketData::new());

    send(&app, post(chat_body("I like MSFT", "t1").to_string())).await;
    send(&app, post(chat_body("Which stock do I like?", "t1").to_string())).await;
    send(&app, post(chat_body("Which stock do I like?", "t2").to_string())).await;

    let requests = model.requests();
    assert!(requests[1].contains(&ChatMessage::user("I like MSFT")));
    assert!(!requests[2].contains(&ChatMessage::user("I like MSFT")));
}

/// Missing threadId is rejected before the model runs
#[tokio::test]
async fn test_missing_thread_id_is_422() {
    let model = ScriptedModel::new(Vec::new());
    let app = app(&model, &FakeMarketData::new());
    let body = json!({
        "prompt": {"content": "hi", "id": "p1", "role": "user"},
        "responseId": "r1"
    });

    let (status, _, body) = send(&app, post(body.to_string())).await;
    let detail: Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(detail["detail"][0]["loc"], json!(["body", "threadId"]));
    assert_eq!(detail["detail"][0]["type"], "missing");
    assert!(model.requests().is_empty());
}

/// Non-string content is a validation error too
#[tokio::test]
async fn test_non_string_content_is_422() {
    let model = ScriptedModel::new(Vec::new());
    let app = app(&model, &FakeMarketData::new());
    let body = json!({
        "prompt": {"content": 42, "id": "p1", "role": "user"},
        "threadId": "t1",
        "responseId": "r1"
    });

    let (status, _, body) = send(&app, post(body.to_string())).await;
    let detail: Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        detail["detail"][0]["loc"],
        json!(["body", "prompt", "content"])
    );
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let model = ScriptedModel::new(Vec::new());
    let app = app(&model, &FakeMarketData::new());

    let (status, _, body) = send(&app, post("{\"prompt\": ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("JSON decode error"));
    assert!(model.requests().is_empty());
}

/// Failure after some tokens ends the stream with an error event
#[tokio::test]
async fn test_mid_stream_failure_emits_error_event() {
    let model = ScriptedModel::new(vec![ScriptedTurn::FailAfter {
        tokens: vec!["Looking".to_string(), " it up".to_string()],
        error: "upstream reset".to_string(),
    }]);
    let app = app(&model, &FakeMarketData::new());

    let (status, _, body) = send(&app, post(chat_body("hi", "t1").to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("Looking it up"));
    assert!(body.contains("event: error\ndata: "));
    assert!(body.contains("upstream reset"));
    assert!(body.ends_with("\n\n"));
}

/// Unknown ticker surfaces the provider failure instead of hanging
#[tokio::test]
async fn test_unknown_ticker_ends_with_error_event() {
    let model = ScriptedModel::new(vec![ScriptedTurn::tool_call(
        "call_1",
        "get_company_info",
        json!({"ticker": "ZZZZ"}),
    )]);
    let data = FakeMarketData::new();
    let app = app(&model, &data);

    let (status, _, body) = send(&app, post(chat_body("Tell me about ZZZZ", "t1").to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("event: error\ndata: "));
    assert!(body.contains("ZZZZ"));
    assert_eq!(data.calls().len(), 1);
}

#[tokio::test]
async fn test_health() {
    let app = app(&ScriptedModel::new(Vec::new()), &FakeMarketData::new());
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"status": "ok"}));
}
