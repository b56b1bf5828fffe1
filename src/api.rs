use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::info;

use crate::agents::{ChatAgent, RunOptions};
use crate::constants::server::{CHAT_ROUTE, HEALTH_ROUTE};
use crate::error::AgentError;
use crate::llm::ChatMessage;
use crate::request::ChatRequest;

pub struct AppState {
    pub agent: Arc<ChatAgent>,
    pub system_prompt: String,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(CHAT_ROUTE, post(chat))
        .route(HEALTH_ROUTE, get(health))
        .with_state(state)
}

pub async fn run_server(state: Arc<AppState>, addr: &str) -> std::io::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API Server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Terminal event written when a turn fails mid-stream.
pub fn error_event(err: &AgentError) -> Bytes {
    let message = err.to_string().replace('\n', " ");
    Bytes::from(format!("event: error\ndata: {message}\n\n"))
}

async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match ChatRequest::from_json(&body) {
        Ok(request) => request,
        Err(rejection) => {
            info!("💬 [API] Rejected chat request: {:?}", rejection);
            return rejection.into_response();
        }
    };

    info!(
        "💬 [API] Chat request (thread: {}, response: {}, prompt: {})",
        request.thread_id, request.response_id, request.prompt.id
    );

    let messages = vec![
        ChatMessage::system(state.system_prompt.as_str()),
        ChatMessage::user(request.prompt.content),
    ];
    let options = RunOptions {
        thread_id: request.thread_id,
    };

    let tokens = state.agent.stream(messages, options).map(|item| {
        Ok::<_, Infallible>(match item {
            Ok(token) => Bytes::from(token),
            Err(e) => error_event(&e),
        })
    });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-transform"),
            ),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        ],
        Body::from_stream(tokens),
    )
        .into_response()
}
