//! LifeHub HTTP 服务
//!
//! 启动: cargo run --bin lifehub-web --features web
//! 路由：GET / 与 GET /health，POST /chat（SSE），POST /chat/sync（JSON）

#![cfg(feature = "web")]

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use lifehub::agent::{chat_stream, chat_sync, ChatRequest, ChatResponse};
use lifehub::config::load_config_or_default;
use lifehub::core::{build_tool_registry, OrchestratorCache};

struct AppState {
    cache: OrchestratorCache,
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// POST /chat：text/event-stream，每帧 `data: <json>`；客户端断开即取消运行
async fn api_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(provider = %req.provider, debug = req.debug, messages = req.messages.len(), "POST /chat");
    let events = chat_stream(&state.cache, req, CancellationToken::new()).await;
    let frames = events.map(|ev| Ok::<_, Infallible>(Event::default().data(ev.to_json())));
    Sse::new(frames).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive"))
}

/// POST /chat/sync：失败返回 500，正文为出错服务的原始信息
async fn api_chat_sync(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    tracing::info!(provider = %req.provider, debug = req.debug, "POST /chat/sync");
    chat_sync(&state.cache, req).await.map(Json).map_err(|e| {
        tracing::error!("Chat error: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lifehub::observability::init();

    let cfg = load_config_or_default(None);
    let port = cfg.web.port;
    let registry = Arc::new(build_tool_registry(&cfg).await);
    let state = Arc::new(AppState {
        cache: OrchestratorCache::new(cfg, registry),
    });

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/chat", post(api_chat))
        .route("/chat/sync", post(api_chat_sync))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("LifeHub API: http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
