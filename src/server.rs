use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::models::ModelMapper;
use crate::proxy;
use crate::translate::anthropic_types::{ErrorResponse, MessagesRequest};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

const SERVICE_NAME: &str = "claude-azure-proxy";

/// Shared per-process context handed to every handler.
pub struct AppState {
    pub config: ProxyConfig,
    pub models: ModelMapper,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(config: ProxyConfig, client: reqwest::Client) -> Self {
        let models = config.model_mapper();
        Self {
            config,
            models,
            client,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/v1/messages", post(handle_messages))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_messages(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse request");
            let err = ErrorResponse::invalid_request(format!("Invalid request body: {}", e));
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    let span = tracing::info_span!(
        "messages",
        request_id = %Uuid::new_v4(),
        model = %req.model,
        stream = req.stream
    );

    async move {
        tracing::info!(
            model = %req.model,
            stream = req.stream,
            max_tokens = req.max_tokens,
            messages = req.messages.len(),
            "Request"
        );

        if req.stream {
            handle_streaming(&state, &req).await
        } else {
            handle_non_streaming(&state, &req).await
        }
    }
    .instrument(span)
    .await
}

async fn handle_non_streaming(state: &AppState, req: &MessagesRequest) -> Response {
    match proxy::proxy_non_streaming(req, &state.config, &state.models, &state.client).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn handle_streaming(state: &AppState, req: &MessagesRequest) -> Response {
    let sse_stream =
        match proxy::proxy_streaming(req, &state.config, &state.models, &state.client).await {
            Ok(s) => s,
            Err(e) => return error_response(&e),
        };

    let body = Body::from_stream(sse_stream.map(|frame| Ok::<_, Infallible>(Bytes::from(frame))));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn error_response(err: &ProxyError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %err, "Request failed");
    } else {
        tracing::warn!(status = status.as_u16(), error = %err, "Request rejected upstream");
    }
    (status, Json(err.to_error_response())).into_response()
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "proxy": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "messages": "POST /v1/messages",
            "health": "GET /health",
        },
    }))
}
