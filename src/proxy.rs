// Copyright 2026 The Rayrelay Project
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface.
//!
//! Thin axum layer over the `RelayBackend` seam: route registration,
//! request-body limits and JSON validation, response headers for the two
//! reply shapes, and a permissive CORS layer. Everything with protocol
//! knowledge lives behind the trait.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Method, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

use crate::error::RelayError;
use crate::protocol::ChatRequest;

/// Upper bound on inbound request bodies.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Reply from the backend for one chat call.
pub enum ChatReply {
    /// Fully assembled JSON body.
    Full(Bytes),
    /// Outbound SSE frames, forwarded as they are produced.
    Stream(Pin<Box<dyn Stream<Item = Bytes> + Send>>),
}

impl std::fmt::Debug for ChatReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatReply::Full(bytes) => f.debug_tuple("Full").field(bytes).finish(),
            ChatReply::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

/// The relay pipeline as seen from the HTTP layer.
#[async_trait]
pub trait RelayBackend: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, RelayError>;
    async fn models(&self) -> Result<Bytes, RelayError>;
    async fn refresh_models(&self) -> Result<Bytes, RelayError>;
}

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn RelayBackend>,
}

/// Build the router with all relay routes and the CORS layer.
pub fn build_router(backend: Arc<dyn RelayBackend>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(models))
        .route("/v1/refresh-models", get(refresh_models))
        .route("/health", get(health))
        .layer(cors)
        .with_state(AppState { backend })
}

async fn chat_completions(State(state): State<AppState>, request: Request<Body>) -> Response {
    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(err) => {
            return RelayError::InvalidRequest {
                message: "failed to read request body".to_string(),
                details: Some(err.to_string()),
            }
            .into_response();
        }
    };

    let chat_request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return RelayError::InvalidRequest {
                message: "Invalid request body".to_string(),
                details: Some(err.to_string()),
            }
            .into_response();
        }
    };

    match state.backend.chat(chat_request).await {
        Ok(ChatReply::Full(bytes)) => json_response(bytes),
        Ok(ChatReply::Stream(frames)) => sse_response(frames),
        Err(err) => err.into_response(),
    }
}

async fn models(State(state): State<AppState>) -> Response {
    match state.backend.models().await {
        Ok(bytes) => json_response(bytes),
        Err(err) => err.into_response(),
    }
}

async fn refresh_models(State(state): State<AppState>) -> Response {
    match state.backend.refresh_models().await {
        Ok(bytes) => json_response(bytes),
        Err(err) => err.into_response(),
    }
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "ok"}))
}

fn json_response(bytes: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], bytes).into_response()
}

fn sse_response(frames: Pin<Box<dyn Stream<Item = Bytes> + Send>>) -> Response {
    let body = Body::from_stream(frames.map(Ok::<_, std::io::Error>));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}
