// Copyright 2026 The Rayrelay Project
// SPDX-License-Identifier: Apache-2.0

//! Request orchestration.
//!
//! `Relay` owns the pipeline for one chat call: validate, resolve the
//! model through the cache, convert the conversation, build and POST the
//! upstream request, then hand the reply to the transcoder (streaming)
//! or the assembler (buffered). The upstream HTTP call itself sits
//! behind the `ChatTransport` trait so the pipeline is testable without
//! a network.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::config::Config;
use crate::error::RelayError;
use crate::message::convert_messages;
use crate::models::ModelCache;
use crate::protocol::{
    self, ChatRequest, ModelListResponse, OutboundResponse, RefreshResponse,
    UpstreamChatRequest,
};
use crate::proxy::{ChatReply, RelayBackend};
use crate::stream::{assemble_text, transcode};

// ---------------------------------------------------------------------------
// Upstream transport
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("error sending request to upstream: {0}")]
    Transport(String),

    #[error("upstream request timed out: {0}")]
    Timeout(String),
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Status and body of an upstream chat reply. The body is always a
/// stream; buffered paths collect it.
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: ByteStream,
}

/// Sends one chat-completion call to the upstream backend.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_chat(&self, body: Bytes) -> Result<UpstreamReply, TransportError>;
}

/// Real transport: POST with the fixed upstream header set and the
/// optional configured timeout.
pub struct ReqwestChatTransport {
    client: reqwest::Client,
    config: Arc<Config>,
}

impl ReqwestChatTransport {
    pub fn new(client: reqwest::Client, config: Arc<Config>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ChatTransport for ReqwestChatTransport {
    async fn send_chat(&self, body: Bytes) -> Result<UpstreamReply, TransportError> {
        let mut request = self
            .client
            .post(&self.config.chat_url)
            .headers(self.config.upstream_headers())
            .body(body);
        if let Some(timeout_ms) = self.config.chat_timeout_ms {
            request = request.timeout(Duration::from_millis(timeout_ms));
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout(err.to_string())
            } else {
                TransportError::Transport(err.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .bytes_stream()
            .map_err(|err| TransportError::Transport(err.to_string()));
        Ok(UpstreamReply {
            status,
            body: Box::pin(body),
        })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Relay {
    cache: Arc<ModelCache>,
    transport: Arc<dyn ChatTransport>,
}

impl Relay {
    pub fn new(cache: Arc<ModelCache>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { cache, transport }
    }
}

#[async_trait]
impl RelayBackend for Relay {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, RelayError> {
        if request.messages.is_empty() {
            return Err(RelayError::InvalidRequest {
                message: "Missing or invalid 'messages' field".to_string(),
                details: None,
            });
        }

        let model_id = request.model_id().to_string();
        let (provider, upstream_model) = self.cache.resolve(&model_id).await;
        let request_id = Uuid::new_v4().to_string();
        tracing::info!(
            request_id = %request_id,
            model = %model_id,
            provider = %provider,
            upstream_model = %upstream_model,
            stream = request.stream,
            "relaying chat completion"
        );

        let conversion = convert_messages(&request.messages);
        let upstream_request = UpstreamChatRequest::new(
            conversion,
            &provider,
            &upstream_model,
            request.effective_temperature(),
        );
        let body = serde_json::to_vec(&upstream_request).map_err(|err| {
            RelayError::Server {
                message: "Failed to serialize upstream request".to_string(),
                details: Some(err.to_string()),
            }
        })?;

        let reply = self
            .transport
            .send_chat(Bytes::from(body))
            .await
            .map_err(|err| RelayError::Transport(err.to_string()))?;

        if !reply.status.is_success() {
            let error_text = collect_body(reply.body).await.unwrap_or_default();
            tracing::warn!(
                request_id = %request_id,
                status = reply.status.as_u16(),
                "upstream rejected chat request"
            );
            return Err(RelayError::Upstream {
                status: reply.status.as_u16(),
                message: compact_error_text(&error_text),
            });
        }

        if request.stream {
            let input = drop_transport_errors(reply.body);
            Ok(ChatReply::Stream(Box::pin(transcode(input, model_id))))
        } else {
            let body_text = collect_body(reply.body).await.map_err(|err| {
                RelayError::Server {
                    message: "Error reading response body".to_string(),
                    details: Some(err.to_string()),
                }
            })?;
            let content = assemble_text(&body_text);
            let response = OutboundResponse::new(&model_id, content);
            let json = protocol::to_pretty_json(&response).map_err(|err| {
                RelayError::Server {
                    message: "Error formatting JSON response".to_string(),
                    details: Some(err.to_string()),
                }
            })?;
            Ok(ChatReply::Full(Bytes::from(json)))
        }
    }

    async fn models(&self) -> Result<Bytes, RelayError> {
        let directory = self.cache.get().await;
        let listing = ModelListResponse::from_directory(&directory);
        let json = protocol::to_pretty_json(&listing).map_err(|err| RelayError::Server {
            message: "Error formatting JSON response".to_string(),
            details: Some(err.to_string()),
        })?;
        Ok(Bytes::from(json))
    }

    async fn refresh_models(&self) -> Result<Bytes, RelayError> {
        let count = self.cache.force_refresh().await;
        tracing::info!(models = count, "forced model directory refresh");
        let json = protocol::to_pretty_json(&RefreshResponse {
            status: "ok",
            models: count,
        })
        .map_err(|err| RelayError::Server {
            message: "Error formatting JSON response".to_string(),
            details: Some(err.to_string()),
        })?;
        Ok(Bytes::from(json))
    }
}

/// Collect a body stream into a string, failing on the first transport
/// error.
async fn collect_body(mut body: ByteStream) -> Result<String, TransportError> {
    let mut collected = Vec::new();
    while let Some(chunk) = body.next().await {
        collected.extend_from_slice(&chunk?);
    }
    Ok(String::from_utf8_lossy(&collected).into_owned())
}

/// Re-serialize an upstream error body compactly when it parses as JSON;
/// otherwise pass it through untouched.
fn compact_error_text(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}

/// Adapt the transport stream for the transcoder: mid-stream errors are
/// logged and dropped so the SSE loop only ever sees bytes.
fn drop_transport_errors(body: ByteStream) -> Pin<Box<dyn Stream<Item = Bytes> + Send>> {
    Box::pin(body.filter_map(|item| async move {
        match item {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                tracing::warn!(error = %err, "error reading upstream stream");
                None
            }
        }
    }))
}
