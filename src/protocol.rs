// Copyright 2026 The Rayrelay Project
// SPDX-License-Identifier: Apache-2.0

//! Wire envelopes in both directions.
//!
//! Caller side: the OpenAI chat-completion request and the chunk /
//! response / model-list bodies we answer with. Upstream side: the full
//! chat request the backend expects. Builders here are pure; ids and
//! timestamps are minted at construction time.

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DEFAULT_MODEL;
use crate::message::{ConversionResult, InboundMessage, UpstreamEvent, UpstreamMessage};
use crate::models::ModelDirectory;

// ---------------------------------------------------------------------------
// Caller request
// ---------------------------------------------------------------------------

/// The inbound chat-completion request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// The caller-visible model id, falling back to the default model.
    pub fn model_id(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }

    /// Sampling temperature. Absent or exactly zero falls back to 0.5.
    pub fn effective_temperature(&self) -> f64 {
        match self.temperature {
            Some(t) if t != 0.0 => t,
            _ => 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream request
// ---------------------------------------------------------------------------

/// The chat request body the upstream backend expects.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamChatRequest {
    pub additional_system_instructions: String,
    pub debug: bool,
    pub locale: String,
    pub messages: Vec<UpstreamMessage>,
    pub model: String,
    pub provider: String,
    pub source: String,
    pub system_instruction: String,
    pub temperature: f64,
    pub thread_id: String,
    pub tools: Vec<UpstreamTool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamTool {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl UpstreamChatRequest {
    /// Assemble the upstream body for one resolved provider/model pair.
    /// Every request gets a fresh `thread_id`.
    pub fn new(
        conversion: ConversionResult,
        provider: &str,
        model: &str,
        temperature: f64,
    ) -> Self {
        Self {
            additional_system_instructions: String::new(),
            debug: false,
            locale: "en-US".to_string(),
            messages: conversion.messages,
            model: model.to_string(),
            provider: provider.to_string(),
            source: "ai_chat".to_string(),
            system_instruction: conversion.system_instruction,
            temperature,
            thread_id: Uuid::new_v4().to_string(),
            tools: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming chunk
// ---------------------------------------------------------------------------

/// SSE terminator frame.
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// One OpenAI-format streaming chunk.
#[derive(Debug, Serialize)]
pub struct OutboundChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: String,
}

#[derive(Debug, Serialize)]
pub struct ChunkDelta {
    pub content: String,
}

impl OutboundChunk {
    /// Build the chunk for one decoded upstream event. Each chunk mints
    /// its own id; the finish reason is copied verbatim and serializes as
    /// an empty string when the event carries none.
    pub fn from_event(event: UpstreamEvent, model: &str) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            object: "chat.completion.chunk",
            created: Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    content: event.text.unwrap_or_default(),
                },
                finish_reason: event.finish_reason.unwrap_or_default(),
            }],
        }
    }

    /// Encode as one SSE frame, `data: <json>\n\n`.
    pub fn to_frame(&self) -> Option<Bytes> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Bytes::from(format!("data: {json}\n\n"))),
            Err(err) => {
                tracing::debug!(error = %err, "failed to encode outbound chunk");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Buffered response
// ---------------------------------------------------------------------------

/// One complete OpenAI-format chat completion.
#[derive(Debug, Serialize)]
pub struct OutboundResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ResponseChoice>,
    pub usage: Usage,
    pub service_tier: &'static str,
    pub system_fingerprint: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ResponseChoice {
    pub index: u32,
    pub message: ResponseMessage,
    pub logprobs: Option<serde_json::Value>,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ResponseMessage {
    pub role: &'static str,
    pub content: String,
    pub refusal: Option<String>,
    pub annotations: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub prompt_tokens_details: PromptTokensDetails,
    pub completion_tokens_details: CompletionTokensDetails,
}

#[derive(Debug, Serialize)]
pub struct PromptTokensDetails {
    pub cached_tokens: u32,
    pub audio_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct CompletionTokensDetails {
    pub reasoning_tokens: u32,
    pub audio_tokens: u32,
    pub accepted_prediction_tokens: u32,
    pub rejected_prediction_tokens: u32,
}

impl OutboundResponse {
    /// Build the buffered completion for the assembled text.
    ///
    /// The upstream exposes no token accounting, so the usage block is a
    /// fixed placeholder and the finish reason is always `"length"`.
    pub fn new(model: &str, content: String) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            object: "chat.completion",
            created: Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![ResponseChoice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant",
                    content,
                    refusal: None,
                    annotations: Vec::new(),
                },
                logprobs: None,
                finish_reason: "length",
            }],
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 10,
                total_tokens: 20,
                prompt_tokens_details: PromptTokensDetails {
                    cached_tokens: 0,
                    audio_tokens: 0,
                },
                completion_tokens_details: CompletionTokensDetails {
                    reasoning_tokens: 0,
                    audio_tokens: 0,
                    accepted_prediction_tokens: 0,
                    rejected_prediction_tokens: 0,
                },
            },
            service_tier: "default",
            system_fingerprint: "fp_b376dfbbd5",
        }
    }
}

// ---------------------------------------------------------------------------
// Model listing and refresh
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ModelListResponse {
    pub object: &'static str,
    pub data: Vec<ModelListEntry>,
}

#[derive(Debug, Serialize)]
pub struct ModelListEntry {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: String,
}

impl ModelListResponse {
    /// List every directory entry in the OpenAI model-list shape.
    pub fn from_directory(directory: &ModelDirectory) -> Self {
        let created = Utc::now().timestamp();
        let mut data: Vec<ModelListEntry> = directory
            .models
            .iter()
            .map(|(id, entry)| ModelListEntry {
                id: id.clone(),
                object: "model",
                created,
                owned_by: entry.provider.clone(),
            })
            .collect();
        data.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            object: "list",
            data,
        }
    }
}

/// Reply body for the forced model refresh endpoint.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub status: &'static str,
    pub models: usize,
}

/// Pretty-printed JSON with a trailing newline, the format used for every
/// buffered reply body.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}
