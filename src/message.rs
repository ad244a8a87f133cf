// Copyright 2026 The Rayrelay Project
// SPDX-License-Identifier: Apache-2.0

//! Message models and conversion.
//!
//! The caller speaks the OpenAI chat shape (role + content, where content
//! is either a plain string or a list of typed parts); the upstream wants
//! an author/text pair per message plus a single `system_instruction`
//! string lifted out of the conversation. `convert_messages` performs that
//! translation in one deterministic pass.

use serde::{Deserialize, Serialize};

/// Default system instruction sent when the caller provides none.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "markdown";

/// Inbound message role. Unrecognized roles deserialize to `Other` and are
/// dropped during conversion instead of failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    #[serde(other)]
    Other,
}

/// Inbound message content: a plain string or a list of typed parts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Plain(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Flatten to a single string: plain content verbatim, parts content as
    /// the in-order concatenation of the `text` of every `"text"` part.
    /// Parts of any other type contribute nothing.
    pub fn flatten(&self) -> String {
        match self {
            MessageContent::Plain(text) => text.clone(),
            MessageContent::Parts(parts) => {
                let mut flattened = String::new();
                for part in parts {
                    if part.kind == "text" {
                        if let Some(text) = &part.text {
                            flattened.push_str(text);
                        }
                    }
                }
                flattened
            }
        }
    }
}

/// One element of a structured content list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// One caller-supplied chat message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

/// Upstream message author. Only user and assistant turns survive
/// conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

/// One message in the upstream conversation shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamMessage {
    pub author: Author,
    pub content: UpstreamContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamContent {
    pub text: String,
}

/// Output of `convert_messages`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub messages: Vec<UpstreamMessage>,
    pub system_instruction: String,
}

/// Convert a caller conversation into the upstream shape.
///
/// Only a system message in position zero becomes the system instruction:
/// plain string content is taken verbatim, parts content is flattened and
/// replaces the default only when non-empty. User and assistant messages
/// are flattened and kept in order; system messages in any later position
/// and unrecognized roles are dropped.
pub fn convert_messages(inbound: &[InboundMessage]) -> ConversionResult {
    let mut system_instruction = DEFAULT_SYSTEM_INSTRUCTION.to_string();
    let mut messages = Vec::new();

    for (position, message) in inbound.iter().enumerate() {
        match message.role {
            Role::System if position == 0 => match &message.content {
                Some(MessageContent::Plain(text)) => {
                    system_instruction = text.clone();
                }
                Some(content @ MessageContent::Parts(_)) => {
                    let flattened = content.flatten();
                    if !flattened.is_empty() {
                        system_instruction = flattened;
                    }
                }
                None => {}
            },
            Role::User | Role::Assistant => {
                let author = if message.role == Role::Assistant {
                    Author::Assistant
                } else {
                    Author::User
                };
                let text = message
                    .content
                    .as_ref()
                    .map(MessageContent::flatten)
                    .unwrap_or_default();
                messages.push(UpstreamMessage {
                    author,
                    content: UpstreamContent { text },
                });
            }
            // System messages past position zero and unknown roles.
            _ => {}
        }
    }

    ConversionResult {
        messages,
        system_instruction,
    }
}

/// One decoded upstream SSE event. Both fields are optional; a finish
/// event may carry no text and a delta no finish reason.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpstreamEvent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Decode the JSON payload of one `data:` line.
///
/// Returns `None` for lines without the `data:` prefix and for payloads
/// that fail to parse; malformed frames are skipped, never fatal.
pub fn decode_event(line: &str) -> Option<UpstreamEvent> {
    let payload = line.strip_prefix("data:")?.trim();
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::debug!(error = %err, "skipping malformed upstream frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(json: &str) -> Vec<InboundMessage> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn plain_system_message_becomes_instruction() {
        let result = convert_messages(&messages(
            r#"[{"role":"system","content":"Be brief."},{"role":"user","content":"hi"}]"#,
        ));
        assert_eq!(result.system_instruction, "Be brief.");
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].author, Author::User);
        assert_eq!(result.messages[0].content.text, "hi");
    }

    #[test]
    fn missing_system_message_keeps_default_instruction() {
        let result =
            convert_messages(&messages(r#"[{"role":"user","content":"hello"}]"#));
        assert_eq!(result.system_instruction, DEFAULT_SYSTEM_INSTRUCTION);
    }

    #[test]
    fn plain_system_string_is_taken_verbatim_even_when_empty() {
        let result = convert_messages(&messages(
            r#"[{"role":"system","content":""},{"role":"user","content":"hi"}]"#,
        ));
        assert_eq!(result.system_instruction, "");
    }

    #[test]
    fn parts_system_message_is_flattened() {
        let result = convert_messages(&messages(
            r#"[{"role":"system","content":[
                {"type":"text","text":"Answer "},
                {"type":"image_url","image_url":{"url":"x"}},
                {"type":"text","text":"tersely."}
            ]}]"#,
        ));
        assert_eq!(result.system_instruction, "Answer tersely.");
    }

    #[test]
    fn empty_parts_system_message_keeps_default() {
        let result = convert_messages(&messages(
            r#"[{"role":"system","content":[{"type":"image_url"}]}]"#,
        ));
        assert_eq!(result.system_instruction, DEFAULT_SYSTEM_INSTRUCTION);
    }

    #[test]
    fn later_system_messages_are_dropped() {
        let result = convert_messages(&messages(
            r#"[{"role":"user","content":"a"},
                {"role":"system","content":"ignored"},
                {"role":"assistant","content":"b"}]"#,
        ));
        assert_eq!(result.system_instruction, DEFAULT_SYSTEM_INSTRUCTION);
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[1].author, Author::Assistant);
    }

    #[test]
    fn unknown_roles_are_dropped() {
        let result = convert_messages(&messages(
            r#"[{"role":"tool","content":"x"},{"role":"user","content":"y"}]"#,
        ));
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].content.text, "y");
    }

    #[test]
    fn user_parts_content_is_flattened_in_order() {
        let result = convert_messages(&messages(
            r#"[{"role":"user","content":[
                {"type":"text","text":"one "},
                {"type":"text","text":"two"}
            ]}]"#,
        ));
        assert_eq!(result.messages[0].content.text, "one two");
    }

    #[test]
    fn missing_content_flattens_to_empty() {
        let result = convert_messages(&messages(r#"[{"role":"user"}]"#));
        assert_eq!(result.messages[0].content.text, "");
    }

    #[test]
    fn conversion_is_deterministic() {
        let input = messages(
            r#"[{"role":"system","content":"s"},
                {"role":"user","content":"u"},
                {"role":"assistant","content":"a"}]"#,
        );
        assert_eq!(convert_messages(&input), convert_messages(&input));
    }

    #[test]
    fn decode_event_parses_text_and_finish_reason() {
        let event = decode_event(r#"data: {"text":"Hel","finish_reason":"stop"}"#).unwrap();
        assert_eq!(event.text.as_deref(), Some("Hel"));
        assert_eq!(event.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn decode_event_ignores_non_data_lines() {
        assert!(decode_event("event: ping").is_none());
        assert!(decode_event("").is_none());
    }

    #[test]
    fn decode_event_skips_malformed_payloads() {
        assert!(decode_event("data: {not json").is_none());
        assert!(decode_event("data: [DONE]").is_none());
    }
}
