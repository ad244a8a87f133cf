// Whole-body assembly for non-streaming replies.

use crate::message::decode_event;

/// Collapse a complete upstream SSE body into the concatenated reply
/// text. Frames are decoded line by line in arrival order; empty lines,
/// non-`data:` lines and malformed payloads are skipped, and only
/// non-empty event text contributes.
pub fn assemble_text(body: &str) -> String {
    let mut full_text = String::new();
    for line in body.lines() {
        if line.is_empty() || !line.starts_with("data:") {
            continue;
        }
        let Some(event) = decode_event(line) else {
            continue;
        };
        if let Some(text) = event.text {
            if !text.is_empty() {
                full_text.push_str(&text);
            }
        }
    }
    full_text
}
