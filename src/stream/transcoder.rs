// Incremental SSE transcoding.
//
// The upstream reply arrives as a byte stream with no alignment between
// network chunks and SSE frames. Bytes are accumulated into lines and
// lines into blank-line-terminated blocks; only complete blocks are
// decoded. Each decoded event becomes exactly one outbound chunk frame,
// forwarded the moment it exists.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::message::decode_event;
use crate::protocol::{OutboundChunk, DONE_FRAME};

const CHANNEL_CAPACITY: usize = 64;

/// Transcode an upstream SSE byte stream into OpenAI streaming frames.
///
/// The returned stream yields one `data: <json>\n\n` frame per decoded
/// upstream event and always terminates with `data: [DONE]\n\n`, whatever
/// the upstream did. Malformed frames are skipped; trailing bytes that
/// never reached a blank-line terminator are discarded at end of input.
pub fn transcode(
    input: impl Stream<Item = Bytes> + Send + Unpin + 'static,
    model: String,
) -> impl Stream<Item = Bytes> {
    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut input = input;
        let mut pending = String::new();
        let mut block = String::new();

        while let Some(chunk) = input.next().await {
            pending.push_str(&String::from_utf8_lossy(&chunk));

            // Move complete lines into the current block; a block is
            // ready once it ends with a blank line.
            while let Some(newline) = pending.find('\n') {
                let line: String = pending.drain(..=newline).collect();
                block.push_str(&line);
                if block.ends_with("\n\n") {
                    let ready = std::mem::take(&mut block);
                    if emit_block(&ready, &model, &tx).await.is_err() {
                        // Receiver gone: the caller disconnected.
                        return;
                    }
                }
            }
        }

        // An unterminated trailing block is dropped, never parsed.
        if !block.is_empty() || !pending.is_empty() {
            tracing::debug!(
                bytes = block.len() + pending.len(),
                "discarding unterminated trailing block"
            );
        }

        let _ = tx.send(Bytes::from_static(DONE_FRAME)).await;
    });

    ReceiverStream::new(rx)
}

/// Emit one outbound frame per decodable `data:` line in a complete
/// block. `Err` means the receiver side is gone.
async fn emit_block(block: &str, model: &str, tx: &mpsc::Sender<Bytes>) -> Result<(), ()> {
    for line in block.split('\n') {
        if line.trim().is_empty() || !line.starts_with("data:") {
            continue;
        }
        let Some(event) = decode_event(line) else {
            continue;
        };
        let Some(frame) = OutboundChunk::from_event(event, model).to_frame() else {
            continue;
        };
        if tx.send(frame).await.is_err() {
            return Err(());
        }
    }
    Ok(())
}
