// Copyright 2026 The Rayrelay Project
// SPDX-License-Identifier: Apache-2.0

//! Upstream SSE handling: the incremental transcoder for streaming
//! replies and the whole-body assembler for buffered ones. Both decode
//! the same `data:` frames; they differ only in when output is produced.

mod assembler;
mod transcoder;


pub use assembler::assemble_text;
pub use transcoder::transcode;
