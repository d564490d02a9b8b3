//! Server-sent-event decoding
//!
//! SSE bodies look like:
//! ```text
//! event: content_block_delta
//! data: {"json": "content"}
//!
//! data: [DONE]
//! ```
//! Only `data:` lines carry payloads; everything else is framing.

use serde_json::Value;
use tracing::trace;

use super::{DecoderState, DeltaExtractor, StreamDecoder};

/// Literal payload that marks the end of an OpenAI-style stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Line-buffered SSE decoder with a per-provider delta path
pub struct SseDecoder {
    state: DecoderState,
    extract: DeltaExtractor,
    finished: bool,
}

impl SseDecoder {
    pub fn new(extract: DeltaExtractor) -> Self {
        Self {
            state: DecoderState::default(),
            extract,
            finished: false,
        }
    }

    /// Whether the end sentinel has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn process_line(&mut self, line: &str, emit: &mut dyn FnMut(&str)) {
        let line = line.strip_suffix('\r').unwrap_or(line);

        let Some(payload) = line.strip_prefix("data:") else {
            return;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);

        if self.finished {
            return;
        }

        if payload.trim() == DONE_SENTINEL {
            self.finished = true;
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(event) => {
                if let Some(delta) = (self.extract)(&event) {
                    self.state.push_delta(&delta, emit);
                }
            }
            Err(e) => {
                trace!(error = %e, "Skipping malformed SSE data line");
            }
        }
    }
}

impl StreamDecoder for SseDecoder {
    fn feed(&mut self, chunk: &str, emit: &mut dyn FnMut(&str)) {
        self.state.buffer.push_str(chunk);

        while let Some(newline) = self.state.buffer.find('\n') {
            let line: String = self.state.buffer.drain(..=newline).collect();
            self.process_line(&line[..line.len() - 1], emit);
        }
    }

    fn finalize(&mut self, emit: &mut dyn FnMut(&str)) -> String {
        let rest = std::mem::take(&mut self.state.buffer);
        if !rest.is_empty() {
            self.process_line(&rest, emit);
        }
        self.state.emitted.clone()
    }
}
