//! Incremental decoders from provider stream formats to text deltas
//!
//! Every decoder accepts text in arbitrarily split chunks. The concatenation of
//! all deltas emitted by `feed` plus whatever `finalize` emits is the same no
//! matter where the chunk boundaries fell.

mod json_array;
mod sse;

pub use json_array::JsonArrayDecoder;
pub use sse::{DONE_SENTINEL, SseDecoder};

use serde_json::Value;

/// Pulls the delta text out of one parsed stream event or array element
pub type DeltaExtractor = fn(&Value) -> Option<String>;

/// Stateful incremental parser for one streaming response
pub trait StreamDecoder: Send {
    /// Consume the next chunk of text, calling `emit` once per delta in order
    fn feed(&mut self, chunk: &str, emit: &mut dyn FnMut(&str));

    /// Flush whatever is still buffered and return the full decoded content
    fn finalize(&mut self, emit: &mut dyn FnMut(&str)) -> String;
}

/// Unparsed trailing input plus everything emitted so far
#[derive(Debug, Clone, Default)]
pub struct DecoderState {
    pub buffer: String,
    pub emitted: String,
}

impl DecoderState {
    /// Record a delta and hand it to the caller; empty deltas are dropped
    pub fn push_delta(&mut self, delta: &str, emit: &mut dyn FnMut(&str)) {
        if delta.is_empty() {
            return;
        }
        self.emitted.push_str(delta);
        emit(delta);
    }
}

/// Decode a complete input in one pass, returning the deltas and the final content
pub fn decode_all(decoder: &mut dyn StreamDecoder, input: &str) -> (Vec<String>, String) {
    let mut deltas = Vec::new();
    let mut collect = |delta: &str| deltas.push(delta.to_string());
    decoder.feed(input, &mut collect);
    let content = decoder.finalize(&mut collect);
    (deltas, content)
}
