//! Streamed JSON array decoding
//!
//! Google's `streamGenerateContent` answers with one top-level JSON array whose
//! elements arrive over time, with no line framing:
//! ```text
//! [{"candidates": [...]}
//! ,{"candidates": [...]}
//! ]
//! ```
//! Chunk boundaries can land anywhere, including inside string literals that
//! themselves contain `[`, `]`, `{`, `}` or escaped quotes. The scanner tracks
//! bracket nesting outside strings and hands each element to the extractor as
//! soon as it closes. Bare top-level objects (newline-delimited JSON) are
//! treated as single elements.

use serde_json::Value;
use tracing::{debug, trace};

use super::{DecoderState, DeltaExtractor, StreamDecoder};

/// String-aware bracket-depth decoder for streamed JSON arrays
pub struct JsonArrayDecoder {
    state: DecoderState,
    extract: DeltaExtractor,
    /// Next byte of `state.buffer` to scan
    cursor: usize,
    /// Expected closing bytes for every open bracket, innermost last
    closers: Vec<u8>,
    in_string: bool,
    escaped: bool,
    /// Inside the top-level array
    in_array: bool,
    /// Buffer offset where the element currently being scanned starts
    element_start: Option<usize>,
}

impl JsonArrayDecoder {
    pub fn new(extract: DeltaExtractor) -> Self {
        Self {
            state: DecoderState::default(),
            extract,
            cursor: 0,
            closers: Vec::new(),
            in_string: false,
            escaped: false,
            in_array: false,
            element_start: None,
        }
    }

    /// Current bracket nesting depth
    pub fn depth(&self) -> usize {
        self.closers.len()
    }

    fn scan(&mut self, emit: &mut dyn FnMut(&str)) {
        while self.cursor < self.state.buffer.len() {
            let pos = self.cursor;
            let byte = self.state.buffer.as_bytes()[pos];
            self.cursor += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'[' | b'{' => {
                    let depth = self.closers.len();
                    if depth == 0 && byte == b'[' {
                        self.in_array = true;
                    } else if depth == 0 || (depth == 1 && self.in_array) {
                        self.element_start = Some(pos);
                    }
                    self.closers.push(if byte == b'[' { b']' } else { b'}' });
                }
                b']' | b'}' => {
                    if self.closers.pop().is_none() {
                        // stray closer outside any structure
                        continue;
                    }
                    let depth = self.closers.len();

                    let element_closed =
                        (depth == 1 && self.in_array) || (depth == 0 && !self.in_array);
                    if element_closed {
                        if let Some(start) = self.element_start.take() {
                            self.emit_element(start, pos + 1, emit);
                        }
                        self.consume(pos + 1);
                    } else if depth == 0 {
                        self.in_array = false;
                        self.element_start = None;
                        self.consume(pos + 1);
                    }
                }
                _ => {}
            }
        }
    }

    fn emit_element(&mut self, start: usize, end: usize, emit: &mut dyn FnMut(&str)) {
        match serde_json::from_str::<Value>(&self.state.buffer[start..end]) {
            Ok(element) => {
                if let Some(delta) = (self.extract)(&element) {
                    self.state.push_delta(&delta, emit);
                }
            }
            Err(e) => {
                trace!(error = %e, "Skipping malformed stream element");
            }
        }
    }

    /// Drop the scanned prefix so the buffer only holds unfinished input
    fn consume(&mut self, end: usize) {
        self.state.buffer.drain(..end);
        self.cursor -= end;
        if let Some(start) = self.element_start.as_mut() {
            *start -= end;
        }
    }

    /// Close whatever is still open and try to parse it
    fn repair_tail(&self) -> Option<Value> {
        let start = self.element_start?;
        let mut candidate = self.state.buffer[start..].to_string();
        if self.in_string {
            if self.escaped {
                candidate.pop();
            }
            candidate.push('"');
        }
        let inner_depth = if self.in_array { 1 } else { 0 };
        for closer in self.closers[inner_depth..].iter().rev() {
            candidate.push(*closer as char);
        }
        serde_json::from_str(&candidate).ok()
    }
}

impl StreamDecoder for JsonArrayDecoder {
    fn feed(&mut self, chunk: &str, emit: &mut dyn FnMut(&str)) {
        self.state.buffer.push_str(chunk);
        self.scan(emit);
    }

    fn finalize(&mut self, emit: &mut dyn FnMut(&str)) -> String {
        if self.element_start.is_some() {
            match self.repair_tail() {
                Some(element) => {
                    if let Some(delta) = (self.extract)(&element) {
                        self.state.push_delta(&delta, emit);
                    }
                }
                None => {
                    debug!(
                        buffered = self.state.buffer.len(),
                        "Discarding unparseable tail of JSON stream"
                    );
                }
            }
        }

        self.state.buffer.clear();
        self.cursor = 0;
        self.closers.clear();
        self.element_start = None;
        self.in_array = false;
        self.in_string = false;
        self.escaped = false;

        self.state.emitted.clone()
    }
}
