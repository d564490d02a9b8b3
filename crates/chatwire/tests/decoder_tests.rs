//! Integration tests for the stream decoders
//!
//! Every decoder must produce the same content no matter where chunk
//! boundaries fall, including boundaries inside multi-byte characters.

use serde_json::{Value, json};

use chatwire::decoder::{JsonArrayDecoder, SseDecoder, StreamDecoder, decode_all};
use chatwire::provider::{GoogleAdapter, OpenAiCompatible, ProviderAdapter};
use chatwire::testing::{openai_sse, sse_body};
use chatwire::transport::Utf8Decoder;

// =============================================================================
// Helpers
// =============================================================================

fn openai_delta(event: &Value) -> Option<String> {
    event["choices"][0]["delta"]["content"]
        .as_str()
        .map(|s| s.to_string())
}

fn text_field(element: &Value) -> Option<String> {
    element["text"].as_str().map(|s| s.to_string())
}

/// Feed `input` split at byte `at`, going through UTF-8 reassembly
fn decode_split(decoder: &mut dyn StreamDecoder, input: &str, at: usize) -> (Vec<String>, String) {
    let bytes = input.as_bytes();
    let mut text = Utf8Decoder::new();
    let mut deltas = Vec::new();
    let mut collect = |d: &str| deltas.push(d.to_string());

    decoder.feed(&text.decode(&bytes[..at]), &mut collect);
    decoder.feed(&text.decode(&bytes[at..]), &mut collect);
    decoder.feed(&text.finish(), &mut collect);
    let content = decoder.finalize(&mut collect);
    (deltas, content)
}

// =============================================================================
// SSE
// =============================================================================

#[test]
fn test_sse_two_delta_scenario() {
    let raw = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n";

    let mut decoder = SseDecoder::new(openai_delta);
    let mut deltas = Vec::new();
    decoder.feed(raw, &mut |d: &str| deltas.push(d.to_string()));
    let content = decoder.finalize(&mut |d: &str| deltas.push(d.to_string()));

    assert_eq!(deltas, vec!["Hel", "lo"]);
    assert_eq!(content, "Hello");
}

#[test]
fn test_sse_split_at_every_byte_offset() {
    let raw = openai_sse(&["Grüße", ", ", "世界", " 👋"]);
    let expected = decode_all(&mut SseDecoder::new(openai_delta), &raw);
    assert_eq!(expected.1, "Grüße, 世界 👋");

    for at in 0..=raw.len() {
        let (deltas, content) = decode_split(&mut SseDecoder::new(openai_delta), &raw, at);
        assert_eq!(content, expected.1, "split at byte {at}");
        assert_eq!(deltas.concat(), expected.1, "split at byte {at}");
    }
}

#[test]
fn test_sse_one_byte_at_a_time() {
    let raw = openai_sse(&["a", "b", "c"]);
    let mut decoder = SseDecoder::new(openai_delta);
    let mut deltas = Vec::new();
    for byte in raw.bytes() {
        let chunk = [byte];
        let text = std::str::from_utf8(&chunk).unwrap();
        decoder.feed(text, &mut |d: &str| deltas.push(d.to_string()));
    }

    assert_eq!(deltas, vec!["a", "b", "c"]);
    assert_eq!(decoder.finalize(&mut |_: &str| {}), "abc");
}

#[test]
fn test_sse_payload_with_escaped_newline() {
    let raw = sse_body(&[json!({"choices": [{"delta": {"content": "line1\nline2"}}]})]);
    let (deltas, _) = decode_all(&mut SseDecoder::new(openai_delta), &raw);
    assert_eq!(deltas, vec!["line1\nline2"]);
}

// =============================================================================
// Bracketed JSON
// =============================================================================

#[test]
fn test_json_array_split_at_every_byte_offset() {
    let raw = r#"[{"text":"a ] b"},
{"text":"\"q\" { [ \\"},
{"text":"ünïcødé"},
{"other":{"nested":[1,2,{"x":"]"}]},"text":"!"}]"#;

    let expected = decode_all(&mut JsonArrayDecoder::new(text_field), raw);
    assert_eq!(expected.0, vec!["a ] b", "\"q\" { [ \\", "ünïcødé", "!"]);

    for at in 0..=raw.len() {
        let (deltas, content) = decode_split(&mut JsonArrayDecoder::new(text_field), raw, at);
        assert_eq!(deltas, expected.0, "split at byte {at}");
        assert_eq!(content, expected.1, "split at byte {at}");
    }
}

#[test]
fn test_json_array_incomplete_keeps_buffering() {
    let mut decoder = JsonArrayDecoder::new(text_field);
    let mut deltas = Vec::new();
    decoder.feed("[{\"text\":\"one\"", &mut |d: &str| deltas.push(d.to_string()));
    assert!(deltas.is_empty());

    decoder.feed("}", &mut |d: &str| deltas.push(d.to_string()));
    assert_eq!(deltas, vec!["one"]);
}

#[test]
fn test_google_stream_split_everywhere() {
    let raw = r#"[{"candidates": [{"content": {"parts": [{"text": "The answer"}],"role": "model"},"index": 0}]}
,{"candidates": [{"content": {"parts": [{"text": " is [42]"}],"role": "model"},"finishReason": "STOP","index": 0}],"usageMetadata": {"promptTokenCount": 4}}
]"#;

    for at in 0..=raw.len() {
        let mut decoder = GoogleAdapter.stream_decoder();
        let (_, content) = decode_split(decoder.as_mut(), raw, at);
        assert_eq!(content, "The answer is [42]", "split at byte {at}");
    }
}

#[test]
fn test_adapter_decoders_are_independent() {
    let raw = openai_sse(&["x"]);
    let adapter = OpenAiCompatible::openai();

    let mut first = adapter.stream_decoder();
    let mut second = adapter.stream_decoder();
    first.feed(&raw, &mut |_: &str| {});

    assert_eq!(first.finalize(&mut |_: &str| {}), "x");
    assert_eq!(second.finalize(&mut |_: &str| {}), "");
}
