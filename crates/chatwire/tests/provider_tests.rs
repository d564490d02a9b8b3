//! Integration tests for the provider adapters
//!
//! Each adapter runs a full completion against a wiremock server standing in
//! for the provider's HTTP API, in streaming and non-streaming mode.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

use chatwire::ChatwireError;
use chatwire::config::ProxyConfig;
use chatwire::provider::{
    AnthropicAdapter, ChatOptions, CompletionRequest, GoogleAdapter, OllamaAdapter,
    OpenAiCompatible, ProviderAdapter, ProviderConfig, ProviderId, ProviderRegistry,
};
use chatwire::proxy::{ProxyBridge, ProxyExecutor, link};
use chatwire::testing::{ScriptedTransport, openai_sse, sse_body};
use chatwire::transport::{DirectTransport, Transport};

// =============================================================================
// Test Fixtures
// =============================================================================

fn direct() -> DirectTransport {
    DirectTransport::new(&ProxyConfig::default()).unwrap()
}

/// Run one completion, returning the deltas seen and the final content
async fn run(
    adapter: &dyn ProviderAdapter,
    transport: &dyn Transport,
    config: &ProviderConfig,
    options: &ChatOptions,
) -> Result<(Vec<String>, String), ChatwireError> {
    let mut deltas = Vec::new();
    let content = adapter
        .complete(
            transport,
            CompletionRequest {
                content: "Hello",
                options,
                config,
                cancel: CancellationToken::new(),
            },
            &mut |d: &str| deltas.push(d.to_string()),
        )
        .await?;
    Ok((deltas, content))
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

// =============================================================================
// OpenAI-compatible
// =============================================================================

#[tokio::test]
async fn test_openai_streaming() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/chat/completions"))
        .and(matchers::header("Authorization", "Bearer sk-test"))
        .and(matchers::body_partial_json(json!({"stream": true, "model": "gpt-4o-mini"})))
        .respond_with(sse_response(openai_sse(&["Hel", "lo"])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = ProviderConfig::new(format!("{}/v1", mock_server.uri())).with_api_key("sk-test");
    let (deltas, content) = run(
        &OpenAiCompatible::openai(),
        &direct(),
        &config,
        &ChatOptions::new("gpt-4o-mini"),
    )
    .await
    .unwrap();

    assert_eq!(deltas, vec!["Hel", "lo"]);
    assert_eq!(content, "Hello");
}

#[tokio::test]
async fn test_openai_non_streaming() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/chat/completions"))
        .and(matchers::body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Full reply"}}]
        })))
        .mount(&mock_server)
        .await;

    let config = ProviderConfig::new(format!("{}/v1", mock_server.uri())).with_api_key("sk-test");
    let mut options = ChatOptions::new("gpt-4o-mini");
    options.stream = false;

    let (deltas, content) = run(&OpenAiCompatible::openai(), &direct(), &config, &options)
        .await
        .unwrap();

    assert_eq!(deltas, vec!["Full reply"]);
    assert_eq!(content, "Full reply");
}

#[tokio::test]
async fn test_openrouter_sends_attribution_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/api/v1/chat/completions"))
        .and(matchers::header("X-Title", "Chatwire"))
        .and(matchers::body_partial_json(json!({"max_tokens": 2048})))
        .respond_with(sse_response(openai_sse(&["ok"])))
        .mount(&mock_server)
        .await;

    let config =
        ProviderConfig::new(format!("{}/api/v1", mock_server.uri())).with_api_key("or-key");
    let (_, content) = run(
        &OpenAiCompatible::openrouter(),
        &direct(),
        &config,
        &ChatOptions::new("openai/gpt-4-turbo"),
    )
    .await
    .unwrap();

    assert_eq!(content, "ok");
}

#[tokio::test]
async fn test_error_payload_message() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&mock_server)
        .await;

    let config = ProviderConfig::new(mock_server.uri()).with_api_key("bad");
    let err = run(
        &OpenAiCompatible::mistral(),
        &direct(),
        &config,
        &ChatOptions::new("mistral-small-latest"),
    )
    .await
    .unwrap_err();

    match err {
        ChatwireError::Provider { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_error_string_payload_and_status_fallback() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/a/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"error": "Rate limited"})))
        .mount(&mock_server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/b/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let options = ChatOptions::new("m");
    let adapter = OpenAiCompatible::openrouter();

    let config_a = ProviderConfig::new(format!("{}/a", mock_server.uri())).with_api_key("k");
    let err = run(&adapter, &direct(), &config_a, &options).await.unwrap_err();
    assert!(matches!(
        err,
        ChatwireError::Provider { status: 429, ref message } if message == "Rate limited"
    ));

    let config_b = ProviderConfig::new(format!("{}/b", mock_server.uri())).with_api_key("k");
    let err = run(&adapter, &direct(), &config_b, &options).await.unwrap_err();
    assert!(matches!(
        err,
        ChatwireError::Provider { status: 500, ref message } if message == "Internal Server Error"
    ));
}

// =============================================================================
// Anthropic
// =============================================================================

#[tokio::test]
async fn test_anthropic_streaming() {
    let mock_server = MockServer::start().await;

    let body = {
        let mut body = String::from("event: message_start\n");
        body.push_str(&sse_body(&[
            json!({"type": "message_start", "message": {"id": "msg_1", "content": []}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Bonjour"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": " !"}}),
            json!({"type": "message_stop"}),
        ]));
        body
    };

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/messages"))
        .and(matchers::header("x-api-key", "sk-ant"))
        .and(matchers::header("anthropic-version", "2023-06-01"))
        .and(matchers::body_partial_json(json!({"max_tokens": 1024, "stream": true})))
        .respond_with(sse_response(body))
        .mount(&mock_server)
        .await;

    let config = ProviderConfig::new(format!("{}/v1", mock_server.uri())).with_api_key("sk-ant");
    let (deltas, content) = run(
        &AnthropicAdapter,
        &direct(),
        &config,
        &ChatOptions::new("claude-3-haiku-20240307"),
    )
    .await
    .unwrap();

    assert_eq!(deltas, vec!["Bonjour", " !"]);
    assert_eq!(content, "Bonjour !");
}

#[tokio::test]
async fn test_anthropic_non_streaming() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "content": [{"type": "text", "text": "Plain answer"}]
        })))
        .mount(&mock_server)
        .await;

    let config = ProviderConfig::new(format!("{}/v1", mock_server.uri())).with_api_key("sk-ant");
    let mut options = ChatOptions::new("claude-3-haiku-20240307");
    options.stream = false;

    let (_, content) = run(&AnthropicAdapter, &direct(), &config, &options)
        .await
        .unwrap();
    assert_eq!(content, "Plain answer");
}

// =============================================================================
// Google
// =============================================================================

#[tokio::test]
async fn test_google_streaming() {
    let mock_server = MockServer::start().await;

    let body = r#"[{"candidates": [{"content": {"parts": [{"text": "Un"}],"role": "model"}}]}
,{"candidates": [{"content": {"parts": [{"text": "o, dos"}],"role": "model"}}]}
,{"candidates": [{"content": {"parts": [{"text": " [tres]"}],"role": "model"},"finishReason": "STOP"}]}
]"#;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1beta/models/gemini-1.5-flash:streamGenerateContent"))
        .and(matchers::header("x-goog-api-key", "g-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "application/json"),
        )
        .mount(&mock_server)
        .await;

    let config =
        ProviderConfig::new(format!("{}/v1beta", mock_server.uri())).with_api_key("g-key");
    let (deltas, content) = run(
        &GoogleAdapter,
        &direct(),
        &config,
        &ChatOptions::new("gemini-1.5-flash"),
    )
    .await
    .unwrap();

    assert_eq!(deltas, vec!["Un", "o, dos", " [tres]"]);
    assert_eq!(content, "Uno, dos [tres]");
}

#[tokio::test]
async fn test_google_non_streaming() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "Hola"}], "role": "model"}}]
        })))
        .mount(&mock_server)
        .await;

    let config =
        ProviderConfig::new(format!("{}/v1beta", mock_server.uri())).with_api_key("g-key");
    let mut options = ChatOptions::new("gemini-1.5-flash");
    options.stream = false;

    let (_, content) = run(&GoogleAdapter, &direct(), &config, &options)
        .await
        .unwrap();
    assert_eq!(content, "Hola");
}

#[tokio::test]
async fn test_google_array_wrapped_error() {
    let mock_server = MockServer::start().await;

    let body = r#"[{
  "error": {
    "code": 400,
    "message": "API key not valid. Please pass a valid API key.",
    "status": "INVALID_ARGUMENT"
  }
}
]"#;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1beta/models/gemini-1.5-flash:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(400).set_body_raw(body, "application/json"))
        .mount(&mock_server)
        .await;

    let config =
        ProviderConfig::new(format!("{}/v1beta", mock_server.uri())).with_api_key("bad-key");
    let err = run(
        &GoogleAdapter,
        &direct(),
        &config,
        &ChatOptions::new("gemini-1.5-flash"),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        ChatwireError::Provider { status: 400, ref message }
            if message == "API key not valid. Please pass a valid API key."
    ));
}

// =============================================================================
// Ollama
// =============================================================================

#[tokio::test]
async fn test_ollama_streaming_ndjson() {
    let mock_server = MockServer::start().await;

    let body = "{\"response\":\"Why\",\"done\":false}\n{\"response\":\" not\",\"done\":false}\n{\"response\":\"\",\"done\":true}\n";

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/api/generate"))
        .and(matchers::body_partial_json(json!({"model": "llama2", "prompt": "Hello"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"),
        )
        .mount(&mock_server)
        .await;

    let config = ProviderConfig::new(mock_server.uri());
    let (deltas, content) = run(&OllamaAdapter, &direct(), &config, &ChatOptions::new("llama2"))
        .await
        .unwrap();

    assert_eq!(deltas, vec!["Why", " not"]);
    assert_eq!(content, "Why not");
}

// =============================================================================
// Through the proxy relay
// =============================================================================

#[tokio::test]
async fn test_adapter_through_proxy_relay() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/chat/completions"))
        .respond_with(sse_response(openai_sse(&["via", " relay"])))
        .mount(&mock_server)
        .await;

    let (connector, listener) = link();
    let executor = Arc::new(ProxyExecutor::new(Arc::new(direct())));
    tokio::spawn(executor.serve(listener));
    let bridge = ProxyBridge::new(Arc::new(connector));

    let config = ProviderConfig::new(format!("{}/v1", mock_server.uri())).with_api_key("sk");
    let (deltas, content) = run(
        &OpenAiCompatible::openai(),
        &bridge,
        &config,
        &ChatOptions::new("gpt-4o-mini"),
    )
    .await
    .unwrap();

    assert_eq!(deltas, vec!["via", " relay"]);
    assert_eq!(content, "via relay");
}

// =============================================================================
// Registry and scripted transport
// =============================================================================

#[tokio::test]
async fn test_registry_adapters_build_expected_urls() {
    let registry = ProviderRegistry::with_defaults();
    let transport = ScriptedTransport::new().with_body("[]");

    for id in [ProviderId::Google, ProviderId::Ollama] {
        let adapter = registry.get(id).unwrap();
        let config = ProviderConfig::new(id.default_base_url()).with_api_key("k");
        let (_, content) = run(adapter.as_ref(), &transport, &config, &ChatOptions::new("m"))
            .await
            .unwrap();
        assert_eq!(content, "");
    }

    let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(
        urls,
        vec![
            "https://generativelanguage.googleapis.com/v1beta/models/m:streamGenerateContent",
            "http://localhost:11434/api/generate",
        ]
    );
}
