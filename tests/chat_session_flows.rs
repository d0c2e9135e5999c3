//! End-to-end chat session flows against the in-memory fake backend: a
//! streamed turn that gets cancelled mid-flight, and schema-constrained
//! extraction (success and strict-mode rejection) driven through
//! `ChatSession` rather than the `json_schema` unit tests directly.

use std::sync::Arc;

use edge_veda_runtime::chat::ChatSession;
use edge_veda_runtime::ffi::backend::fake::FakeBackend;
use edge_veda_runtime::types::{
    BackendSelector, CancelToken, FlashAttentionMode, GenerationOptions, KvQuant, ModelFamily,
    RuntimeConfig, TerminalReason,
};
use edge_veda_runtime::worker::WorkerHandle;

fn spawn_session(family: ModelFamily) -> ChatSession<FakeBackend> {
    let worker = Arc::new(WorkerHandle::spawn(Arc::new(FakeBackend::new())));
    worker
        .init(
            RuntimeConfig::new(
                "m.gguf",
                4,
                4096,
                false,
                512,
                KvQuant::F16,
                KvQuant::F16,
                FlashAttentionMode::Auto,
                None,
                BackendSelector::Cpu,
            )
            .unwrap(),
        )
        .unwrap();
    ChatSession::new(worker, family, 8192)
}

#[test]
fn cancelling_mid_stream_stops_the_pull_loop_and_records_the_turn() {
    let mut chat = spawn_session(ModelFamily::Llama3).with_system_prompt("be terse");
    let cancel = CancelToken::new();
    let options = GenerationOptions::new(64, 0.8, 0.95, 40, 1.1, vec![], None, None).unwrap();

    let mut tokens_seen = 0u32;
    let cancel_after = 3;
    let reply = chat
        .send_stream("one two three four five six seven eight", &options, &cancel, |chunk| {
            if !chunk.terminal {
                tokens_seen += 1;
                if tokens_seen == cancel_after {
                    cancel.cancel();
                }
            } else {
                assert_eq!(chunk.terminal_reason, Some(TerminalReason::Cancelled));
            }
        })
        .unwrap();

    assert!(cancel.is_cancelled());
    assert!(!reply.is_empty());
    // The assistant's (partial) turn is still recorded in the transcript.
    assert_eq!(chat.turn_count(), 1);
}

#[test]
fn structured_extraction_recovers_json_the_backend_echoed_back() {
    let mut chat = spawn_session(ModelFamily::Qwen3);
    let schema = serde_json::json!({
        "type": "object",
        "properties": { "name": {"type": "string"}, "age": {"type": "integer"} },
        "required": ["name", "age"]
    });
    let options = GenerationOptions::new(256, 0.8, 0.95, 40, 1.1, vec![], None, None).unwrap();

    // The fake backend echoes whitespace-split words from the formatted
    // prompt, cycling until max_tokens; a single no-whitespace JSON token
    // survives that round trip intact and `recover_json` pulls it back out
    // of the echoed stream.
    let value = chat
        .send_structured(r#"{"name":"Ada","age":30}"#, &options, &schema, false)
        .unwrap();
    assert_eq!(value["name"], "Ada");
    assert_eq!(value["age"], 30);
}

#[test]
fn strict_mode_rejects_a_property_the_schema_never_declared() {
    let mut chat = spawn_session(ModelFamily::Qwen3);
    let schema = serde_json::json!({
        "type": "object",
        "properties": { "name": {"type": "string"} },
        "required": ["name"]
    });
    let options = GenerationOptions::new(256, 0.8, 0.95, 40, 1.1, vec![], None, None).unwrap();

    let result = chat.send_structured(r#"{"name":"Ada","extra":true}"#, &options, &schema, true);
    assert!(result.is_err());
}
