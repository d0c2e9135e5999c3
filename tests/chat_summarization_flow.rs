//! Driving `ChatSession` past its context budget: once estimated usage
//! crosses the overflow threshold, the next turn summarizes the older
//! transcript instead of growing it forever.

use std::sync::Arc;

use edge_veda_runtime::chat::{ChatSession, Role};
use edge_veda_runtime::ffi::backend::fake::FakeBackend;
use edge_veda_runtime::types::{
    BackendSelector, FlashAttentionMode, GenerationOptions, KvQuant, ModelFamily, RuntimeConfig,
};
use edge_veda_runtime::worker::WorkerHandle;

#[test]
fn a_long_running_conversation_gets_summarized_instead_of_growing_unbounded() {
    let worker = Arc::new(WorkerHandle::spawn(Arc::new(FakeBackend::new())));
    worker
        .init(
            RuntimeConfig::new(
                "m.gguf",
                4,
                // A small context window makes the overflow threshold easy to
                // cross with a handful of turns.
                512,
                false,
                256,
                KvQuant::F16,
                KvQuant::F16,
                FlashAttentionMode::Auto,
                None,
                BackendSelector::Cpu,
            )
            .unwrap(),
        )
        .unwrap();

    let mut chat = ChatSession::<FakeBackend>::new(worker, ModelFamily::TinyLlama, 512)
        .with_system_prompt("be terse");
    let options = GenerationOptions::defaults();

    let long_turn = "the quick brown fox jumps over the lazy dog ".repeat(20);
    for _ in 0..6 {
        chat.send(long_turn.clone(), &options).unwrap();
    }

    // Six raw turns would otherwise leave 1 (system) + 12 (6 user/assistant
    // pairs) = 13 messages in the transcript; summarization caps it at the
    // leading system messages plus one summary plus the recent tail.
    assert_eq!(chat.messages().first().unwrap().role, Role::System);
    assert!(chat.messages().len() < 13, "transcript should have been collapsed by summarization");
    assert!(chat.messages().iter().any(|m| m.role == Role::Summary), "a summary turn should have been inserted");
}
