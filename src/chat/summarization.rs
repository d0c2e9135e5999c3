//! Context-overflow handling: summarize, falling back to truncate
//! (spec.md §4.4 "summarization on overflow").
//!
//! Grounded on the teacher's `warmup_system_prompt` in
//! `src/web/chat/generation.rs`: build a prompt, submit it to the same
//! loaded model, low temperature, a bounded token count, and treat the
//! result as trusted context for subsequent turns. Summarization here is
//! the same shape — a bounded, low-temperature self-call — applied to the
//! overflowing transcript instead of a fixed system prompt.

use crate::error::RuntimeError;
use crate::types::GenerationOptions;

use super::message::{ChatMessage, Role};

const SUMMARY_MAX_TOKENS: u32 = 256;
const SUMMARY_TEMPERATURE: f32 = 0.2;
/// Keep this many of the most recent non-system messages verbatim; only the
/// older ones are folded into the summary.
const KEEP_RECENT_MESSAGES: usize = 4;

/// True once the formatted prompt's estimated token count has crossed
/// `threshold * (max_context_tokens - reserved_response_tokens)` (spec.md
/// §4.4, §8: "contextLength=128 and a prompt at 70% of that triggers
/// summarization").
pub fn is_overflowing(formatted_prompt_chars: usize, max_context_tokens: u32, reserved_response_tokens: u32, threshold: f32) -> bool {
    const CHARS_PER_TOKEN_ESTIMATE: usize = 4;
    let usable_tokens = (max_context_tokens as i64 - reserved_response_tokens as i64).max(0) as f64;
    let used_tokens = (formatted_prompt_chars / CHARS_PER_TOKEN_ESTIMATE) as f64;
    used_tokens > usable_tokens * threshold as f64
}

/// Collapses the oldest messages (keeping the leading system message, if
/// any, and the most recent `KEEP_RECENT_MESSAGES`) into one summary
/// assistant turn, generated by calling back into the model. On generation
/// failure, falls back to a plain truncation that just drops the oldest
/// messages with no summary, so a call to this function never fails outright
/// — only degrades in quality.
pub fn summarize_or_truncate(
    messages: &[ChatMessage],
    generate: impl FnOnce(&str, &GenerationOptions) -> Result<String, RuntimeError>,
) -> Vec<ChatMessage> {
    let (system, rest) = split_system_prefix(messages);
    if rest.len() <= KEEP_RECENT_MESSAGES {
        return messages.to_vec();
    }
    let split_at = rest.len() - KEEP_RECENT_MESSAGES;
    let (to_summarize, recent) = rest.split_at(split_at);

    let prompt = build_summary_prompt(to_summarize);
    let options = GenerationOptions {
        max_new_tokens: SUMMARY_MAX_TOKENS,
        temperature: SUMMARY_TEMPERATURE,
        top_p: 1.0,
        top_k: 40,
        repeat_penalty: 1.0,
        stop_sequences: Vec::new(),
        grammar: None,
        confidence_threshold: None,
    };

    let mut out = Vec::new();
    out.extend(system.iter().cloned());
    match generate(&prompt, &options) {
        Ok(summary) => {
            out.push(ChatMessage::summary(summary));
            out.extend(recent.iter().cloned());
        }
        Err(_) => {
            out.extend(recent.iter().cloned());
        }
    }
    out
}

fn split_system_prefix(messages: &[ChatMessage]) -> (&[ChatMessage], &[ChatMessage]) {
    let split = messages.iter().take_while(|m| matches!(m.role, Role::System)).count();
    messages.split_at(split)
}

fn build_summary_prompt(messages: &[ChatMessage]) -> String {
    let mut out = String::from(
        "Summarize the following conversation in a few sentences, preserving any facts the \
         assistant will need later:\n\n",
    );
    for message in messages {
        let marker = match message.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
            Role::Summary => "Summary",
        };
        out.push_str(&format!("{marker}: {}\n", message.content));
    }
    out
}
