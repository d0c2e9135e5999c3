//! ChatSession: the stateful conversation API (spec.md §4.4).

use std::sync::Arc;

use crate::error::{GenerationError, RuntimeError};
use crate::ffi::InferenceBackend;
use crate::types::{CancelToken, GenerationOptions, ModelFamily, TerminalReason, TokenChunk};
use crate::worker::WorkerHandle;

use super::json_schema::{recover_json, validate};
use super::message::{ChatMessage, Role, ToolCallRequest};
use super::summarization::{is_overflowing, summarize_or_truncate};
use super::templates::{format_prompt, template_for_family, ChatTemplate};
use super::tool_call_parser::parse_tool_calls;
use super::tools::ToolRegistry;

/// Fraction of `(context_length - reserved_response_tokens)` that triggers
/// summarization (spec.md §4.4, §8: "contextLength=128 and a prompt at 70%
/// of that triggers summarization").
const OVERFLOW_THRESHOLD: f32 = 0.70;
/// Crude chars-per-token estimate used for context-usage bookkeeping until a
/// real tokenizer count is wired through the backend (spec.md §6 doesn't
/// expose one over the trait boundary; it's a native-side concept).
const CHARS_PER_TOKEN_ESTIMATE: usize = 4;

/// A single stateful conversation against one loaded model.
pub struct ChatSession<B: InferenceBackend + 'static> {
    worker: Arc<WorkerHandle>,
    template: ChatTemplate,
    max_context_tokens: u32,
    messages: Vec<ChatMessage>,
    tools: ToolRegistry,
    turn_count: u32,
    _backend: std::marker::PhantomData<B>,
}

impl<B: InferenceBackend + 'static> ChatSession<B> {
    pub fn new(worker: Arc<WorkerHandle>, family: ModelFamily, max_context_tokens: u32) -> Self {
        Self {
            worker,
            template: template_for_family(family),
            max_context_tokens,
            messages: Vec::new(),
            tools: ToolRegistry::new(),
            turn_count: 0,
            _backend: std::marker::PhantomData,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::system(prompt));
        self
    }

    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    /// Fraction of the model's full context window currently occupied by the
    /// formatted transcript, in `[0.0, ...]` (spec.md §4.4, §6).
    pub fn context_usage(&self) -> f64 {
        let formatted_chars = format_prompt(&self.messages, self.template).len();
        (formatted_chars as f64 / CHARS_PER_TOKEN_ESTIMATE as f64) / self.max_context_tokens as f64
    }

    pub fn reset(&mut self) {
        self.messages.retain(|m| matches!(m.role, Role::System));
        self.turn_count = 0;
    }

    fn maybe_summarize(&mut self, reserved_response_tokens: u32) {
        let formatted_chars = format_prompt(&self.messages, self.template).len();
        if !is_overflowing(formatted_chars, self.max_context_tokens, reserved_response_tokens, OVERFLOW_THRESHOLD) {
            return;
        }
        let worker = self.worker.clone();
        let template = self.template;
        self.messages = summarize_or_truncate(&self.messages, |prompt, options| {
            let formatted = format_prompt(&[ChatMessage::user(prompt)], template);
            worker.start_stream(formatted, options.clone())?;
            let mut out = String::new();
            while let Some(token) = worker.next_token()? {
                out.push_str(&token);
            }
            Ok(out)
        });
    }

    fn run_turn(&self, options: &GenerationOptions) -> Result<String, RuntimeError> {
        let prompt = format_prompt(&self.messages, self.template);
        self.worker.start_stream(prompt, options.clone())?;
        let mut out = String::new();
        while let Some(token) = self.worker.next_token()? {
            out.push_str(&token);
        }
        Ok(out)
    }

    /// Sends one user turn and returns the full assistant reply (non-streaming).
    /// On any error the user message added for this turn is rolled back
    /// (spec.md §8: "the user message added during E is not present in
    /// S.messages after E returns").
    pub fn send(&mut self, user_text: impl Into<String>, options: &GenerationOptions) -> Result<String, RuntimeError> {
        self.maybe_summarize(options.max_new_tokens);
        let rollback_len = self.messages.len();
        self.messages.push(ChatMessage::user(user_text));
        match self.run_turn(options) {
            Ok(out) => {
                self.messages.push(ChatMessage::assistant(out.clone()));
                self.turn_count += 1;
                Ok(out)
            }
            Err(err) => {
                self.messages.truncate(rollback_len);
                Err(err)
            }
        }
    }

    /// Sends one user turn, pulling tokens through `on_token` as they arrive.
    /// `cancel` is checked before every pull; a cancellation stops the pull
    /// loop and emits a terminal chunk with `TerminalReason::Cancelled`. On
    /// any error the user message added for this turn is rolled back.
    pub fn send_stream(
        &mut self,
        user_text: impl Into<String>,
        options: &GenerationOptions,
        cancel: &CancelToken,
        mut on_token: impl FnMut(TokenChunk),
    ) -> Result<String, RuntimeError> {
        self.maybe_summarize(options.max_new_tokens);
        let rollback_len = self.messages.len();
        self.messages.push(ChatMessage::user(user_text));

        let prompt = format_prompt(&self.messages, self.template);
        if let Err(err) = self.worker.start_stream(prompt, options.clone()) {
            self.messages.truncate(rollback_len);
            return Err(err);
        }

        let mut out = String::new();
        let mut index = 0u32;
        loop {
            if cancel.is_cancelled() {
                return match self.worker.cancel() {
                    Ok(()) => {
                        on_token(TokenChunk::terminal(index, TerminalReason::Cancelled));
                        self.messages.push(ChatMessage::assistant(out.clone()));
                        self.turn_count += 1;
                        Ok(out)
                    }
                    Err(err) => {
                        self.messages.truncate(rollback_len);
                        Err(err)
                    }
                };
            }
            match self.worker.next_token() {
                Ok(Some(text)) => {
                    out.push_str(&text);
                    on_token(TokenChunk::token(text, index, None, false));
                    index += 1;
                }
                Ok(None) => {
                    on_token(TokenChunk::terminal(index, TerminalReason::Done));
                    break;
                }
                Err(err) => {
                    self.messages.truncate(rollback_len);
                    return Err(err);
                }
            }
        }
        self.messages.push(ChatMessage::assistant(out.clone()));
        self.turn_count += 1;
        Ok(out)
    }

    /// Sends one user turn with tool-calling enabled. Loops generate →
    /// parse-tool-calls → invoke tool → feed result back, bounded by
    /// `max_rounds` (spec.md §4.4: `send_with_tools(prompt, on_tool_call,
    /// opts, max_rounds=3)`). On any error the user message added for this
    /// turn, along with any assistant/tool-result turns from completed
    /// rounds, is rolled back.
    pub fn send_with_tools(
        &mut self,
        user_text: impl Into<String>,
        options: &GenerationOptions,
        max_rounds: u32,
        mut call_tool: impl FnMut(&ToolCallRequest) -> Result<String, RuntimeError>,
    ) -> Result<String, RuntimeError> {
        self.maybe_summarize(options.max_new_tokens);
        let rollback_len = self.messages.len();
        self.messages.push(ChatMessage::user(user_text));

        match self.run_tool_rounds(options, max_rounds, &mut call_tool) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.messages.truncate(rollback_len);
                Err(err)
            }
        }
    }

    fn run_tool_rounds(
        &mut self,
        options: &GenerationOptions,
        max_rounds: u32,
        call_tool: &mut impl FnMut(&ToolCallRequest) -> Result<String, RuntimeError>,
    ) -> Result<String, RuntimeError> {
        for _round in 0..max_rounds {
            let raw = self.run_turn(options)?;

            let (calls, remainder) = parse_tool_calls(&raw, self.template);
            if calls.is_empty() {
                self.messages.push(ChatMessage::assistant(remainder.clone()));
                self.turn_count += 1;
                return Ok(remainder);
            }

            let mut assistant_turn = ChatMessage::assistant(remainder);
            assistant_turn.tool_calls = calls.clone();
            self.messages.push(assistant_turn);

            for call in &calls {
                let result = call_tool(call)?;
                self.messages.push(ChatMessage::tool_result(call.id.clone(), result));
            }
        }
        Err(GenerationError::MaxToolRoundsExceeded.into())
    }

    /// Sends one user turn and validates the reply against `schema`,
    /// recovering malformed JSON before re-validating (spec.md §4.4
    /// "schema-constrained extraction"). `strict` rejects properties the
    /// schema doesn't declare.
    pub fn send_structured(
        &mut self,
        user_text: impl Into<String>,
        options: &GenerationOptions,
        schema: &serde_json::Value,
        strict: bool,
    ) -> Result<serde_json::Value, RuntimeError> {
        let raw = self.send(user_text, options)?;
        let value = recover_json(&raw)
            .ok_or_else(|| GenerationError::SchemaValidationFailed("no JSON object found in output".to_string()))?;
        validate(&value, schema, strict)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::backend::fake::FakeBackend;

    fn session() -> ChatSession<FakeBackend> {
        let worker = Arc::new(WorkerHandle::spawn(Arc::new(FakeBackend::new())));
        worker
            .init(
                crate::types::RuntimeConfig::new(
                    "m.gguf",
                    4,
                    2048,
                    false,
                    512,
                    crate::types::KvQuant::F16,
                    crate::types::KvQuant::F16,
                    crate::types::FlashAttentionMode::Auto,
                    None,
                    crate::types::BackendSelector::Cpu,
                )
                .unwrap(),
            )
            .unwrap();
        ChatSession::new(worker, ModelFamily::Llama3, 4096).with_system_prompt("be terse")
    }

    #[test]
    fn send_appends_user_and_assistant_turns() {
        let mut chat = session();
        let reply = chat.send("hello there", &GenerationOptions::defaults()).unwrap();
        assert!(!reply.is_empty());
        assert_eq!(chat.turn_count(), 1);
        assert_eq!(chat.messages().len(), 3); // system + user + assistant
    }

    #[test]
    fn reset_keeps_only_system_messages() {
        let mut chat = session();
        chat.send("hello there", &GenerationOptions::defaults()).unwrap();
        chat.reset();
        assert_eq!(chat.turn_count(), 0);
        assert_eq!(chat.messages().len(), 1);
    }

    #[test]
    fn send_stream_emits_a_terminal_done_chunk() {
        let mut chat = session();
        let cancel = CancelToken::new();
        let mut terminal_reasons = Vec::new();
        chat.send_stream("a b c", &GenerationOptions::defaults(), &cancel, |chunk| {
            if chunk.terminal {
                terminal_reasons.push(chunk.terminal_reason.unwrap());
            }
        })
        .unwrap();
        assert_eq!(terminal_reasons, vec![TerminalReason::Done]);
    }

    #[test]
    fn send_stream_honors_cancellation() {
        let mut chat = session();
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut terminal_reasons = Vec::new();
        chat.send_stream("a b c d e f g h i j", &GenerationOptions::defaults(), &cancel, |chunk| {
            if chunk.terminal {
                terminal_reasons.push(chunk.terminal_reason.unwrap());
            }
        })
        .unwrap();
        assert_eq!(terminal_reasons, vec![TerminalReason::Cancelled]);
    }

    #[test]
    fn send_structured_errors_when_no_json_is_produced() {
        // The fake backend echoes prompt/template words, which won't form
        // valid JSON, so structured extraction should surface a validation
        // error rather than panic.
        let mut chat = session();
        let schema = serde_json::json!({"type": "object", "properties": {}, "required": []});
        let result = chat.send_structured("describe the weather", &GenerationOptions::defaults(), &schema, false);
        assert!(result.is_err());
    }

    #[test]
    fn send_with_tools_returns_final_text_when_no_tool_call_emitted() {
        let mut chat = session();
        let reply = chat
            .send_with_tools("hello", &GenerationOptions::defaults(), 3, |_| Ok("unused".to_string()))
            .unwrap();
        assert!(!reply.is_empty());
    }

    #[test]
    fn a_failed_send_rolls_back_the_user_message() {
        let mut chat = session();
        let message_count_before = chat.messages().len();
        // Leave a stream active so the worker rejects the next start_stream
        // call with StreamAlreadyActive (spec.md §5: "at most one active
        // stream per worker").
        chat.worker.start_stream("priming".into(), GenerationOptions::defaults()).unwrap();

        let result = chat.send("hello", &GenerationOptions::defaults());

        assert!(result.is_err());
        assert_eq!(chat.messages().len(), message_count_before);
    }

    #[test]
    fn a_failed_send_with_tools_rolls_back_the_user_message() {
        let mut chat = session();
        let message_count_before = chat.messages().len();
        chat.worker.start_stream("priming".into(), GenerationOptions::defaults()).unwrap();

        let result = chat.send_with_tools("hello", &GenerationOptions::defaults(), 3, |_| Ok("unused".to_string()));

        assert!(result.is_err());
        assert_eq!(chat.messages().len(), message_count_before);
    }

    #[test]
    fn context_usage_is_a_fraction_of_the_context_window() {
        let mut chat = session();
        let before = chat.context_usage();
        assert!(before > 0.0 && before < 1.0);
        chat.send("hello there", &GenerationOptions::defaults()).unwrap();
        assert!(chat.context_usage() > before);
    }
}
