//! Per-model-family prompt formatting (spec.md §4.4).
//!
//! Grounded on the teacher's `apply_model_chat_template` in
//! `src/web/chat/templates.rs`: a `match` over a template-type string, each
//! arm building turn markers from a parsed transcript. The teacher's universal
//! `<||SYSTEM.EXEC>` tool-prompt injection is teacher-specific product text,
//! not part of the wire format, and is dropped here; everything else — the
//! five concrete marker formats below — is that same dispatch shape
//! generalized from the teacher's `ModelFamily` equivalent.

use crate::types::ModelFamily;

use super::message::{ChatMessage, Role};

/// Which wire format a model family expects its prompt formatted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTemplate {
    Llama3Instruct,
    ChatMl,
    Qwen3,
    Gemma3,
    Generic,
}

pub fn template_for_family(family: ModelFamily) -> ChatTemplate {
    match family {
        ModelFamily::Llama3 => ChatTemplate::Llama3Instruct,
        ModelFamily::Qwen3 => ChatTemplate::Qwen3,
        ModelFamily::Gemma2 | ModelFamily::SmolVlm => ChatTemplate::Gemma3,
        ModelFamily::Phi3 | ModelFamily::TinyLlama => ChatTemplate::ChatMl,
        ModelFamily::Whisper | ModelFamily::MiniLm => ChatTemplate::Generic,
    }
}

/// Renders a full transcript into the wire-format prompt string, ending with
/// the assistant turn marker so the model continues from there.
pub fn format_prompt(messages: &[ChatMessage], template: ChatTemplate) -> String {
    match template {
        ChatTemplate::Llama3Instruct => format_llama3(messages),
        ChatTemplate::ChatMl => format_chatml(messages),
        ChatTemplate::Qwen3 => format_qwen3(messages),
        ChatTemplate::Gemma3 => format_gemma3(messages),
        ChatTemplate::Generic => format_generic(messages),
    }
}

fn role_marker_chatml(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
        Role::Summary => "system",
    }
}

/// `Role::Summary` content is rendered with a "Previous conversation
/// summary: " prefix so the model can tell it apart from an authored system
/// prompt (spec.md §6: "Role summary renders as a system turn prefixed
/// `Previous conversation summary: `").
fn summary_marked_content(message: &ChatMessage) -> String {
    if message.role == Role::Summary {
        format!("Previous conversation summary: {}", message.content)
    } else {
        message.content.clone()
    }
}

fn format_llama3(messages: &[ChatMessage]) -> String {
    let mut out = String::from("<|begin_of_text|>");
    for message in messages {
        let role = role_marker_chatml(message.role);
        out.push_str(&format!("<|start_header_id|>{role}<|end_header_id|>\n\n{}<|eot_id|>", summary_marked_content(message)));
    }
    out.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    out
}

fn format_chatml(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        let role = role_marker_chatml(message.role);
        out.push_str(&format!("<|im_start|>{role}\n{}<|im_end|>\n", summary_marked_content(message)));
    }
    out.push_str("<|im_start|>assistant\n");
    out
}

/// Qwen3 shares ChatML turn markers but wraps tool-call content in
/// `<tool_call>`/`<tool_response>` tags instead of a bare `tool` role turn
/// (spec.md §4.4 "qwen3 XML tags").
fn format_qwen3(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        match message.role {
            Role::Tool => {
                out.push_str(&format!(
                    "<|im_start|>user\n<tool_response>\n{}\n</tool_response><|im_end|>\n",
                    message.content
                ));
            }
            _ if !message.tool_calls.is_empty() => {
                out.push_str("<|im_start|>assistant\n");
                for call in &message.tool_calls {
                    out.push_str(&format!(
                        "<tool_call>\n{{\"name\": \"{}\", \"arguments\": {}}}\n</tool_call>\n",
                        call.name, call.arguments
                    ));
                }
                out.push_str("<|im_end|>\n");
            }
            Role::Summary => {
                out.push_str(&format!("<|im_start|>system\n{}<|im_end|>\n", summary_marked_content(message)));
            }
            role => {
                let marker = role_marker_chatml(role);
                out.push_str(&format!("<|im_start|>{marker}\n{}<|im_end|>\n", message.content));
            }
        }
    }
    out.push_str("<|im_start|>assistant\n");
    out
}

/// Gemma's two-role format: everything non-model (system, user, tool,
/// summary) folds into `user` turns, since gemma has no distinct system role.
fn format_gemma3(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        let marker = match message.role {
            Role::Assistant => "model",
            Role::System | Role::User | Role::Tool | Role::Summary => "user",
        };
        out.push_str(&format!("<start_of_turn>{marker}\n{}<end_of_turn>\n", summary_marked_content(message)));
    }
    out.push_str("<start_of_turn>model\n");
    out
}

fn format_generic(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        let marker = match message.role {
            Role::System => "SYSTEM",
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
            Role::Tool => "TOOL",
            Role::Summary => "SYSTEM",
        };
        out.push_str(&format!("{marker}: {}\n", summary_marked_content(message)));
    }
    out.push_str("ASSISTANT:");
    out
}
