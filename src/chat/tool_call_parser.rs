//! Tool-call extraction from raw model output (spec.md §4.4).
//!
//! Grounded on the teacher's `src/web/chat/tool_tags.rs`
//! (`get_tool_tags_for_model`, per-model tag overrides) and
//! `src/web/chat/stop_conditions.rs` (`ExecBlockTracker`'s incremental scan
//! for a closing marker): qwen3 emits `<tool_call>{json}</tool_call>` blocks,
//! gemma3 emits a bare JSON object with a `"tool_call"` key, everything else
//! falls back to scanning for the first top-level JSON object in the output.

use super::message::ToolCallRequest;
use super::templates::ChatTemplate;

/// Extracts zero or more tool calls from one assistant turn's raw text,
/// along with the text with those tool-call spans removed (the
/// human-visible remainder, if any).
pub fn parse_tool_calls(text: &str, template: ChatTemplate) -> (Vec<ToolCallRequest>, String) {
    match template {
        ChatTemplate::Qwen3 => parse_qwen3_tags(text),
        ChatTemplate::Gemma3 => parse_gemma3_json(text),
        _ => parse_generic_json(text),
    }
}

fn parse_qwen3_tags(text: &str) -> (Vec<ToolCallRequest>, String) {
    const OPEN: &str = "<tool_call>";
    const CLOSE: &str = "</tool_call>";
    let mut calls = Vec::new();
    let mut remainder = String::new();
    let mut cursor = 0;
    let mut next_id = 0u32;

    while let Some(start) = text[cursor..].find(OPEN) {
        let abs_start = cursor + start;
        remainder.push_str(&text[cursor..abs_start]);
        let body_start = abs_start + OPEN.len();
        let Some(end) = text[body_start..].find(CLOSE) else {
            // Unterminated block: treat the rest as plain text, stop scanning.
            remainder.push_str(&text[abs_start..]);
            cursor = text.len();
            break;
        };
        let body = text[body_start..body_start + end].trim();
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
            if let Some(name) = parsed.get("name").and_then(|v| v.as_str()) {
                calls.push(ToolCallRequest {
                    id: format!("call-{next_id}"),
                    name: name.to_string(),
                    arguments: parsed.get("arguments").cloned().unwrap_or(serde_json::json!({})),
                });
                next_id += 1;
            }
        }
        cursor = body_start + end + CLOSE.len();
    }
    remainder.push_str(&text[cursor..]);
    (calls, remainder.trim().to_string())
}

fn parse_gemma3_json(text: &str) -> (Vec<ToolCallRequest>, String) {
    let Some(value) = find_first_json_object(text) else {
        return (Vec::new(), text.to_string());
    };
    if let Some(tool_call) = value.get("tool_call") {
        if let Some(name) = tool_call.get("name").and_then(|v| v.as_str()) {
            let call = ToolCallRequest {
                id: "call-0".to_string(),
                name: name.to_string(),
                arguments: tool_call.get("arguments").cloned().unwrap_or(serde_json::json!({})),
            };
            return (vec![call], String::new());
        }
    }
    (Vec::new(), text.to_string())
}

fn parse_generic_json(text: &str) -> (Vec<ToolCallRequest>, String) {
    let Some(value) = find_first_json_object(text) else {
        return (Vec::new(), text.to_string());
    };
    if let (Some(name), arguments) = (
        value.get("name").and_then(|v| v.as_str()),
        value.get("arguments").cloned().unwrap_or(serde_json::json!({})),
    ) {
        let call = ToolCallRequest { id: "call-0".to_string(), name: name.to_string(), arguments };
        return (vec![call], String::new());
    }
    (Vec::new(), text.to_string())
}

/// Scans for the first balanced `{...}` span and tries to parse it as JSON.
/// Brace-depth counting ignores braces inside string literals so a
/// tool-argument string containing `}` doesn't end the scan early.
fn find_first_json_object(text: &str) -> Option<serde_json::Value> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return serde_json::from_str(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}
