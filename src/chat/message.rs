//! Chat message and role types (spec.md §4.4).

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    /// A synthetic role inserted by automatic context-overflow
    /// summarization, replacing the messages it folds (spec.md §4.4, §8).
    Summary,
}

/// One turn of a conversation transcript.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Set on `Role::Tool` messages: which tool call this is a result for.
    pub tool_call_id: Option<String>,
    /// Set on `Role::Assistant` messages that invoke tools.
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), tool_call_id: None, tool_calls: Vec::new() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), tool_call_id: None, tool_calls: Vec::new() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), tool_call_id: None, tool_calls: Vec::new() }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn summary(content: impl Into<String>) -> Self {
        Self { role: Role::Summary, content: content.into(), tool_call_id: None, tool_calls: Vec::new() }
    }
}

/// A tool invocation the model emitted inside an assistant turn, parsed from
/// whatever wire format that model family uses (spec.md §4.4 "tool call
/// parsing").
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}
