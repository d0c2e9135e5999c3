//! Chat session: templates, tool calling, structured output, summarization
//! (spec.md §4.4).

pub mod json_schema;
pub mod message;
pub mod session;
pub mod summarization;
pub mod templates;
pub mod tool_call_parser;
pub mod tools;

pub use message::{ChatMessage, Role, ToolCallRequest};
pub use session::ChatSession;
pub use templates::{format_prompt, template_for_family, ChatTemplate};
pub use tool_call_parser::parse_tool_calls;
pub use tools::{ToolDefinition, ToolRegistry};
