//! Tool/function definitions and registry (spec.md §4.4 "tool calling").

use crate::error::{ConfigError, RuntimeError};

/// A single callable tool, described to the model as JSON Schema.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
    ) -> Result<Self, RuntimeError> {
        let name = name.into();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::InvalidToolName(name).into());
        }
        Ok(Self { name, description: description.into(), parameters_schema })
    }
}

/// A caller-populated set of tools available to a session. Kept as a plain
/// ordered list rather than a map — tool count per session is small and
/// system-prompt construction needs stable ordering (spec.md §4.4's
/// per-format "system prompt construction" step).
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: ToolDefinition) {
        self.tools.retain(|existing| existing.name != tool.name);
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_tool_names_with_invalid_characters() {
        assert!(ToolDefinition::new("get-weather", "", serde_json::json!({})).is_err());
        assert!(ToolDefinition::new("get_weather", "", serde_json::json!({})).is_ok());
    }

    #[test]
    fn registering_the_same_name_twice_replaces_it() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDefinition::new("ping", "first", serde_json::json!({})).unwrap());
        registry.register(ToolDefinition::new("ping", "second", serde_json::json!({})).unwrap());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("ping").unwrap().description, "second");
    }
}
