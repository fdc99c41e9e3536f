//! Tool name prefixing for requests sent upstream.
//!
//! The upstream API expects every client-defined tool to live under a fixed
//! namespace prefix. Three places in a messages request reference tool names:
//! the `tools` list, a forced `tool_choice`, and `tool_use` blocks replayed in
//! the conversation history. All three are rewritten in that order.

use serde_json::{Map, Value};

use crate::constants::{DEFAULT_TOOL_PREFIX, NAME_KEY};

/// A tool-name namespace prefix together with the byte pattern used to strip
/// it from response bodies.
///
/// Both representations are derived from the same string so the request-side
/// rewrite and the response-side strip cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPrefix {
    prefix: String,
    needle: Vec<u8>,
}

impl ToolPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let needle = [NAME_KEY.as_bytes(), prefix.as_bytes()].concat();
        Self { prefix, needle }
    }

    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// `"name":"` immediately followed by the prefix.
    pub fn needle(&self) -> &[u8] {
        &self.needle
    }

    /// Prepend the prefix to a tool name.
    pub fn apply(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

impl Default for ToolPrefix {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_PREFIX)
    }
}

/// Rewrite the string `name` field of a JSON object. Returns false when the
/// field is missing or not a string.
fn prefix_name_field(obj: &mut Map<String, Value>, prefix: &ToolPrefix) -> bool {
    match obj.get_mut("name") {
        Some(Value::String(name)) => {
            *name = prefix.apply(name);
            true
        }
        _ => false,
    }
}

/// Prefix the name of every tool definition in `tools`.
pub fn prefix_tools(body: &mut Value, prefix: &ToolPrefix) -> usize {
    let Some(tools) = body.get_mut("tools").and_then(Value::as_array_mut) else {
        return 0;
    };

    tools
        .iter_mut()
        .filter_map(Value::as_object_mut)
        .map(|tool| prefix_name_field(tool, prefix))
        .filter(|&rewritten| rewritten)
        .count()
}

/// Prefix `tool_choice.name` when the choice forces a specific tool.
/// `auto`, `any` and `none` choices carry no tool name worth touching.
pub fn prefix_tool_choice(body: &mut Value, prefix: &ToolPrefix) -> usize {
    let Some(choice) = body.get_mut("tool_choice").and_then(Value::as_object_mut) else {
        return 0;
    };

    if choice.get("type").and_then(Value::as_str) != Some("tool") {
        return 0;
    }

    usize::from(prefix_name_field(choice, prefix))
}

/// Prefix the name of every `tool_use` block in the message history.
pub fn prefix_tool_use_blocks(body: &mut Value, prefix: &ToolPrefix) -> usize {
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return 0;
    };

    let mut rewritten = 0;
    for message in messages.iter_mut() {
        let Some(content) = message.get_mut("content").and_then(Value::as_array_mut) else {
            continue;
        };

        for block in content.iter_mut().filter_map(Value::as_object_mut) {
            if block.get("type").and_then(Value::as_str) == Some("tool_use")
                && prefix_name_field(block, prefix)
            {
                rewritten += 1;
            }
        }
    }
    rewritten
}

/// Apply all request-side rewrites in order: tools, tool_choice, messages.
/// Returns the total number of names rewritten.
pub fn prefix_request_tool_names(body: &mut Value, prefix: &ToolPrefix) -> usize {
    prefix_tools(body, prefix)
        + prefix_tool_choice(body, prefix)
        + prefix_tool_use_blocks(body, prefix)
}
