//! Model-callable tools for the group chat conversation engine

mod memory;

pub use groupchat_core::{ToolCall, ToolDefinition, ToolError, ToolResult};
pub use memory::{MEMORY_TOOL_NAME, MemoryToolArgs, memory_tool_definition, save_memory};

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

pub fn generate_schema<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}))
}

/// A model tool invocation, decoded into something the engine can act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    AddMemory(MemoryToolArgs),
    Unknown { name: String },
}

impl ToolRequest {
    /// Decodes the call's JSON argument string. Calls naming a tool nobody
    /// advertised decode to `Unknown` so they can be answered in-band.
    pub fn decode(call: &ToolCall) -> Result<Self, ToolError> {
        match call.name.as_str() {
            MEMORY_TOOL_NAME => {
                let args: MemoryToolArgs = parse_arguments(&call.name, &call.arguments)?;
                if args.memory_text.trim().is_empty() {
                    return Err(ToolError::InvalidArguments {
                        tool: call.name.clone(),
                        reason: "memory_text must not be empty".into(),
                    });
                }
                Ok(ToolRequest::AddMemory(args))
            }
            other => Ok(ToolRequest::Unknown {
                name: other.to_string(),
            }),
        }
    }
}

fn parse_arguments<T: DeserializeOwned>(tool: &str, raw: &str) -> Result<T, ToolError> {
    // Some providers send an empty string instead of "{}" for no arguments.
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_add_memory() {
        let call = ToolCall::new("call_1", "add_memory", r#"{"memory_text":"Alice likes tea"}"#);
        let request = ToolRequest::decode(&call).unwrap();
        assert_eq!(
            request,
            ToolRequest::AddMemory(MemoryToolArgs {
                memory_text: "Alice likes tea".into()
            })
        );
    }

    #[test]
    fn test_decode_rejects_malformed_arguments() {
        let call = ToolCall::new("call_1", "add_memory", "{not json");
        let err = ToolRequest::decode(&call).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { ref tool, .. } if tool == "add_memory"));

        let call = ToolCall::new("call_2", "add_memory", r#"{"text":"wrong field"}"#);
        assert!(ToolRequest::decode(&call).is_err());

        let call = ToolCall::new("call_3", "add_memory", "");
        assert!(ToolRequest::decode(&call).is_err());
    }

    #[test]
    fn test_decode_rejects_blank_memory() {
        let call = ToolCall::new("call_1", "add_memory", r#"{"memory_text":"   "}"#);
        assert!(matches!(
            ToolRequest::decode(&call),
            Err(ToolError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_decode_unknown_tool() {
        let call = ToolCall::new("call_1", "web_search", r#"{"q":"rust"}"#);
        assert_eq!(
            ToolRequest::decode(&call).unwrap(),
            ToolRequest::Unknown {
                name: "web_search".into()
            }
        );
    }
}
