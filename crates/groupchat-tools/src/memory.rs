use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::generate_schema;
use groupchat_core::{MemoryStore, Result, ToolDefinition, ToolError, ToolResult};

pub const MEMORY_TOOL_NAME: &str = "add_memory";

const MEMORY_TOOL_DESCRIPTION: &str = "Save an important fact about this group chat so it can be \
recalled in future conversations. Use it for durable information such as member preferences, \
important dates, agreed rules and who people are. Do not use it for small talk.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MemoryToolArgs {
    /// The fact to remember, written as one self-contained sentence
    pub memory_text: String,
}

pub fn memory_tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: MEMORY_TOOL_NAME.to_string(),
        description: MEMORY_TOOL_DESCRIPTION.to_string(),
        parameters: generate_schema::<MemoryToolArgs>(),
    }
}

/// Stores the memory and builds the acknowledgement sent back to the model.
///
/// A store failure is reported as `ToolError::ExecutionFailed`.
pub async fn save_memory(
    store: &dyn MemoryStore,
    conversation_id: &str,
    args: &MemoryToolArgs,
) -> Result<ToolResult> {
    let text = args.memory_text.trim();
    store.append(conversation_id, text).await.map_err(|e| {
        warn!(conversation_id, error = %e, "Memory store rejected the write");
        ToolError::ExecutionFailed(format!("could not save memory: {}", e))
    })?;
    debug!(conversation_id, chars = text.len(), "Saved memory");
    Ok(ToolResult::ok("Memory saved."))
}
