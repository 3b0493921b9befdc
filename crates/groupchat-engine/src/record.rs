//! Mapping between structured turns and `(role, content)` history records
//!
//! Assistant tool-invocation turns and tool result turns carry metadata the
//! two-column store has no room for, so their content is a JSON envelope.
//! Everything else is stored as plain text.

use serde::{Deserialize, Serialize};

use groupchat_core::{ChatMessage, HistoryRecord, Role, ToolCall};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StoredTurn {
    ToolUse {
        #[serde(default)]
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

pub fn encode_turn(turn: &ChatMessage) -> serde_json::Result<String> {
    match turn.role {
        Role::Assistant if turn.has_tool_calls() => serde_json::to_string(&StoredTurn::ToolUse {
            content: turn.content.clone(),
            tool_calls: turn.tool_calls.clone(),
        }),
        Role::Tool => serde_json::to_string(&StoredTurn::ToolResult {
            tool_call_id: turn.tool_call_id.clone().unwrap_or_default(),
            content: turn.content.clone(),
        }),
        _ => Ok(turn.content.clone()),
    }
}

pub fn decode_record(record: &HistoryRecord) -> ChatMessage {
    let envelope = match record.role {
        Role::Assistant | Role::Tool => serde_json::from_str::<StoredTurn>(&record.content).ok(),
        _ => None,
    };

    let mut turn = match (record.role, envelope) {
        (Role::Assistant, Some(StoredTurn::ToolUse { content, tool_calls })) => {
            ChatMessage::assistant_tool_calls(content, tool_calls)
        }
        (Role::Tool, Some(StoredTurn::ToolResult { tool_call_id, content })) => {
            ChatMessage::tool(tool_call_id, content)
        }
        (Role::System, _) => ChatMessage::system(&record.content),
        (Role::User, _) => ChatMessage::user(&record.content),
        (Role::Assistant, _) => ChatMessage::assistant(&record.content),
        // A tool record without an envelope has lost its call id.
        (Role::Tool, _) => ChatMessage {
            tool_call_id: None,
            ..ChatMessage::tool("", &record.content)
        },
    };
    turn.timestamp = Some(record.created_at);
    turn
}

/// Turns read back from the store, made safe to hand to the model: a system
/// turn is guaranteed at the head, and tool round-trips cut by the read
/// window are dropped. Returns the turns and whether the system turn was
/// synthesized.
pub fn restore_turns(
    records: &[HistoryRecord],
    fallback_system: impl FnOnce() -> ChatMessage,
) -> (Vec<ChatMessage>, bool) {
    let decoded: Vec<ChatMessage> = records.iter().map(decode_record).collect();

    let mut turns = Vec::with_capacity(decoded.len() + 1);
    let mut rest = decoded.into_iter().peekable();
    let synthesized = match rest.peek() {
        Some(first) if first.role == Role::System => false,
        _ => {
            turns.push(fallback_system());
            true
        }
    };
    turns.extend(rest);

    (drop_broken_tool_rounds(turns), synthesized)
}

fn drop_broken_tool_rounds(turns: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut kept: Vec<ChatMessage> = Vec::with_capacity(turns.len());
    let mut i = 0;
    while i < turns.len() {
        let turn = &turns[i];
        if turn.role == Role::Tool {
            // Reached only when no complete round claims this tool turn.
            i += 1;
            continue;
        }
        if turn.role == Role::Assistant && turn.has_tool_calls() {
            let responses = turns[i + 1..]
                .iter()
                .take_while(|t| t.role == Role::Tool)
                .count();
            let round = &turns[i + 1..i + 1 + responses];
            let complete = turn.tool_calls.iter().all(|call| {
                round
                    .iter()
                    .any(|t| t.tool_call_id.as_deref() == Some(call.id.as_str()))
            });
            let consistent = round
                .iter()
                .all(|t| t.tool_call_id.as_deref().is_some_and(|id| turn.requested_call(id)));
            if complete && consistent {
                kept.extend_from_slice(&turns[i..=i + responses]);
            }
            i += 1 + responses;
            continue;
        }
        kept.push(turn.clone());
        i += 1;
    }
    kept
}
