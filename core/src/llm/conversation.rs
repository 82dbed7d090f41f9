use serde::Serialize;
use serde_json::{json, Value};

use super::client::ToolCallRequest;
use crate::tools::InvocationResult;

/// One entry of a conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
    },
    /// Assistant turn that requested one or more operations
    ToolInvocation {
        content: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
    ToolResult {
        call_id: String,
        name: String,
        result: InvocationResult,
    },
}

/// Ordered, append-only history of a single orchestrator run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: &str) -> Self {
        let mut conversation = Self::new();
        if !prompt.trim().is_empty() {
            conversation.push(Turn::System {
                content: prompt.to_string(),
            });
        }
        conversation
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Render as Chat Completions `messages`
    pub fn to_chat_messages(&self) -> Vec<Value> {
        self.turns
            .iter()
            .map(|turn| match turn {
                Turn::System { content } => json!({"role": "system", "content": content}),
                Turn::User { content } => json!({"role": "user", "content": content}),
                Turn::Assistant { content } => json!({"role": "assistant", "content": content}),
                Turn::ToolInvocation { content, calls } => json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": calls
                        .iter()
                        .map(|c| json!({
                            "id": c.id,
                            "type": "function",
                            "function": {"name": c.name, "arguments": c.arguments.to_string()},
                        }))
                        .collect::<Vec<_>>(),
                }),
                Turn::ToolResult {
                    call_id, result, ..
                } => json!({
                    "role": "tool",
                    "tool_call_id": call_id,
                    "content": result.to_observation(),
                }),
            })
            .collect()
    }
}
