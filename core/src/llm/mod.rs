//! LLM module: chat client, conversation state, and the tool-calling agent loop
//!
//! This module provides:
//! - `LanguageModel` and its OpenAI-compatible `ChatCompletionsClient`
//! - `Conversation`, the append-only turn history of one run
//! - `AgentOrchestrator`, which alternates model decisions and dispatched tool calls

mod client;
mod conversation;
mod tool_orchestrator;

pub use client::{
    build_tools_for_llm, parse_chat_reply, parse_tool_calls_from_chat, ChatCompletionsClient,
    LanguageModel, LlmClientConfig, ModelReply, ToolCallRequest,
};
pub use conversation::{Conversation, Turn};
pub use tool_orchestrator::{
    AgentOrchestrator, AgentRun, AgentState, AgentStats, OrchestratorOptions, RunOutcome,
    DEFAULT_MAX_ROUND_TRIPS, DEFAULT_SYSTEM_PROMPT, DEGRADED_ANSWER,
};
