use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-invocation failures. These never escape the dispatcher: they are
/// folded into [`InvocationResult::Failure`](super::InvocationResult) and
/// handed to the model as ordinary conversation content.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Upstream rejected the request: {0}")]
    UpstreamRejected(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

impl ToolError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ToolError::Validation(_) => FailureKind::Validation,
            ToolError::UpstreamRejected(_) => FailureKind::UpstreamRejected,
            ToolError::UpstreamUnavailable(_) => FailureKind::UpstreamUnavailable,
            ToolError::Timeout(_) => FailureKind::Timeout,
        }
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Serializable classification of a failed invocation or run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    UpstreamRejected,
    UpstreamUnavailable,
    Timeout,
    /// Orchestrator-level: the model kept requesting tools past the round-trip cap
    TurnBudgetExhausted,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Validation => "validation",
            FailureKind::UpstreamRejected => "upstream_rejected",
            FailureKind::UpstreamUnavailable => "upstream_unavailable",
            FailureKind::Timeout => "timeout",
            FailureKind::TurnBudgetExhausted => "turn_budget_exhausted",
        };
        f.write_str(s)
    }
}

/// Registry misuse. Raised while wiring the process together; fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Operation already registered: {server}/{operation}")]
    DuplicateOperation { server: String, operation: String },

    #[error("Operation not found: {server}/{operation}")]
    NotFound { server: String, operation: String },

    #[error("No facade bound for server '{0}'")]
    UnboundServer(String),
}
