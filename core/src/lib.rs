// Geomap Core Library
// Map and weather operations exposed to a tool-calling language model

pub mod geo;
pub mod llm;
pub mod tools;

// Export core types
pub use geo::GeoPoint;
pub use llm::{AgentOrchestrator, AgentRun, ChatCompletionsClient, LanguageModel, RunOutcome};
pub use tools::{
    Dispatcher, Facade, FailureKind, InvocationRequest, InvocationResult, Operation,
    OperationRegistry, Server, ToolError,
};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeomapError {
    #[error("Registry error: {0}")]
    Registry(#[from] tools::RegistryError),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GeomapError>;
