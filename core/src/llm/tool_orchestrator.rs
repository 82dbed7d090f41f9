use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn, Span};

use super::client::{build_tools_for_llm, LanguageModel, ModelReply, ToolCallRequest};
use super::conversation::{Conversation, Turn};
use crate::tools::{
    Dispatcher, FailureKind, InvocationRequest, InvocationResult, Operation, ToolError,
};

pub const DEFAULT_MAX_ROUND_TRIPS: u32 = 5;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful map assistant. You can geocode \
addresses, reverse-geocode coordinates, search for places, calculate routes and distance \
matrices, find nearby amenities, and report current weather and forecasts. Use the available \
tools to look up facts instead of guessing. When a tool reports a failure, decide whether to \
retry with different arguments, try another tool, or explain the problem to the user. Answer \
concisely and include distances, durations and temperatures with their units.";

/// Message returned to the user when a run cannot finish normally
pub const DEGRADED_ANSWER: &str =
    "I'm sorry, I could not complete your request. Please try again or rephrase the question.";

/// States of a single user turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    AwaitingUserInput,
    ModelDeciding,
    ToolCallsPending,
    ToolsExecuting,
    FinalAnswerReady,
    Done,
    TurnBudgetExhausted,
}

/// Orchestrator options controlling the loop bound and seeding prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorOptions {
    /// Model-to-tool round trips allowed per user turn
    pub max_round_trips: u32,
    pub system_prompt: String,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_round_trips: std::env::var("MAP_AGENT_MAX_ROUND_TRIPS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(DEFAULT_MAX_ROUND_TRIPS)
                .max(1),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Done,
    TurnBudgetExhausted,
    /// The language model could not be reached or answered with garbage
    ModelUnavailable(String),
}

impl RunOutcome {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            RunOutcome::Done => None,
            RunOutcome::TurnBudgetExhausted => Some(FailureKind::TurnBudgetExhausted),
            RunOutcome::ModelUnavailable(_) => Some(FailureKind::UpstreamUnavailable),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RunOutcome::Done => "done",
            RunOutcome::TurnBudgetExhausted => "turn_budget_exhausted",
            RunOutcome::ModelUnavailable(_) => "model_unavailable",
        }
    }
}

/// Report of one orchestrator run
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub answer: String,
    pub outcome: RunOutcome,
    pub conversation: Conversation,
    pub transitions: Vec<AgentState>,
    pub round_trips: u32,
    pub invocations: usize,
}

impl AgentRun {
    pub fn is_degraded(&self) -> bool {
        self.outcome != RunOutcome::Done
    }
}

/// Totals across every run of one orchestrator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub runs: u64,
    pub degraded_runs: u64,
    pub round_trips: u64,
    pub tool_calls: u64,
}

/// Drives the model/tool loop for one user message at a time
pub struct AgentOrchestrator {
    llm: Arc<dyn LanguageModel>,
    dispatcher: Arc<Dispatcher>,
    tools: Vec<Value>,
    options: OrchestratorOptions,

    runs: AtomicU64,
    degraded_runs: AtomicU64,
    total_round_trips: AtomicU64,
    total_tool_calls: AtomicU64,

    // Metrics
    runs_counter: Counter<u64>,
    tool_calls_counter: Counter<u64>,
    round_trips_histogram: Histogram<u64>,
    llm_latency: Histogram<f64>,
}

struct Trace {
    transitions: Vec<AgentState>,
}

impl Trace {
    fn enter(&mut self, state: AgentState) {
        debug!(target: "agent", ?state, "Transition");
        self.transitions.push(state);
    }
}

impl AgentOrchestrator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        dispatcher: Arc<Dispatcher>,
        mut options: OrchestratorOptions,
    ) -> Self {
        // at least one round trip, whatever the source of the options
        options.max_round_trips = options.max_round_trips.max(1);
        let tools = build_tools_for_llm(dispatcher.registry());
        info!(target: "agent", tools = tools.len(), max_round_trips = options.max_round_trips, "Orchestrator ready");

        let meter = global::meter("geomap.agent");
        let runs_counter = meter
            .u64_counter("geomap.agent.runs_total")
            .with_description("Agent runs by outcome")
            .build();
        let tool_calls_counter = meter
            .u64_counter("geomap.agent.tool_calls_total")
            .with_description("Tool calls requested by the model")
            .build();
        let round_trips_histogram = meter
            .u64_histogram("geomap.agent.round_trips")
            .with_description("Model-to-tool round trips per run")
            .build();
        let llm_latency = meter
            .f64_histogram("geomap.agent.llm_latency_ms")
            .with_description("Language model completion latency in milliseconds")
            .build();

        Self {
            llm,
            dispatcher,
            tools,
            options,
            runs: AtomicU64::new(0),
            degraded_runs: AtomicU64::new(0),
            total_round_trips: AtomicU64::new(0),
            total_tool_calls: AtomicU64::new(0),
            runs_counter,
            tool_calls_counter,
            round_trips_histogram,
            llm_latency,
        }
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            runs: self.runs.load(Ordering::Relaxed),
            degraded_runs: self.degraded_runs.load(Ordering::Relaxed),
            round_trips: self.total_round_trips.load(Ordering::Relaxed),
            tool_calls: self.total_tool_calls.load(Ordering::Relaxed),
        }
    }

    /// Answer one user message, calling tools as the model requests
    #[tracing::instrument(name = "agent.run", skip_all, fields(round_trips))]
    pub async fn run(&self, user_message: &str) -> AgentRun {
        let started = Instant::now();
        let mut trace = Trace {
            transitions: vec![AgentState::AwaitingUserInput],
        };
        let mut conversation = Conversation::with_system_prompt(&self.options.system_prompt);
        let mut round_trips = 0u32;
        let mut invocations = 0usize;

        conversation.push(Turn::User {
            content: user_message.to_string(),
        });
        trace.enter(AgentState::ModelDeciding);

        let (answer, outcome) = loop {
            let llm_started = Instant::now();
            let reply = self.llm.complete(&conversation, &self.tools).await;
            self.llm_latency
                .record(llm_started.elapsed().as_secs_f64() * 1000.0, &[]);
            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    error!(target: "agent", error = %e, "Language model unavailable");
                    trace.enter(AgentState::Done);
                    break (DEGRADED_ANSWER.to_string(), RunOutcome::ModelUnavailable(e.to_string()));
                }
            };

            match reply {
                ModelReply::Answer(text) => {
                    trace.enter(AgentState::FinalAnswerReady);
                    trace.enter(AgentState::Done);
                    break (text, RunOutcome::Done);
                }
                ModelReply::ToolCalls { content, calls } => {
                    trace.enter(AgentState::ToolCallsPending);
                    if round_trips >= self.options.max_round_trips {
                        warn!(target: "agent", round_trips, requested = calls.len(), "Round-trip budget exhausted");
                        trace.enter(AgentState::TurnBudgetExhausted);
                        break (DEGRADED_ANSWER.to_string(), RunOutcome::TurnBudgetExhausted);
                    }
                    round_trips += 1;
                    Span::current().record("round_trips", round_trips);

                    trace.enter(AgentState::ToolsExecuting);
                    let results = self.execute_batch(&calls).await;
                    invocations += results.len();
                    self.tool_calls_counter.add(results.len() as u64, &[]);

                    let names: Vec<String> = calls.iter().map(|c| c.name.clone()).collect();
                    conversation.push(Turn::ToolInvocation {
                        content,
                        calls: calls.clone(),
                    });
                    for (call, result) in calls.into_iter().zip(results) {
                        conversation.push(Turn::ToolResult {
                            call_id: call.id,
                            name: call.name,
                            result,
                        });
                    }
                    debug!(target: "agent", round_trips, tools = ?names, "Tool results appended");
                    trace.enter(AgentState::ModelDeciding);
                }
            }
        };

        conversation.push(Turn::Assistant {
            content: answer.clone(),
        });
        self.record_run(&outcome, round_trips, invocations);
        info!(
            target: "agent",
            round_trips,
            invocations,
            outcome = ?outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run finished"
        );

        AgentRun {
            answer,
            outcome,
            conversation,
            transitions: trace.transitions,
            round_trips,
            invocations,
        }
    }

    fn record_run(&self, outcome: &RunOutcome, round_trips: u32, invocations: usize) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        if *outcome != RunOutcome::Done {
            self.degraded_runs.fetch_add(1, Ordering::Relaxed);
        }
        self.total_round_trips
            .fetch_add(u64::from(round_trips), Ordering::Relaxed);
        self.total_tool_calls
            .fetch_add(invocations as u64, Ordering::Relaxed);

        self.runs_counter
            .add(1, &[KeyValue::new("outcome", outcome.label())]);
        self.round_trips_histogram.record(u64::from(round_trips), &[]);
    }

    /// Dispatch one batch concurrently. Results come back in call order.
    async fn execute_batch(&self, calls: &[ToolCallRequest]) -> Vec<InvocationResult> {
        let dispatcher = &self.dispatcher;
        join_all(calls.iter().map(|call| async move {
            match to_request(call) {
                Ok(request) => dispatcher.invoke(&request).await,
                Err(e) => {
                    warn!(target: "agent", tool = %call.name, error = %e, "Unusable tool call");
                    e.into()
                }
            }
        }))
        .await
    }
}

/// Map a model tool call onto a typed request
fn to_request(call: &ToolCallRequest) -> Result<InvocationRequest, ToolError> {
    let operation: Operation = call.name.parse()?;
    let arguments = match &call.arguments {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(ToolError::Validation(format!(
                "arguments for '{}' must be a JSON object, got {other}",
                call.name
            )))
        }
    };
    Ok(InvocationRequest::new(call.id.clone(), operation, arguments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn to_request_accepts_objects_and_null() {
        let request = to_request(&call("geocode", json!({"address": "Paris"}))).unwrap();
        assert_eq!(request.operation, Operation::Geocode);
        assert_eq!(request.arguments["address"], "Paris");

        assert!(to_request(&call("get_weather", Value::Null))
            .unwrap()
            .arguments
            .is_empty());
    }

    #[test]
    fn to_request_rejects_unknown_names_and_scalars() {
        assert!(matches!(
            to_request(&call("teleport", json!({}))),
            Err(ToolError::Validation(_))
        ));
        assert!(matches!(
            to_request(&call("geocode", json!("Paris"))),
            Err(ToolError::Validation(_))
        ));
    }

    #[test]
    fn run_outcome_kinds() {
        assert_eq!(RunOutcome::Done.failure_kind(), None);
        assert_eq!(
            RunOutcome::TurnBudgetExhausted.failure_kind(),
            Some(FailureKind::TurnBudgetExhausted)
        );
    }
}
