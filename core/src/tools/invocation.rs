use serde::Serialize;
use serde_json::{Map, Value};

use super::error::{FailureKind, ToolError, ToolResult};
use super::native::geocoding::{Address, GeocodeResult, PlaceSearch};
use super::native::routing::{DistanceMatrix, NearbyResult, Route};
use super::native::weather::{CurrentConditions, Forecast, LocationWeather};
use super::operation::Operation;

/// One model-requested call, scoped to a single orchestrator round trip
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    /// Identifier the model attached to the tool call, echoed on the result turn
    pub call_id: String,
    pub operation: Operation,
    pub arguments: Map<String, Value>,
}

impl InvocationRequest {
    pub fn new(call_id: impl Into<String>, operation: Operation, arguments: Map<String, Value>) -> Self {
        Self {
            call_id: call_id.into(),
            operation,
            arguments,
        }
    }
}

/// Operation-specific success payloads
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationOutput {
    Geocode(GeocodeResult),
    Address(Address),
    Places(PlaceSearch),
    Route(Route),
    DistanceMatrix(DistanceMatrix),
    Nearby(NearbyResult),
    Current(CurrentConditions),
    Forecast(Forecast),
    LocationWeather(LocationWeather),
}

/// Outcome of a single invocation. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationResult {
    Success { data: OperationOutput },
    Failure { kind: FailureKind, message: String },
}

impl InvocationResult {
    pub fn success(data: OperationOutput) -> Self {
        InvocationResult::Success { data }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        InvocationResult::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            InvocationResult::Failure { kind, .. } => Some(*kind),
            InvocationResult::Success { .. } => None,
        }
    }

    pub fn data(&self) -> Option<&OperationOutput> {
        match self {
            InvocationResult::Success { data } => Some(data),
            InvocationResult::Failure { .. } => None,
        }
    }

    /// JSON text appended to the conversation as the tool-result content
    pub fn to_observation(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"failure","kind":"upstream_rejected","message":"unserializable result: {e}"}}"#)
        })
    }
}

impl From<ToolError> for InvocationResult {
    fn from(err: ToolError) -> Self {
        InvocationResult::failure(err.kind(), err.to_string())
    }
}

impl From<ToolResult<OperationOutput>> for InvocationResult {
    fn from(result: ToolResult<OperationOutput>) -> Self {
        match result {
            Ok(data) => InvocationResult::success(data),
            Err(err) => err.into(),
        }
    }
}
