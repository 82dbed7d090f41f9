use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::args::OperationArgs;
use super::error::{FailureKind, RegistryError};
use super::invocation::{InvocationRequest, InvocationResult};
use super::operation::Server;
use super::registry::OperationRegistry;
use super::traits::Facade;

/// Covers the whole facade call. Time a geocoding call spends waiting on the
/// Nominatim request throttle counts against it, so a large batch of geocoding
/// calls can time out while queued.
pub const DEFAULT_INVOCATION_TIMEOUT_MS: u64 = 15_000;

/// Counters since the dispatcher was built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub invocations: u64,
    pub failures: u64,
    pub timeouts: u64,
}

/// Routes validated invocations to the facade that serves them.
///
/// Every call resolves to exactly one [`InvocationResult`]; lookup misses,
/// argument errors and timeouts all come back as `Failure` values.
pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
    facades: HashMap<Server, Arc<dyn Facade>>,
    timeout: Duration,

    invocations: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,

    // Metrics
    invocations_counter: Counter<u64>,
    failures_counter: Counter<u64>,
    timeouts_counter: Counter<u64>,
    invoke_latency: Histogram<f64>,
}

impl Dispatcher {
    /// Bind one facade per server. Every server with registered operations
    /// must be bound.
    pub fn new(
        registry: Arc<OperationRegistry>,
        facades: Vec<Arc<dyn Facade>>,
    ) -> Result<Self, RegistryError> {
        let facades: HashMap<Server, Arc<dyn Facade>> =
            facades.into_iter().map(|f| (f.server(), f)).collect();

        if let Some(missing) = registry.servers().into_iter().find(|s| !facades.contains_key(s)) {
            return Err(RegistryError::UnboundServer(missing.to_string()));
        }

        info!(
            target: "dispatcher",
            operations = registry.len(),
            servers = facades.len(),
            "Dispatcher ready"
        );

        let meter = global::meter("geomap.dispatcher");
        let invocations_counter = meter
            .u64_counter("geomap.dispatcher.invocations_total")
            .with_description("Total number of dispatched invocations")
            .build();
        let failures_counter = meter
            .u64_counter("geomap.dispatcher.failures_total")
            .with_description("Failed invocations by failure kind")
            .build();
        let timeouts_counter = meter
            .u64_counter("geomap.dispatcher.timeouts_total")
            .with_description("Invocations cut off by the dispatch timeout")
            .build();
        let invoke_latency = meter
            .f64_histogram("geomap.dispatcher.invoke_latency_ms")
            .with_description("Invocation latency in milliseconds")
            .build();

        Ok(Self {
            registry,
            facades,
            timeout: Duration::from_millis(DEFAULT_INVOCATION_TIMEOUT_MS),
            invocations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            invocations_counter,
            failures_counter,
            timeouts_counter,
            invoke_latency,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            invocations: self.invocations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Validate and execute one invocation
    #[tracing::instrument(
        skip(self, request),
        fields(call_id = %request.call_id, operation = %request.operation)
    )]
    pub async fn invoke(&self, request: &InvocationRequest) -> InvocationResult {
        let start_time = Instant::now();
        let result = self.execute(request).await;
        self.record(request, &result, start_time.elapsed());
        result
    }

    async fn execute(&self, request: &InvocationRequest) -> InvocationResult {
        let server = request.operation.server();

        let spec = match self.registry.lookup(server, request.operation) {
            Ok(spec) => spec,
            Err(e) => {
                warn!(target: "dispatcher", error = %e, "Unknown operation");
                return InvocationResult::failure(FailureKind::Validation, e.to_string());
            }
        };

        let args = match OperationArgs::decode(spec, &request.arguments) {
            Ok(args) => args,
            Err(e) => {
                debug!(target: "dispatcher", error = %e, "Arguments rejected");
                return e.into();
            }
        };

        let Some(facade) = self.facades.get(&server) else {
            return InvocationResult::failure(
                FailureKind::Validation,
                RegistryError::UnboundServer(server.to_string()).to_string(),
            );
        };

        debug!(target: "dispatcher", server = %server, "Invoking facade");
        match timeout(self.timeout, facade.execute(&args)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    target: "dispatcher",
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Invocation timed out"
                );
                InvocationResult::failure(
                    FailureKind::Timeout,
                    format!("{} timed out after {} ms", request.operation, self.timeout.as_millis()),
                )
            }
        }
    }

    fn record(&self, request: &InvocationRequest, result: &InvocationResult, elapsed: Duration) {
        let operation = KeyValue::new("operation", request.operation.name());
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        self.invocations.fetch_add(1, Ordering::Relaxed);
        self.invoke_latency.record(elapsed_ms, &[operation.clone()]);

        match result.failure_kind() {
            None => {
                self.invocations_counter
                    .add(1, &[operation, KeyValue::new("status", "success")]);
                debug!(target: "dispatcher", elapsed_ms, "Invocation succeeded");
            }
            Some(kind) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                if kind == FailureKind::Timeout {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                    self.timeouts_counter.add(1, &[operation.clone()]);
                }
                self.invocations_counter
                    .add(1, &[operation.clone(), KeyValue::new("status", "failure")]);
                self.failures_counter
                    .add(1, &[operation, KeyValue::new("kind", kind.to_string())]);
                warn!(target: "dispatcher", elapsed_ms, %kind, "Invocation failed");
            }
        }
    }

    /// Execute a batch concurrently; results keep request order
    pub async fn invoke_all(&self, requests: &[InvocationRequest]) -> Vec<InvocationResult> {
        join_all(requests.iter().map(|r| self.invoke(r))).await
    }
}
