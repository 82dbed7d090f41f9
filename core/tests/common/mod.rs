#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use geomap_core::llm::{Conversation, LanguageModel, ModelReply, ToolCallRequest};
use geomap_core::tools::native::{GeocodingConfig, RoutingConfig, Units, WeatherConfig};
use geomap_core::tools::{
    Dispatcher, Facade, GeocodingFacade, HttpTransport, OperationRegistry, RoutingFacade,
    ToolResult, WeatherFacade,
};
use geomap_core::{GeomapError, Result};
use serde_json::Value;

type Responder = dyn Fn(&str, &[(String, String)]) -> ToolResult<Value> + Send + Sync;
type Latency = dyn Fn(&[(String, String)]) -> Duration + Send + Sync;

/// Transport that answers from a closure and records every URL it was asked for
pub struct FakeTransport {
    responder: Box<Responder>,
    latency: Option<Box<Latency>>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new(
        responder: impl Fn(&str, &[(String, String)]) -> ToolResult<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            latency: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Like `new`, but each request first sleeps for `latency(query)`
    pub fn with_latency(
        latency: impl Fn(&[(String, String)]) -> Duration + Send + Sync + 'static,
        responder: impl Fn(&str, &[(String, String)]) -> ToolResult<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            latency: Some(Box::new(latency)),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> ToolResult<Value> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(query)).await;
        }
        (self.responder)(url, query)
    }
}

pub const NOMINATIM: &str = "http://nominatim.test";
pub const OSRM: &str = "http://osrm.test";
pub const OVERPASS: &str = "http://overpass.test/api/interpreter";
pub const OPEN_METEO: &str = "http://meteo.test/v1/forecast";

/// Real facades and the builtin registry over a single fake transport
pub fn dispatcher_over(transport: Arc<FakeTransport>) -> Dispatcher {
    throttled_dispatcher_over(transport, 0)
}

/// As `dispatcher_over`, with the Nominatim request interval switched on
pub fn throttled_dispatcher_over(transport: Arc<FakeTransport>, interval_ms: u64) -> Dispatcher {
    let transport: Arc<dyn HttpTransport> = transport;
    let geocoding = Arc::new(GeocodingFacade::with_config(
        GeocodingConfig {
            endpoint: NOMINATIM.into(),
            min_request_interval_ms: interval_ms,
        },
        Arc::clone(&transport),
    ));
    let routing = Arc::new(RoutingFacade::with_config(
        RoutingConfig {
            osrm_endpoint: OSRM.into(),
            overpass_endpoint: OVERPASS.into(),
        },
        Arc::clone(&transport),
    ));
    let weather = Arc::new(WeatherFacade::with_config(
        WeatherConfig {
            api_endpoint: OPEN_METEO.into(),
            units: Units::Metric,
        },
        Arc::clone(&transport),
        Arc::clone(&geocoding),
    ));
    let facades: Vec<Arc<dyn Facade>> = vec![
        geocoding as Arc<dyn Facade>,
        routing as Arc<dyn Facade>,
        weather as Arc<dyn Facade>,
    ];
    Dispatcher::new(Arc::new(OperationRegistry::builtin().unwrap()), facades).unwrap()
}

/// Language model that plays back a fixed script and keeps what it was shown
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply>>>,
    /// Repeated once the script runs out; `None` means fail
    fallback: Option<ModelReply>,
    seen: Mutex<Vec<Conversation>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<ModelReply>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn repeating(reply: ModelReply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(reply),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Conversations passed to each `complete` call, in order
    pub fn seen(&self) -> Vec<Conversation> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, conversation: &Conversation, _tools: &[Value]) -> Result<ModelReply> {
        self.seen.lock().unwrap().push(conversation.clone());
        if let Some(next) = self.replies.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback
            .clone()
            .ok_or_else(|| GeomapError::Llm("script exhausted".into()))
    }
}

pub fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
    ToolCallRequest {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

pub fn calls(calls: Vec<ToolCallRequest>) -> Result<ModelReply> {
    Ok(ModelReply::ToolCalls {
        content: None,
        calls,
    })
}

pub fn answer(text: &str) -> Result<ModelReply> {
    Ok(ModelReply::Answer(text.into()))
}
