mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{answer, calls, dispatcher_over, tool_call, FakeTransport, ScriptedModel};
use geomap_core::llm::{
    AgentOrchestrator, AgentState, AgentStats, LanguageModel, ModelReply, OrchestratorOptions,
    RunOutcome, Turn, DEGRADED_ANSWER,
};
use geomap_core::tools::invocation::OperationOutput;
use geomap_core::tools::{FailureKind, ToolError};
use geomap_core::GeomapError;
use serde_json::{json, Value};

fn options(max_round_trips: u32) -> OrchestratorOptions {
    OrchestratorOptions {
        max_round_trips,
        system_prompt: "You are a map assistant.".into(),
    }
}

fn agent(model: Arc<ScriptedModel>, transport: Arc<FakeTransport>, max: u32) -> AgentOrchestrator {
    let llm: Arc<dyn LanguageModel> = model;
    AgentOrchestrator::new(llm, Arc::new(dispatcher_over(transport)), options(max))
}

fn current_weather() -> Value {
    json!({"current": {
        "time": "2026-10-17T09:00",
        "temperature_2m": 19.5,
        "relative_humidity_2m": 70,
        "wind_speed_10m": 8.0,
        "wind_direction_10m": 45,
        "weather_code": 3,
        "is_day": 1
    }})
}

fn tool_results(turns: &[Turn]) -> Vec<(&str, &geomap_core::InvocationResult)> {
    turns
        .iter()
        .filter_map(|t| match t {
            Turn::ToolResult {
                call_id, result, ..
            } => Some((call_id.as_str(), result)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn single_tool_call_then_answer() {
    let model = ScriptedModel::new(vec![
        calls(vec![tool_call(
            "call_1",
            "get_weather",
            json!({"location": {"latitude": 35.68, "longitude": 139.65}}),
        )]),
        answer("It is overcast and 19.5 °C in Tokyo."),
    ]);
    let transport = FakeTransport::new(|_, _| Ok(current_weather()));
    let run = agent(model.clone(), transport.clone(), 5)
        .run("What's the weather like in Tokyo right now?")
        .await;

    assert_eq!(run.outcome, RunOutcome::Done);
    assert_eq!(run.answer, "It is overcast and 19.5 °C in Tokyo.");
    assert_eq!(run.invocations, 1);
    assert_eq!(run.round_trips, 1);
    assert_eq!(transport.calls().len(), 1);
    assert_eq!(
        run.transitions,
        vec![
            AgentState::AwaitingUserInput,
            AgentState::ModelDeciding,
            AgentState::ToolCallsPending,
            AgentState::ToolsExecuting,
            AgentState::ModelDeciding,
            AgentState::FinalAnswerReady,
            AgentState::Done,
        ]
    );

    // the second model call sees exactly one tool result, right at the end
    let seen = model.seen();
    assert_eq!(seen.len(), 2);
    let second = seen[1].turns();
    assert_eq!(tool_results(second).len(), 1);
    assert!(matches!(second.last(), Some(Turn::ToolResult { call_id, .. }) if call_id == "call_1"));
    assert!(matches!(second.first(), Some(Turn::System { .. })));
}

#[tokio::test]
async fn failing_tools_exhaust_the_round_trip_budget() {
    let model = ScriptedModel::repeating(ModelReply::ToolCalls {
        content: None,
        calls: vec![tool_call("call_w", "get_weather", json!({"location": [48.85, 2.29]}))],
    });
    let transport = FakeTransport::new(|_, _| Err(ToolError::UpstreamUnavailable("503".into())));
    let run = agent(model.clone(), transport.clone(), 3)
        .run("Weather at the Eiffel Tower?")
        .await;

    assert_eq!(run.outcome, RunOutcome::TurnBudgetExhausted);
    assert_eq!(run.outcome.failure_kind(), Some(FailureKind::TurnBudgetExhausted));
    assert!(run.is_degraded());
    assert_eq!(run.answer, DEGRADED_ANSWER);
    assert_eq!(run.round_trips, 3);
    assert_eq!(run.invocations, 3);
    assert_eq!(transport.calls().len(), 3);
    assert_eq!(model.seen().len(), 4);
    assert_eq!(run.transitions.last(), Some(&AgentState::TurnBudgetExhausted));

    let results = tool_results(run.conversation.turns());
    assert_eq!(results.len(), 3);
    assert!(results
        .iter()
        .all(|(_, r)| r.failure_kind() == Some(FailureKind::UpstreamUnavailable)));
}

#[tokio::test]
async fn eiffel_tower_coordinates() {
    let model = ScriptedModel::new(vec![
        calls(vec![tool_call(
            "call_geo",
            "geocode",
            json!({"address": "Eiffel Tower, Paris", "limit": 1}),
        )]),
        answer("The Eiffel Tower is at 48.8584° N, 2.2945° E."),
    ]);
    let transport = FakeTransport::new(|url, query| {
        assert!(url.ends_with("/search"));
        assert!(query.contains(&("q".to_string(), "Eiffel Tower, Paris".to_string())));
        Ok(json!([{
            "display_name": "Tour Eiffel, Paris, France",
            "lat": "48.8584",
            "lon": "2.2945",
            "type": "attraction",
            "importance": 0.9
        }]))
    });
    let run = agent(model, transport, 5)
        .run("What are the coordinates of the Eiffel Tower in Paris?")
        .await;

    assert_eq!(run.outcome, RunOutcome::Done);
    let results = tool_results(run.conversation.turns());
    match results[0].1.data() {
        Some(OperationOutput::Geocode(found)) => {
            let best = found.best().unwrap();
            assert!((best.location.latitude - 48.8584).abs() < 1e-6);
            assert!((best.location.longitude - 2.2945).abs() < 1e-6);
        }
        other => panic!("expected geocode output, got {other:?}"),
    }
    assert!(matches!(run.conversation.last(), Some(Turn::Assistant { content }) if content.contains("48.8584")));
}

#[tokio::test]
async fn batch_results_are_appended_in_request_order() {
    let model = ScriptedModel::new(vec![
        calls(vec![
            tool_call("a", "get_weather", json!({"location": [51.5, -0.12]})),
            tool_call("b", "teleport", json!({"to": "Mars"})),
            tool_call("c", "get_weather", json!({})),
        ]),
        answer("Done."),
    ]);
    let transport = FakeTransport::new(|_, _| Ok(current_weather()));
    let run = agent(model, transport.clone(), 5).run("London?").await;

    let results = tool_results(run.conversation.turns());
    let ids: Vec<&str> = results.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(results[0].1.is_success());
    assert_eq!(results[1].1.failure_kind(), Some(FailureKind::Validation));
    assert_eq!(results[2].1.failure_kind(), Some(FailureKind::Validation));
    assert_eq!(run.invocations, 3);
    // only the well-formed call reached the network
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn model_failure_yields_degraded_answer() {
    let model = ScriptedModel::new(vec![Err(GeomapError::Llm("connection refused".into()))]);
    let transport = FakeTransport::new(|_, _| panic!("no request expected"));
    let run = agent(model, transport, 5).run("Route from SF to LA?").await;

    assert!(matches!(run.outcome, RunOutcome::ModelUnavailable(ref m) if m.contains("connection refused")));
    assert_eq!(run.answer, DEGRADED_ANSWER);
    assert_eq!(run.invocations, 0);
    assert_eq!(run.transitions.last(), Some(&AgentState::Done));
}

#[tokio::test]
async fn calls_finishing_out_of_order_are_appended_in_request_order() {
    let model = ScriptedModel::new(vec![
        calls(vec![
            tool_call("slow", "get_weather", json!({"location": [60.0, 10.0]})),
            tool_call("fast", "get_weather", json!({"location": [10.0, 10.0]})),
            tool_call("slow2", "get_weather", json!({"location": [61.0, 10.0]})),
        ]),
        answer("Done."),
    ]);
    // 300 ms north of 50°, 10 ms elsewhere
    let transport = FakeTransport::with_latency(
        |query| {
            let northern = query
                .iter()
                .find(|(k, _)| k == "latitude")
                .and_then(|(_, v)| v.parse::<f64>().ok())
                .is_some_and(|lat| lat > 50.0);
            Duration::from_millis(if northern { 300 } else { 10 })
        },
        |_, _| Ok(current_weather()),
    );

    let started = Instant::now();
    let run = agent(model, transport, 5).run("Weather in three places?").await;
    let elapsed = started.elapsed();

    let results = tool_results(run.conversation.turns());
    let ids: Vec<&str> = results.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec!["slow", "fast", "slow2"]);
    let latitudes: Vec<f64> = results
        .iter()
        .map(|(_, r)| match r.data() {
            Some(OperationOutput::Current(now)) => now.location.latitude,
            other => panic!("expected current conditions, got {other:?}"),
        })
        .collect();
    assert_eq!(latitudes, vec![60.0, 10.0, 61.0]);
    // the batch ran concurrently: near the slowest call, not the 610 ms sum
    assert!(elapsed < Duration::from_millis(550), "took {elapsed:?}");
}

#[tokio::test]
async fn zero_round_trip_budget_still_allows_one_batch() {
    let model = ScriptedModel::new(vec![
        calls(vec![tool_call("call_1", "get_weather", json!({"location": [35.68, 139.65]}))]),
        answer("Overcast."),
    ]);
    let transport = FakeTransport::new(|_, _| Ok(current_weather()));
    let agent = agent(model, transport, 0);
    assert_eq!(agent.options().max_round_trips, 1);

    let run = agent.run("Weather in Tokyo?").await;
    assert_eq!(run.outcome, RunOutcome::Done);
    assert_eq!(run.invocations, 1);
    assert_eq!(run.round_trips, 1);
}

#[tokio::test]
async fn stats_accumulate_across_runs() {
    let model = ScriptedModel::new(vec![
        calls(vec![
            tool_call("a", "get_weather", json!({"location": [51.5, -0.12]})),
            tool_call("b", "get_weather", json!({"location": [48.85, 2.35]})),
        ]),
        answer("Mild in both."),
        Err(GeomapError::Llm("connection reset".into())),
    ]);
    let transport = FakeTransport::new(|_, _| Ok(current_weather()));
    let agent = agent(model, transport, 5);
    assert_eq!(agent.stats(), AgentStats::default());

    assert!(!agent.run("London and Paris?").await.is_degraded());
    assert!(agent.run("And Rome?").await.is_degraded());

    assert_eq!(
        agent.stats(),
        AgentStats {
            runs: 2,
            degraded_runs: 1,
            round_trips: 1,
            tool_calls: 2,
        }
    );
}
