mod config;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use config::MapAgentConfig;
use geomap_core::llm::{AgentOrchestrator, AgentRun, ChatCompletionsClient, LanguageModel, Turn};
use geomap_core::tools::{
    Dispatcher, Facade, GeocodingFacade, HttpTransport, OperationRegistry, ReqwestTransport,
    RoutingFacade, WeatherFacade,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const DEMO_QUERIES: [&str; 6] = [
    "What are the coordinates of the Eiffel Tower in Paris?",
    "Find me coffee shops near Times Square in New York",
    "How far is it from San Francisco to Los Angeles by car?",
    "What's the weather like in Tokyo right now?",
    "I want to visit the Grand Canyon. Can you tell me the weather forecast for the next 5 days?",
    "Find museums in London and tell me the weather there",
];

const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,geomap_core=info,map_agent=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let interactive = args.iter().any(|a| a == "--interactive" || a == "-i");
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = MapAgentConfig::load();
    if cfg.llm.api_key.is_none() {
        warn!(target: "map_agent", "OPENAI_API_KEY is not set; the model endpoint may reject requests");
    }

    let agent = build_agent(&cfg)?;
    info!(
        target: "map_agent",
        model = %cfg.llm.model,
        interactive,
        "Map agent ready"
    );

    if interactive {
        interactive_mode(&agent, verbose).await?;
    } else {
        run_demo_queries(&agent, verbose).await;
    }
    info!(target: "map_agent", stats = ?agent.stats(), "Session finished");
    Ok(())
}

/// Wire transport, facades, registry, dispatcher and model into one agent
fn build_agent(cfg: &MapAgentConfig) -> geomap_core::Result<AgentOrchestrator> {
    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new(cfg.http.timeout_ms, &cfg.http.user_agent)?);

    let geocoding = Arc::new(GeocodingFacade::with_config(
        cfg.geocoding.clone(),
        Arc::clone(&transport),
    ));
    let routing = Arc::new(RoutingFacade::with_config(
        cfg.routing.clone(),
        Arc::clone(&transport),
    ));
    let weather = Arc::new(WeatherFacade::with_config(
        cfg.weather.clone(),
        Arc::clone(&transport),
        Arc::clone(&geocoding),
    ));

    let facades: Vec<Arc<dyn Facade>> = vec![
        geocoding as Arc<dyn Facade>,
        routing as Arc<dyn Facade>,
        weather as Arc<dyn Facade>,
    ];
    let registry = Arc::new(OperationRegistry::builtin()?);
    let dispatcher = Dispatcher::new(registry, facades)?
        .with_timeout(Duration::from_millis(cfg.dispatcher_timeout_ms));

    let llm: Arc<dyn LanguageModel> = Arc::new(ChatCompletionsClient::new(cfg.llm.clone())?);
    Ok(AgentOrchestrator::new(
        llm,
        Arc::new(dispatcher),
        cfg.agent.clone(),
    ))
}

async fn run_demo_queries(agent: &AgentOrchestrator, verbose: bool) {
    println!("\n{}", "=".repeat(80));
    println!("MAP AGENT DEMONSTRATION");
    println!("{}", "=".repeat(80));

    for (i, query) in DEMO_QUERIES.iter().enumerate() {
        println!("\n{}", "-".repeat(80));
        println!("Query {}: {}", i + 1, query);
        println!("{}", "-".repeat(80));

        let run = agent.run(query).await;
        print_run(&run, verbose);

        // Stay polite to the public map services between queries
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    println!("\n{}", "=".repeat(80));
    println!("DEMONSTRATION COMPLETE");
    println!("{}\n", "=".repeat(80));
}

async fn interactive_mode(agent: &AgentOrchestrator, verbose: bool) -> std::io::Result<()> {
    println!("\n{}", "=".repeat(80));
    println!("INTERACTIVE MAP AGENT MODE");
    println!("{}", "=".repeat(80));
    println!("\nAvailable capabilities:");
    println!("  - Geocoding and location search");
    println!("  - Place and POI search");
    println!("  - Route calculation and distance matrices");
    println!("  - Weather information and forecasts");
    println!("\nType 'quit' or 'exit' to stop.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if QUIT_WORDS.contains(&input.to_lowercase().as_str()) {
            break;
        }
        if input.is_empty() {
            continue;
        }

        let run = agent.run(input).await;
        print_run(&run, verbose);
    }
    println!("\nGoodbye!\n");
    Ok(())
}

fn print_run(run: &AgentRun, verbose: bool) {
    for turn in run.conversation.turns() {
        if let Turn::ToolInvocation { calls, .. } = turn {
            for call in calls {
                println!("  -> {}({})", call.name, call.arguments);
            }
        }
    }
    println!("\nAssistant: {}", run.answer);

    if run.is_degraded() {
        warn!(target: "map_agent", outcome = ?run.outcome, round_trips = run.round_trips, "Run ended without a normal answer");
    }
    if verbose {
        match serde_json::to_string_pretty(&run.conversation) {
            Ok(json) => println!("\n{json}"),
            Err(e) => warn!(target: "map_agent", error = %e, "Failed to render conversation"),
        }
    }
}
