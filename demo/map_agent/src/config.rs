use std::fs;
use std::path::Path;

use geomap_core::llm::{LlmClientConfig, OrchestratorOptions};
use geomap_core::tools::dispatcher::DEFAULT_INVOCATION_TIMEOUT_MS;
use geomap_core::tools::native::{GeocodingConfig, RoutingConfig, Units, WeatherConfig};
use geomap_core::tools::transport::DEFAULT_USER_AGENT;

/// High-level configuration for the Map Agent demo
#[derive(Clone, Debug)]
pub struct MapAgentConfig {
    pub llm: LlmClientConfig,
    pub agent: OrchestratorOptions,
    pub http: HttpConfig,
    pub geocoding: GeocodingConfig,
    pub routing: RoutingConfig,
    pub weather: WeatherConfig,
    /// Ceiling for a single dispatched operation
    pub dispatcher_timeout_ms: u64,
}

/// Outbound HTTP settings shared by the facades
#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: std::env::var("GEOMAP_HTTP_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(10_000),
            user_agent: std::env::var("GEOMAP_USER_AGENT")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }
}

impl Default for MapAgentConfig {
    fn default() -> Self {
        Self {
            llm: LlmClientConfig::default(),
            agent: OrchestratorOptions::default(),
            http: HttpConfig::default(),
            geocoding: GeocodingConfig::default(),
            routing: RoutingConfig::default(),
            weather: WeatherConfig::default(),
            dispatcher_timeout_ms: std::env::var("GEOMAP_DISPATCH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_INVOCATION_TIMEOUT_MS),
        }
    }
}

impl MapAgentConfig {
    /// Load configuration from a TOML file (path via MAP_AGENT_CONFIG or ./map_agent.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let path = std::env::var("MAP_AGENT_CONFIG").unwrap_or_else(|_| "map_agent.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(p: &Path) -> Self {
        let default = Self::default();
        if !p.exists() {
            tracing::info!(target: "map_agent", path = %p.display(), "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<MapAgentToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "map_agent", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "map_agent", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct MapAgentToml {
    pub dispatcher_timeout_ms: Option<u64>,
    pub llm: Option<LlmToml>,
    pub agent: Option<AgentToml>,
    pub http: Option<HttpToml>,
    pub geocoding: Option<GeocodingToml>,
    pub routing: Option<RoutingToml>,
    pub weather: Option<WeatherToml>,
}

impl MapAgentToml {
    fn overlay(self, mut base: MapAgentConfig) -> MapAgentConfig {
        if let Some(t) = self.dispatcher_timeout_ms {
            base.dispatcher_timeout_ms = t;
        }
        if let Some(l) = self.llm {
            l.apply(&mut base.llm);
        }
        if let Some(a) = self.agent {
            a.apply(&mut base.agent);
        }
        if let Some(h) = self.http {
            h.apply(&mut base.http);
        }
        if let Some(g) = self.geocoding {
            g.apply(&mut base.geocoding);
        }
        if let Some(r) = self.routing {
            r.apply(&mut base.routing);
        }
        if let Some(w) = self.weather {
            w.apply(&mut base.weather);
        }
        base
    }
}

/// The API key is deliberately absent: it only comes from `OPENAI_API_KEY`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
struct LlmToml {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub temperature: Option<f32>,
}
impl LlmToml {
    fn apply(self, l: &mut LlmClientConfig) {
        if let Some(x) = self.base_url {
            l.base_url = x;
        }
        if let Some(x) = self.model {
            l.model = x;
        }
        if let Some(x) = self.request_timeout_ms {
            l.request_timeout_ms = x;
        }
        if let Some(x) = self.temperature {
            l.temperature = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct AgentToml {
    pub max_round_trips: Option<u32>,
    pub system_prompt: Option<String>,
}
impl AgentToml {
    fn apply(self, a: &mut OrchestratorOptions) {
        if let Some(x) = self.max_round_trips {
            a.max_round_trips = x.max(1);
        }
        if let Some(x) = self.system_prompt {
            a.system_prompt = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct HttpToml {
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
}
impl HttpToml {
    fn apply(self, h: &mut HttpConfig) {
        if let Some(x) = self.timeout_ms {
            h.timeout_ms = x;
        }
        if let Some(x) = self.user_agent.filter(|s| !s.is_empty()) {
            h.user_agent = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct GeocodingToml {
    pub endpoint: Option<String>,
    pub min_request_interval_ms: Option<u64>,
}
impl GeocodingToml {
    fn apply(self, g: &mut GeocodingConfig) {
        if let Some(x) = self.endpoint {
            g.endpoint = x;
        }
        if let Some(x) = self.min_request_interval_ms {
            g.min_request_interval_ms = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RoutingToml {
    pub osrm_endpoint: Option<String>,
    pub overpass_endpoint: Option<String>,
}
impl RoutingToml {
    fn apply(self, r: &mut RoutingConfig) {
        if let Some(x) = self.osrm_endpoint {
            r.osrm_endpoint = x;
        }
        if let Some(x) = self.overpass_endpoint {
            r.overpass_endpoint = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct WeatherToml {
    pub api_endpoint: Option<String>,
    pub units: Option<Units>,
}
impl WeatherToml {
    fn apply(self, w: &mut WeatherConfig) {
        if let Some(x) = self.api_endpoint {
            w.api_endpoint = x;
        }
        if let Some(x) = self.units {
            w.units = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("map_agent_{}_{name}.toml", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn overlay_replaces_only_given_fields() {
        let toml = r#"
            dispatcher_timeout_ms = 2000

            [agent]
            max_round_trips = 3

            [weather]
            units = "imperial"

            [geocoding]
            min_request_interval_ms = 0
        "#;
        let base = MapAgentConfig::default();
        let model = base.llm.model.clone();
        let cfg = toml::from_str::<MapAgentToml>(toml).unwrap().overlay(base);

        assert_eq!(cfg.dispatcher_timeout_ms, 2000);
        assert_eq!(cfg.agent.max_round_trips, 3);
        assert_eq!(cfg.weather.units, Units::Imperial);
        assert_eq!(cfg.geocoding.min_request_interval_ms, 0);
        assert_eq!(cfg.llm.model, model);
    }

    #[test]
    fn zero_round_trips_is_clamped() {
        let cfg = toml::from_str::<MapAgentToml>("[agent]\nmax_round_trips = 0")
            .unwrap()
            .overlay(MapAgentConfig::default());
        assert_eq!(cfg.agent.max_round_trips, 1);
    }

    #[test]
    fn api_key_is_not_read_from_toml() {
        let path = write_temp("key", "[llm]\napi_key = \"sk-from-file\"\nmodel = \"m\"");
        let cfg = MapAgentConfig::load_from(&path);
        let _ = fs::remove_file(&path);
        assert_ne!(cfg.llm.api_key.as_deref(), Some("sk-from-file"));
        assert_eq!(cfg.llm.model, "m");
    }

    #[test]
    fn missing_and_malformed_files_fall_back_to_defaults() {
        let defaults = MapAgentConfig::default();

        let missing = MapAgentConfig::load_from(Path::new("/nonexistent/map_agent.toml"));
        assert_eq!(missing.dispatcher_timeout_ms, defaults.dispatcher_timeout_ms);

        let path = write_temp("bad", "this is = = not toml");
        let malformed = MapAgentConfig::load_from(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(malformed.agent.max_round_trips, defaults.agent.max_round_trips);
    }
}
