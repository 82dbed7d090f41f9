use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::not_served;
use crate::geo::{round2, GeoPoint};
use crate::tools::args::OperationArgs;
use crate::tools::catalog::{MAX_GEOCODE_RESULTS, MAX_PLACE_RESULTS, MAX_RADIUS_KM};
use crate::tools::transport::{decode_body, HttpTransport};
use crate::tools::{Facade, InvocationResult, OperationOutput, Server, ToolError, ToolResult};

/// Nominatim refuses bulk requests above this page size
const NOMINATIM_MAX_PAGE: u32 = 40;

/// Configuration for the geocoding facade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// Nominatim base URL (default: the public OpenStreetMap instance)
    pub endpoint: String,
    /// Minimum spacing between outbound requests; 0 disables throttling
    pub min_request_interval_ms: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("GEOMAP_NOMINATIM_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://nominatim.openstreetmap.org".to_string()),
            min_request_interval_ms: 1_000,
        }
    }
}

/// One candidate location for an address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeMatch {
    pub display_name: String,
    pub location: GeoPoint,
    pub kind: Option<String>,
    pub importance: Option<f64>,
    /// Structured address parts (`road`, `city`, `country`, ...)
    pub components: BTreeMap<String, String>,
}

/// Matches for an address, best first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeResult {
    pub query: String,
    pub matches: Vec<GeocodeMatch>,
}

impl GeocodeResult {
    pub fn best(&self) -> Option<&GeocodeMatch> {
        self.matches.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Address {
    pub display_name: String,
    pub location: GeoPoint,
    pub kind: Option<String>,
    pub components: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub name: String,
    pub location: GeoPoint,
    pub kind: Option<String>,
    pub category: Option<String>,
    /// Set when the search was anchored on a point
    pub distance_km: Option<f64>,
    pub components: BTreeMap<String, String>,
}

/// Places matching a query, nearest first when anchored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceSearch {
    pub query: String,
    pub near: Option<GeoPoint>,
    pub places: Vec<Place>,
}

/// Search/reverse item as returned by Nominatim (`format=json`)
#[derive(Debug, Deserialize)]
struct NominatimItem {
    display_name: String,
    lat: String,
    lon: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    class: Option<String>,
    importance: Option<f64>,
    #[serde(default)]
    address: BTreeMap<String, Value>,
}

impl NominatimItem {
    fn location(&self) -> ToolResult<GeoPoint> {
        let lat = self.lat.parse::<f64>();
        let lon = self.lon.parse::<f64>();
        match (lat, lon) {
            (Ok(lat), Ok(lon)) => GeoPoint::new(lat, lon).map_err(|e| {
                ToolError::UpstreamRejected(format!("geocoder returned an invalid point: {e}"))
            }),
            _ => Err(ToolError::UpstreamRejected(format!(
                "geocoder returned unparseable coordinates ({}, {})",
                self.lat, self.lon
            ))),
        }
    }

    fn components(&self) -> BTreeMap<String, String> {
        self.address
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect()
    }
}

/// Geocoding facade over the Nominatim search and reverse endpoints
pub struct GeocodingFacade {
    config: GeocodingConfig,
    transport: Arc<dyn HttpTransport>,
    last_request: Mutex<Option<Instant>>,
}

impl GeocodingFacade {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_config(GeocodingConfig::default(), transport)
    }

    pub fn with_config(config: GeocodingConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            last_request: Mutex::new(None),
        }
    }

    /// Keep at least `min_request_interval_ms` between requests (Nominatim usage policy).
    /// Callers queue here inside the dispatcher timeout.
    async fn throttle(&self) {
        if self.config.min_request_interval_ms == 0 {
            return;
        }
        let interval = Duration::from_millis(self.config.min_request_interval_ms);
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch(&self, path: &str, query: Vec<(String, String)>) -> ToolResult<Value> {
        self.throttle().await;
        let url = format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path);
        self.transport.get_json(&url, &query).await
    }

    /// Convert an address to candidate coordinates, best match first
    pub async fn geocode(&self, address: &str, limit: u32) -> ToolResult<GeocodeResult> {
        let address = non_empty("address", address)?;
        if !(1..=MAX_GEOCODE_RESULTS).contains(&limit) {
            return Err(ToolError::Validation(format!(
                "limit must be between 1 and {MAX_GEOCODE_RESULTS}"
            )));
        }

        debug!(target: "geocoding", address = %address, limit, "Geocoding address");
        let body = self
            .fetch(
                "search",
                vec![
                    ("q".into(), address.to_string()),
                    ("format".into(), "json".into()),
                    ("limit".into(), limit.to_string()),
                    ("addressdetails".into(), "1".into()),
                ],
            )
            .await?;
        let items: Vec<NominatimItem> = decode_body(body, "geocoding")?;

        let matches = items
            .iter()
            .map(|item| {
                Ok(GeocodeMatch {
                    display_name: item.display_name.clone(),
                    location: item.location()?,
                    kind: item.kind.clone(),
                    importance: item.importance,
                    components: item.components(),
                })
            })
            .collect::<ToolResult<Vec<_>>>()?;

        if matches.is_empty() {
            warn!(target: "geocoding", address = %address, "No geocoding match");
            return Err(ToolError::UpstreamRejected(format!(
                "no location found for '{address}'"
            )));
        }

        Ok(GeocodeResult {
            query: address.to_string(),
            matches,
        })
    }

    /// Convert a point to the nearest known address
    pub async fn reverse_geocode(&self, location: GeoPoint) -> ToolResult<Address> {
        location.validate()?;

        debug!(target: "geocoding", lat = location.latitude, lon = location.longitude, "Reverse geocoding");
        let body = self
            .fetch(
                "reverse",
                vec![
                    ("lat".into(), location.latitude.to_string()),
                    ("lon".into(), location.longitude.to_string()),
                    ("format".into(), "json".into()),
                    ("addressdetails".into(), "1".into()),
                ],
            )
            .await?;

        if let Some(reason) = body.get("error").and_then(Value::as_str) {
            return Err(ToolError::UpstreamRejected(format!(
                "reverse geocoding failed: {reason}"
            )));
        }
        let item: NominatimItem = decode_body(body, "reverse geocoding")?;

        Ok(Address {
            display_name: item.display_name.clone(),
            location,
            kind: item.kind.clone(),
            components: item.components(),
        })
    }

    /// Search for points of interest, optionally bounded around `near`
    pub async fn search_places(
        &self,
        query: &str,
        near: Option<GeoPoint>,
        radius_km: f64,
        limit: u32,
    ) -> ToolResult<PlaceSearch> {
        let query = non_empty("query", query)?;
        if let Some(point) = &near {
            point.validate()?;
        }
        if !(radius_km > 0.0 && radius_km <= MAX_RADIUS_KM) {
            return Err(ToolError::Validation(format!(
                "radius_km must be in (0, {MAX_RADIUS_KM}]"
            )));
        }
        if !(1..=MAX_PLACE_RESULTS).contains(&limit) {
            return Err(ToolError::Validation(format!(
                "limit must be between 1 and {MAX_PLACE_RESULTS}"
            )));
        }

        let mut params = vec![
            ("q".to_string(), query.to_string()),
            ("format".to_string(), "json".to_string()),
            ("addressdetails".to_string(), "1".to_string()),
        ];
        if let Some(point) = &near {
            // viewbox is a square, so over-fetch and trim by true distance below
            let (left, top, right, bottom) = point.viewbox(radius_km);
            params.push(("viewbox".into(), format!("{left},{top},{right},{bottom}")));
            params.push(("bounded".into(), "1".into()));
            params.push(("limit".into(), (limit * 2).min(NOMINATIM_MAX_PAGE).to_string()));
        } else {
            params.push(("limit".into(), limit.to_string()));
        }

        debug!(target: "geocoding", query = %query, anchored = near.is_some(), "Searching places");
        let body = self.fetch("search", params).await?;
        let items: Vec<NominatimItem> = decode_body(body, "place search")?;

        let mut places = Vec::with_capacity(items.len());
        for item in &items {
            let location = item.location()?;
            let distance_km = near.map(|p| round2(p.distance_km(&location)));
            if matches!(distance_km, Some(d) if d > radius_km) {
                continue;
            }
            places.push(Place {
                name: item.display_name.clone(),
                location,
                kind: item.kind.clone(),
                category: item.class.clone(),
                distance_km,
                components: item.components(),
            });
        }
        if near.is_some() {
            places.sort_by(|a, b| {
                a.distance_km
                    .unwrap_or(f64::INFINITY)
                    .total_cmp(&b.distance_km.unwrap_or(f64::INFINITY))
            });
        }
        places.truncate(limit as usize);

        Ok(PlaceSearch {
            query: query.to_string(),
            near,
            places,
        })
    }
}

fn non_empty<'a>(name: &str, value: &'a str) -> ToolResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ToolError::Validation(format!("{name} must not be empty")));
    }
    Ok(trimmed)
}

#[async_trait]
impl Facade for GeocodingFacade {
    fn server(&self) -> Server {
        Server::Geocoding
    }

    async fn execute(&self, args: &OperationArgs) -> InvocationResult {
        let result = match args {
            OperationArgs::Geocode { address, limit } => {
                self.geocode(address, *limit).await.map(OperationOutput::Geocode)
            }
            OperationArgs::ReverseGeocode { location } => self
                .reverse_geocode(*location)
                .await
                .map(OperationOutput::Address),
            OperationArgs::SearchPlaces {
                query,
                near,
                radius_km,
                limit,
            } => self
                .search_places(query, *near, *radius_km, *limit)
                .await
                .map(OperationOutput::Places),
            other => Err(not_served(Server::Geocoding, other.operation())),
        };
        result.into()
    }
}
