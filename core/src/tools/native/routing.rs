use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::not_served;
use crate::geo::{cardinal_direction, round1, round2, GeoPoint};
use crate::tools::args::{OperationArgs, TravelMode};
use crate::tools::catalog::{MAX_MATRIX_POINTS, MAX_NEARBY_RESULTS, MAX_RADIUS_KM, MIN_MATRIX_POINTS};
use crate::tools::transport::{decode_body, HttpTransport};
use crate::tools::{Facade, InvocationResult, OperationOutput, Server, ToolError, ToolResult};

/// Configuration for the routing facade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// OSRM-compatible routing service base URL
    pub osrm_endpoint: String,
    /// Overpass API interpreter URL used for nearby POI lookups
    pub overpass_endpoint: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            osrm_endpoint: std::env::var("GEOMAP_OSRM_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://router.project-osrm.org".to_string()),
            overpass_endpoint: std::env::var("GEOMAP_OVERPASS_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://overpass-api.de/api/interpreter".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStep {
    pub instruction: String,
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub mode: TravelMode,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub distance_km: f64,
    pub duration_minutes: f64,
    pub duration_text: String,
    /// Google encoded polyline (precision 5)
    pub polyline: String,
    pub steps: Vec<RouteStep>,
    pub straight_line_km: f64,
    pub bearing: f64,
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixCell {
    pub origin_index: usize,
    pub destination_index: usize,
    pub straight_line_km: f64,
    /// `None` when the router found no path
    pub distance_km: Option<f64>,
    pub duration_minutes: Option<f64>,
}

/// N×N table; `rows[i][j]` is the trip from `points[i]` to `points[j]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceMatrix {
    pub points: Vec<GeoPoint>,
    pub rows: Vec<Vec<MatrixCell>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Poi {
    pub name: Option<String>,
    pub location: GeoPoint,
    pub category: String,
    pub distance_km: f64,
    pub bearing: f64,
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyResult {
    pub center: GeoPoint,
    pub category: String,
    pub radius_km: f64,
    pub pois: Vec<Poi>,
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: String,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    distance: f64,
    #[serde(default)]
    name: String,
    maneuver: OsrmManeuver,
}

#[derive(Debug, Deserialize)]
struct OsrmManeuver {
    #[serde(rename = "type")]
    kind: String,
    modifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    message: Option<String>,
    distances: Option<Vec<Vec<Option<f64>>>>,
    durations: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn location(&self) -> Option<GeoPoint> {
        let (lat, lon) = match (&self.center, self.lat, self.lon) {
            (_, Some(lat), Some(lon)) => (lat, lon),
            (Some(c), _, _) => (c.lat, c.lon),
            _ => return None,
        };
        GeoPoint::new(lat, lon).ok()
    }
}

/// Routing facade over an OSRM router and the Overpass POI index
pub struct RoutingFacade {
    config: RoutingConfig,
    transport: Arc<dyn HttpTransport>,
}

impl RoutingFacade {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_config(RoutingConfig::default(), transport)
    }

    pub fn with_config(config: RoutingConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    fn osrm_url(&self, service: &str, profile: &str, points: &[GeoPoint]) -> String {
        let coords = points
            .iter()
            .map(|p| format!("{},{}", p.longitude, p.latitude))
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "{}/{service}/v1/{profile}/{coords}",
            self.config.osrm_endpoint.trim_end_matches('/')
        )
    }

    /// Route between two points with polyline, distance, duration and steps
    pub async fn calculate_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        mode: TravelMode,
    ) -> ToolResult<Route> {
        origin.validate()?;
        destination.validate()?;

        let url = self.osrm_url("route", osrm_profile(mode), &[origin, destination]);
        debug!(target: "routing", mode = %mode, "Requesting route");
        let body = self
            .transport
            .get_json(
                &url,
                &[
                    ("overview".into(), "full".into()),
                    ("geometries".into(), "polyline".into()),
                    ("steps".into(), "true".into()),
                ],
            )
            .await?;
        let resp: OsrmRouteResponse = decode_body(body, "route")?;
        ensure_ok(&resp.code, resp.message.as_deref())?;

        let route = resp
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::UpstreamRejected("router returned no route".into()))?;

        let steps = route
            .legs
            .iter()
            .flat_map(|leg| leg.steps.iter())
            .map(|step| RouteStep {
                instruction: describe_step(step),
                distance_km: round2(step.distance / 1000.0),
            })
            .collect();

        let duration_minutes = route.duration / 60.0;
        let bearing = origin.bearing_to(&destination);
        Ok(Route {
            mode,
            origin,
            destination,
            distance_km: round2(route.distance / 1000.0),
            duration_minutes: round1(duration_minutes),
            duration_text: duration_text(duration_minutes),
            polyline: route.geometry,
            steps,
            straight_line_km: round2(origin.distance_km(&destination)),
            bearing: round1(bearing),
            direction: cardinal_direction(bearing).to_string(),
        })
    }

    /// Pairwise distance/duration table; the diagonal is always zero
    pub async fn distance_matrix(&self, points: &[GeoPoint]) -> ToolResult<DistanceMatrix> {
        if points.len() < MIN_MATRIX_POINTS || points.len() > MAX_MATRIX_POINTS {
            return Err(ToolError::Validation(format!(
                "distance_matrix needs between {MIN_MATRIX_POINTS} and {MAX_MATRIX_POINTS} points, got {}",
                points.len()
            )));
        }
        for point in points {
            point.validate()?;
        }

        let n = points.len();
        let url = self.osrm_url("table", "driving", points);
        debug!(target: "routing", points = n, "Requesting distance table");
        let body = self
            .transport
            .get_json(&url, &[("annotations".into(), "distance,duration".into())])
            .await?;
        let resp: OsrmTableResponse = decode_body(body, "distance table")?;
        ensure_ok(&resp.code, resp.message.as_deref())?;

        let distances = square(resp.distances, n, "distances")?;
        let durations = square(resp.durations, n, "durations")?;

        let rows: Vec<Vec<MatrixCell>> = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            return MatrixCell {
                                origin_index: i,
                                destination_index: j,
                                straight_line_km: 0.0,
                                distance_km: Some(0.0),
                                duration_minutes: Some(0.0),
                            };
                        }
                        MatrixCell {
                            origin_index: i,
                            destination_index: j,
                            straight_line_km: round2(points[i].distance_km(&points[j])),
                            distance_km: distances[i][j].map(|m| round2(m / 1000.0)),
                            duration_minutes: durations[i][j].map(|s| round1(s / 60.0)),
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(DistanceMatrix {
            points: points.to_vec(),
            rows,
        })
    }

    /// Amenities of `category` within `radius_km` of `center`, nearest first
    pub async fn find_nearby(
        &self,
        center: GeoPoint,
        category: &str,
        radius_km: f64,
    ) -> ToolResult<NearbyResult> {
        center.validate()?;
        let category = category.trim().to_ascii_lowercase();
        if category.is_empty()
            || category.len() > 40
            || !category.chars().all(|c| c.is_ascii_lowercase() || c == '_')
        {
            return Err(ToolError::Validation(format!(
                "category must be an OpenStreetMap amenity value like 'cafe', got '{category}'"
            )));
        }
        if !(radius_km > 0.0 && radius_km <= MAX_RADIUS_KM) {
            return Err(ToolError::Validation(format!(
                "radius_km must be in (0, {MAX_RADIUS_KM}]"
            )));
        }

        let radius_m = (radius_km * 1000.0).round() as u64;
        let query = format!(
            "[out:json][timeout:25];nwr[\"amenity\"=\"{category}\"](around:{radius_m},{},{});out center 100;",
            center.latitude, center.longitude
        );
        debug!(target: "routing", category = %category, radius_km, "Searching nearby amenities");
        let body = self
            .transport
            .get_json(&self.config.overpass_endpoint, &[("data".into(), query)])
            .await?;
        let resp: OverpassResponse = decode_body(body, "overpass")?;

        let mut pois: Vec<Poi> = resp
            .elements
            .iter()
            .filter_map(|el| {
                let location = el.location()?;
                let distance = center.distance_km(&location);
                if distance > radius_km {
                    return None;
                }
                let bearing = center.bearing_to(&location);
                Some(Poi {
                    name: el.tags.get("name").and_then(Value::as_str).map(String::from),
                    location,
                    category: category.clone(),
                    distance_km: round2(distance),
                    bearing: round1(bearing),
                    direction: cardinal_direction(bearing).to_string(),
                })
            })
            .collect();
        if pois.len() < resp.elements.len() {
            debug!(target: "routing", dropped = resp.elements.len() - pois.len(), "Dropped elements without position or outside radius");
        }
        pois.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        pois.truncate(MAX_NEARBY_RESULTS);

        Ok(NearbyResult {
            center,
            category,
            radius_km,
            pois,
        })
    }
}

fn osrm_profile(mode: TravelMode) -> &'static str {
    match mode {
        TravelMode::Driving => "driving",
        TravelMode::Walking => "foot",
        TravelMode::Cycling => "bike",
    }
}

fn ensure_ok(code: &str, message: Option<&str>) -> ToolResult<()> {
    if code == "Ok" {
        return Ok(());
    }
    warn!(target: "routing", code = %code, "Router refused request");
    Err(ToolError::UpstreamRejected(format!(
        "router answered {code}: {}",
        message.unwrap_or("no details")
    )))
}

fn square(
    table: Option<Vec<Vec<Option<f64>>>>,
    n: usize,
    what: &str,
) -> ToolResult<Vec<Vec<Option<f64>>>> {
    let table = table.ok_or_else(|| {
        ToolError::UpstreamRejected(format!("distance table response has no {what}"))
    })?;
    if table.len() != n || table.iter().any(|row| row.len() != n) {
        return Err(ToolError::UpstreamRejected(format!(
            "distance table {what} is not {n}x{n}"
        )));
    }
    Ok(table)
}

fn describe_step(step: &OsrmStep) -> String {
    let road = if step.name.is_empty() {
        String::new()
    } else {
        format!(" onto {}", step.name)
    };
    let modifier = step.modifier_text();
    match step.maneuver.kind.as_str() {
        "depart" => format!("Head out{road}"),
        "arrive" => "Arrive at destination".to_string(),
        "turn" | "end of road" | "fork" => format!("Turn{modifier}{road}"),
        "roundabout" | "rotary" => format!("Take the roundabout{road}"),
        "merge" | "on ramp" | "off ramp" => format!("Take the ramp{modifier}{road}"),
        _ => format!("Continue{modifier}{road}"),
    }
}

impl OsrmStep {
    fn modifier_text(&self) -> String {
        self.maneuver
            .modifier
            .as_deref()
            .map(|m| format!(" {m}"))
            .unwrap_or_default()
    }
}

fn duration_text(minutes: f64) -> String {
    let total = minutes.round() as u64;
    if total >= 60 {
        format!("{}h {}m", total / 60, total % 60)
    } else {
        format!("{total} min")
    }
}

#[async_trait]
impl Facade for RoutingFacade {
    fn server(&self) -> Server {
        Server::Routing
    }

    async fn execute(&self, args: &OperationArgs) -> InvocationResult {
        let result = match args {
            OperationArgs::CalculateRoute {
                origin,
                destination,
                mode,
            } => self
                .calculate_route(*origin, *destination, *mode)
                .await
                .map(OperationOutput::Route),
            OperationArgs::DistanceMatrix { points } => self
                .distance_matrix(points)
                .await
                .map(OperationOutput::DistanceMatrix),
            OperationArgs::FindNearby {
                center,
                category,
                radius_km,
            } => self
                .find_nearby(*center, category, *radius_km)
                .await
                .map(OperationOutput::Nearby),
            other => Err(not_served(Server::Routing, other.operation())),
        };
        result.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::transport::MockHttpTransport;
    use crate::tools::FailureKind;
    use serde_json::json;

    fn facade(mock: MockHttpTransport) -> RoutingFacade {
        RoutingFacade::with_config(
            RoutingConfig {
                osrm_endpoint: "http://osrm.test".into(),
                overpass_endpoint: "http://overpass.test/api/interpreter".into(),
            },
            Arc::new(mock),
        )
    }

    fn sf() -> GeoPoint {
        GeoPoint::new(37.7749, -122.4194).unwrap()
    }

    fn la() -> GeoPoint {
        GeoPoint::new(34.0522, -118.2437).unwrap()
    }

    #[tokio::test]
    async fn route_maps_osrm_response() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get_json()
            .withf(|url, _| url == "http://osrm.test/route/v1/driving/-122.4194,37.7749;-118.2437,34.0522")
            .times(1)
            .returning(|_, _| {
                Ok(json!({
                    "code": "Ok",
                    "routes": [{
                        "distance": 616_000.0,
                        "duration": 21_600.0,
                        "geometry": "_p~iF~ps|U_ulLnnqC",
                        "legs": [{"steps": [
                            {"distance": 1200.0, "name": "Market Street", "maneuver": {"type": "depart"}},
                            {"distance": 614800.0, "name": "I-5 S", "maneuver": {"type": "turn", "modifier": "left"}},
                            {"distance": 0.0, "name": "", "maneuver": {"type": "arrive"}}
                        ]}]
                    }]
                }))
            });

        let route = facade(mock)
            .calculate_route(sf(), la(), TravelMode::Driving)
            .await
            .unwrap();
        assert_eq!(route.distance_km, 616.0);
        assert_eq!(route.duration_minutes, 360.0);
        assert_eq!(route.duration_text, "6h 0m");
        assert_eq!(route.polyline, "_p~iF~ps|U_ulLnnqC");
        assert_eq!(route.steps.len(), 3);
        assert_eq!(route.steps[1].instruction, "Turn left onto I-5 S");
        assert_eq!(route.direction, "Southeast");
    }

    #[tokio::test]
    async fn route_without_path_is_rejected() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get_json()
            .times(1)
            .returning(|_, _| Ok(json!({"code": "NoRoute", "message": "Impossible route", "routes": []})));
        let err = facade(mock)
            .calculate_route(sf(), la(), TravelMode::Walking)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UpstreamRejected(_)));
    }

    #[tokio::test]
    async fn invalid_points_fail_before_network() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get_json().times(0);
        let f = facade(mock);
        let bad = GeoPoint {
            latitude: 0.0,
            longitude: 181.0,
        };

        let r = f
            .execute(&OperationArgs::CalculateRoute {
                origin: sf(),
                destination: bad,
                mode: TravelMode::Driving,
            })
            .await;
        assert_eq!(r.failure_kind(), Some(FailureKind::Validation));

        let r = f
            .execute(&OperationArgs::DistanceMatrix {
                points: vec![sf(), bad],
            })
            .await;
        assert_eq!(r.failure_kind(), Some(FailureKind::Validation));

        let r = f
            .execute(&OperationArgs::FindNearby {
                center: bad,
                category: "cafe".into(),
                radius_km: 1.0,
            })
            .await;
        assert_eq!(r.failure_kind(), Some(FailureKind::Validation));
    }

    #[tokio::test]
    async fn matrix_is_square_with_zero_diagonal() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get_json()
            .withf(|url, _| url.starts_with("http://osrm.test/table/v1/driving/"))
            .times(1)
            .returning(|_, _| {
                // routers report small non-zero self-distances after snapping
                Ok(json!({
                    "code": "Ok",
                    "distances": [[3.2, 616000.0, 1000.0], [615000.0, 0.0, null], [1000.0, null, 1.1]],
                    "durations": [[0.4, 21600.0, 120.0], [21500.0, 0.0, null], [118.0, null, 0.2]]
                }))
            });
        let points = vec![sf(), la(), GeoPoint::new(37.78, -122.41).unwrap()];
        let matrix = facade(mock).distance_matrix(&points).await.unwrap();

        assert_eq!(matrix.rows.len(), 3);
        for (i, row) in matrix.rows.iter().enumerate() {
            assert_eq!(row.len(), 3);
            assert_eq!(row[i].distance_km, Some(0.0));
            assert_eq!(row[i].duration_minutes, Some(0.0));
        }
        assert_eq!(matrix.rows[0][1].distance_km, Some(616.0));
        assert_eq!(matrix.rows[1][2].distance_km, None);
    }

    #[tokio::test]
    async fn malformed_matrix_is_rejected() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get_json().times(1).returning(|_, _| {
            Ok(json!({"code": "Ok", "distances": [[0.0]], "durations": [[0.0]]}))
        });
        let err = facade(mock).distance_matrix(&[sf(), la()]).await.unwrap_err();
        assert!(matches!(err, ToolError::UpstreamRejected(_)));
    }

    #[tokio::test]
    async fn nearby_sorted_and_filtered_by_radius() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get_json()
            .withf(|url, query| {
                url == "http://overpass.test/api/interpreter"
                    && query[0].1.contains("\"amenity\"=\"cafe\"")
                    && query[0].1.contains("around:1000,")
            })
            .times(1)
            .returning(|_, _| {
                Ok(json!({"elements": [
                    {"type": "node", "lat": 37.7800, "lon": -122.4194, "tags": {"name": "Farther"}},
                    {"type": "way", "center": {"lat": 37.7752, "lon": -122.4194}, "tags": {"name": "Closest"}},
                    {"type": "node", "lat": 37.9000, "lon": -122.4194, "tags": {"name": "Way out"}},
                    {"type": "relation", "tags": {"name": "No position"}}
                ]}))
            });
        let nearby = facade(mock).find_nearby(sf(), "Cafe", 1.0).await.unwrap();
        let names: Vec<_> = nearby.pois.iter().map(|p| p.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["Closest", "Farther"]);
        assert_eq!(nearby.pois[0].direction, "North");
    }

    #[tokio::test]
    async fn nearby_category_is_sanitized() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get_json().times(0);
        let err = facade(mock)
            .find_nearby(sf(), "cafe\"];out;", 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[test]
    fn duration_text_formats() {
        assert_eq!(duration_text(45.4), "45 min");
        assert_eq!(duration_text(125.0), "2h 5m");
    }
}
