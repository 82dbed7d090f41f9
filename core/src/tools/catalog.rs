//! Declarations of the built-in geocoding, routing and weather operations.
//!
//! The order here is the order the model sees the tools in.

use serde_json::json;

use super::operation::Operation;
use super::registry::{OperationSpec, ParamType, ParameterSpec};

pub const MAX_GEOCODE_RESULTS: u32 = 10;
pub const MAX_PLACE_RESULTS: u32 = 20;
pub const MAX_NEARBY_RESULTS: usize = 20;
pub const MAX_RADIUS_KM: f64 = 50.0;
pub const MAX_FORECAST_DAYS: u32 = 16;
pub const MIN_MATRIX_POINTS: usize = 2;
pub const MAX_MATRIX_POINTS: usize = 25;
pub const TRAVEL_MODES: [&str; 3] = ["driving", "walking", "cycling"];

pub fn builtin_operations() -> Vec<OperationSpec> {
    vec![
        // geocoding
        OperationSpec::new(
            Operation::Geocode,
            "Convert an address or place name to geographic coordinates (latitude/longitude)",
            vec![
                ParameterSpec::required(
                    "address",
                    ParamType::String,
                    "The address or place name to geocode (e.g. 'Eiffel Tower, Paris')",
                ),
                ParameterSpec::optional("limit", ParamType::Integer, "Maximum number of matches")
                    .with_default(json!(5))
                    .with_range(1.0, MAX_GEOCODE_RESULTS as f64),
            ],
        ),
        OperationSpec::new(
            Operation::ReverseGeocode,
            "Convert geographic coordinates to a street address",
            vec![ParameterSpec::required(
                "location",
                ParamType::Coordinate,
                "The point to look up",
            )],
        ),
        OperationSpec::new(
            Operation::SearchPlaces,
            "Search for points of interest (restaurants, museums, coffee shops, ...) by name or category, optionally near a point; results are ordered nearest-first",
            vec![
                ParameterSpec::required(
                    "query",
                    ParamType::String,
                    "What to search for (e.g. 'coffee shop', 'museum')",
                ),
                ParameterSpec::optional("near", ParamType::Coordinate, "Optional point to search around"),
                ParameterSpec::optional(
                    "radius_km",
                    ParamType::Number,
                    "Search radius around 'near' in kilometres (default 5)",
                )
                .with_range(0.1, MAX_RADIUS_KM),
                ParameterSpec::optional("limit", ParamType::Integer, "Maximum number of places")
                    .with_default(json!(10))
                    .with_range(1.0, MAX_PLACE_RESULTS as f64),
            ],
        ),
        // routing
        OperationSpec::new(
            Operation::CalculateRoute,
            "Calculate a route between two points: encoded polyline, distance, duration and turn steps",
            vec![
                ParameterSpec::required("origin", ParamType::Coordinate, "Starting point"),
                ParameterSpec::required("destination", ParamType::Coordinate, "Destination point"),
                ParameterSpec::optional(
                    "mode",
                    ParamType::Enum(TRAVEL_MODES.iter().map(|m| m.to_string()).collect()),
                    "Transportation mode",
                )
                .with_default(json!("driving")),
            ],
        ),
        OperationSpec::new(
            Operation::DistanceMatrix,
            "Pairwise driving distances and durations between several points",
            vec![ParameterSpec::required(
                "points",
                ParamType::CoordinateList {
                    min: MIN_MATRIX_POINTS,
                    max: MAX_MATRIX_POINTS,
                },
                "Points to compare; the table is indexed in this order",
            )],
        ),
        OperationSpec::new(
            Operation::FindNearby,
            "Find points of interest of an OpenStreetMap amenity category (e.g. 'cafe', 'pharmacy') within a radius, nearest first",
            vec![
                ParameterSpec::required("center", ParamType::Coordinate, "Centre of the search"),
                ParameterSpec::required(
                    "category",
                    ParamType::String,
                    "OpenStreetMap amenity value such as 'restaurant', 'cafe', 'fuel'",
                ),
                ParameterSpec::optional("radius_km", ParamType::Number, "Search radius in kilometres")
                    .with_default(json!(1.0))
                    .with_range(0.05, MAX_RADIUS_KM),
            ],
        ),
        // weather
        OperationSpec::new(
            Operation::GetWeather,
            "Get current weather conditions at a point",
            vec![ParameterSpec::required(
                "location",
                ParamType::Coordinate,
                "Where to read the weather",
            )],
        ),
        OperationSpec::new(
            Operation::WeatherForecast,
            "Get a daily weather forecast (1-16 days) for a point",
            vec![
                ParameterSpec::required("location", ParamType::Coordinate, "Forecast location"),
                ParameterSpec::optional("days", ParamType::Integer, "Number of days to forecast")
                    .with_default(json!(7))
                    .with_range(1.0, MAX_FORECAST_DAYS as f64),
            ],
        ),
        OperationSpec::new(
            Operation::LocationWeatherInfo,
            "Geocode an address and return its coordinates together with current weather (and optionally a 5-day forecast)",
            vec![
                ParameterSpec::required("address", ParamType::String, "Address or place name"),
                ParameterSpec::optional(
                    "include_forecast",
                    ParamType::Boolean,
                    "Also include a 5-day forecast",
                )
                .with_default(json!(true)),
            ],
        ),
    ]
}
