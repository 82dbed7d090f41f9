//! Schema-checked decoding of model-supplied argument maps.
//!
//! Raw JSON never reaches a facade: [`OperationArgs::decode`] first checks the
//! map against the operation's [`OperationSpec`] (unknown keys, required keys,
//! types, ranges, coordinate bounds) and then builds a typed record.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ToolError, ToolResult};
use super::operation::Operation;
use super::registry::{OperationSpec, ParamType, ParameterSpec};
use crate::geo::GeoPoint;

pub const DEFAULT_GEOCODE_LIMIT: u32 = 5;
pub const DEFAULT_PLACE_LIMIT: u32 = 10;
pub const DEFAULT_PLACE_RADIUS_KM: f64 = 5.0;
pub const DEFAULT_NEARBY_RADIUS_KM: f64 = 1.0;
pub const DEFAULT_FORECAST_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Cycling,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Cycling => "cycling",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "driving" => Ok(TravelMode::Driving),
            "walking" => Ok(TravelMode::Walking),
            "cycling" => Ok(TravelMode::Cycling),
            other => Err(ToolError::Validation(format!("unknown travel mode '{other}'"))),
        }
    }
}

/// Typed argument record, one variant per operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationArgs {
    Geocode {
        address: String,
        limit: u32,
    },
    ReverseGeocode {
        location: GeoPoint,
    },
    SearchPlaces {
        query: String,
        near: Option<GeoPoint>,
        radius_km: f64,
        limit: u32,
    },
    CalculateRoute {
        origin: GeoPoint,
        destination: GeoPoint,
        mode: TravelMode,
    },
    DistanceMatrix {
        points: Vec<GeoPoint>,
    },
    FindNearby {
        center: GeoPoint,
        category: String,
        radius_km: f64,
    },
    GetWeather {
        location: GeoPoint,
    },
    WeatherForecast {
        location: GeoPoint,
        days: u32,
    },
    LocationWeatherInfo {
        address: String,
        include_forecast: bool,
    },
}

impl OperationArgs {
    pub fn operation(&self) -> Operation {
        match self {
            OperationArgs::Geocode { .. } => Operation::Geocode,
            OperationArgs::ReverseGeocode { .. } => Operation::ReverseGeocode,
            OperationArgs::SearchPlaces { .. } => Operation::SearchPlaces,
            OperationArgs::CalculateRoute { .. } => Operation::CalculateRoute,
            OperationArgs::DistanceMatrix { .. } => Operation::DistanceMatrix,
            OperationArgs::FindNearby { .. } => Operation::FindNearby,
            OperationArgs::GetWeather { .. } => Operation::GetWeather,
            OperationArgs::WeatherForecast { .. } => Operation::WeatherForecast,
            OperationArgs::LocationWeatherInfo { .. } => Operation::LocationWeatherInfo,
        }
    }

    /// Validate `args` against `spec` and build the typed record
    pub fn decode(spec: &OperationSpec, args: &Map<String, Value>) -> ToolResult<Self> {
        let v = validate_arguments(spec, args)?;
        let decoded = match spec.operation {
            Operation::Geocode => OperationArgs::Geocode {
                address: v.require_text("address")?,
                limit: v.count("limit").unwrap_or(DEFAULT_GEOCODE_LIMIT),
            },
            Operation::ReverseGeocode => OperationArgs::ReverseGeocode {
                location: v.require_point("location")?,
            },
            Operation::SearchPlaces => {
                let near = v.point("near");
                let radius = v.number("radius_km");
                if near.is_none() && radius.is_some() {
                    return Err(ToolError::Validation(
                        "radius_km is only meaningful together with 'near'".into(),
                    ));
                }
                OperationArgs::SearchPlaces {
                    query: v.require_text("query")?,
                    near,
                    radius_km: radius.unwrap_or(DEFAULT_PLACE_RADIUS_KM),
                    limit: v.count("limit").unwrap_or(DEFAULT_PLACE_LIMIT),
                }
            }
            Operation::CalculateRoute => OperationArgs::CalculateRoute {
                origin: v.require_point("origin")?,
                destination: v.require_point("destination")?,
                mode: match v.text("mode") {
                    Some(mode) => mode.parse()?,
                    None => TravelMode::default(),
                },
            },
            Operation::DistanceMatrix => OperationArgs::DistanceMatrix {
                points: v.require_points("points")?,
            },
            Operation::FindNearby => OperationArgs::FindNearby {
                center: v.require_point("center")?,
                category: v.require_text("category")?,
                radius_km: v.number("radius_km").unwrap_or(DEFAULT_NEARBY_RADIUS_KM),
            },
            Operation::GetWeather => OperationArgs::GetWeather {
                location: v.require_point("location")?,
            },
            Operation::WeatherForecast => OperationArgs::WeatherForecast {
                location: v.require_point("location")?,
                days: v.count("days").unwrap_or(DEFAULT_FORECAST_DAYS),
            },
            Operation::LocationWeatherInfo => OperationArgs::LocationWeatherInfo {
                address: v.require_text("address")?,
                include_forecast: v.boolean("include_forecast").unwrap_or(true),
            },
        };
        Ok(decoded)
    }
}

/// A single argument after type and range checks
#[derive(Debug, Clone, PartialEq)]
enum ArgValue {
    Text(String),
    Number(f64),
    Integer(i64),
    Bool(bool),
    Point(GeoPoint),
    Points(Vec<GeoPoint>),
}

/// Argument map that has passed [`validate_arguments`], defaults applied
#[derive(Debug, Clone, Default)]
struct ValidatedArgs {
    values: HashMap<String, ArgValue>,
}

impl ValidatedArgs {
    fn text(&self, name: &str) -> Option<String> {
        match self.values.get(name) {
            Some(ArgValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ArgValue::Number(n)) => Some(*n),
            Some(ArgValue::Integer(i)) => Some(*i as f64),
            _ => None,
        }
    }

    fn count(&self, name: &str) -> Option<u32> {
        match self.values.get(name) {
            Some(ArgValue::Integer(i)) => u32::try_from(*i).ok(),
            _ => None,
        }
    }

    fn boolean(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ArgValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    fn point(&self, name: &str) -> Option<GeoPoint> {
        match self.values.get(name) {
            Some(ArgValue::Point(p)) => Some(*p),
            _ => None,
        }
    }

    fn require_text(&self, name: &str) -> ToolResult<String> {
        self.text(name).ok_or_else(|| missing(name))
    }

    fn require_point(&self, name: &str) -> ToolResult<GeoPoint> {
        self.point(name).ok_or_else(|| missing(name))
    }

    fn require_points(&self, name: &str) -> ToolResult<Vec<GeoPoint>> {
        match self.values.get(name) {
            Some(ArgValue::Points(points)) => Ok(points.clone()),
            _ => Err(missing(name)),
        }
    }
}

fn missing(name: &str) -> ToolError {
    ToolError::Validation(format!("missing required parameter '{name}'"))
}

/// Check `args` against the declared parameters of `spec`.
///
/// Rejects unknown keys, missing required keys, wrong types, out-of-range
/// numbers and out-of-bounds coordinates. `null` counts as absent.
fn validate_arguments(spec: &OperationSpec, args: &Map<String, Value>) -> ToolResult<ValidatedArgs> {
    if let Some(unknown) = args.keys().find(|k| spec.parameter(k).is_none()) {
        return Err(ToolError::Validation(format!(
            "unknown parameter '{unknown}' for {}",
            spec.name()
        )));
    }

    let mut values = HashMap::new();
    for param in &spec.parameters {
        let raw = match args.get(&param.name) {
            None | Some(Value::Null) => param.default.as_ref(),
            Some(v) => Some(v),
        };
        match raw {
            Some(value) => {
                values.insert(param.name.clone(), coerce(param, value)?);
            }
            None if param.required => return Err(missing(&param.name)),
            None => {}
        }
    }
    Ok(ValidatedArgs { values })
}

fn coerce(param: &ParameterSpec, value: &Value) -> ToolResult<ArgValue> {
    let name = param.name.as_str();
    match &param.param_type {
        ParamType::String => {
            let s = value
                .as_str()
                .ok_or_else(|| type_error(name, "a string", value))?
                .trim();
            if s.is_empty() {
                return Err(ToolError::Validation(format!("'{name}' must not be empty")));
            }
            Ok(ArgValue::Text(s.to_string()))
        }
        ParamType::Number => {
            let n = value
                .as_f64()
                .filter(|n| n.is_finite())
                .ok_or_else(|| type_error(name, "a number", value))?;
            check_range(param, n)?;
            Ok(ArgValue::Number(n))
        }
        ParamType::Integer => {
            let i = value
                .as_i64()
                .or_else(|| {
                    value
                        .as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| f as i64)
                })
                .ok_or_else(|| type_error(name, "an integer", value))?;
            check_range(param, i as f64)?;
            Ok(ArgValue::Integer(i))
        }
        ParamType::Boolean => value
            .as_bool()
            .map(ArgValue::Bool)
            .ok_or_else(|| type_error(name, "a boolean", value)),
        ParamType::Enum(allowed) => {
            let s = value
                .as_str()
                .ok_or_else(|| type_error(name, "a string", value))?;
            if allowed.iter().any(|a| a == s) {
                Ok(ArgValue::Text(s.to_string()))
            } else {
                Err(ToolError::Validation(format!(
                    "'{name}' must be one of [{}], got '{s}'",
                    allowed.join(", ")
                )))
            }
        }
        ParamType::Coordinate => parse_point(name, value).map(ArgValue::Point),
        ParamType::CoordinateList { min, max } => {
            let items = value
                .as_array()
                .ok_or_else(|| type_error(name, "an array of coordinates", value))?;
            if items.len() < *min || items.len() > *max {
                return Err(ToolError::Validation(format!(
                    "'{name}' needs between {min} and {max} points, got {}",
                    items.len()
                )));
            }
            items
                .iter()
                .map(|item| parse_point(name, item))
                .collect::<ToolResult<Vec<_>>>()
                .map(ArgValue::Points)
        }
    }
}

fn check_range(param: &ParameterSpec, n: f64) -> ToolResult<()> {
    if let Some((min, max)) = param.range {
        if n < min || n > max {
            return Err(ToolError::Validation(format!(
                "'{}' must be between {min} and {max}, got {n}",
                param.name
            )));
        }
    }
    Ok(())
}

fn parse_point(name: &str, value: &Value) -> ToolResult<GeoPoint> {
    let (lat, lon) = match value {
        Value::Object(obj) => (
            obj.get("latitude").and_then(Value::as_f64),
            obj.get("longitude").and_then(Value::as_f64),
        ),
        Value::Array(pair) if pair.len() == 2 => (pair[0].as_f64(), pair[1].as_f64()),
        _ => (None, None),
    };
    match (lat, lon) {
        (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude)
            .map_err(|e| ToolError::Validation(format!("'{name}': {e}"))),
        _ => Err(type_error(name, "a {latitude, longitude} pair", value)),
    }
}

fn type_error(name: &str, expected: &str, got: &Value) -> ToolError {
    ToolError::Validation(format!("'{name}' must be {expected}, got {got}"))
}
