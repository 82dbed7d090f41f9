use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ToolError;

/// The three backing servers. Each is served by exactly one facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Server {
    Geocoding,
    Routing,
    Weather,
}

impl Server {
    pub fn name(&self) -> &'static str {
        match self {
            Server::Geocoding => "geocoding",
            Server::Routing => "routing",
            Server::Weather => "weather",
        }
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Closed set of callable operations. Routing matches on this tag; tool
/// names coming back from the model are parsed into it with [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Geocode,
    ReverseGeocode,
    SearchPlaces,
    CalculateRoute,
    DistanceMatrix,
    FindNearby,
    GetWeather,
    WeatherForecast,
    LocationWeatherInfo,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Geocode,
        Operation::ReverseGeocode,
        Operation::SearchPlaces,
        Operation::CalculateRoute,
        Operation::DistanceMatrix,
        Operation::FindNearby,
        Operation::GetWeather,
        Operation::WeatherForecast,
        Operation::LocationWeatherInfo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Geocode => "geocode",
            Operation::ReverseGeocode => "reverse_geocode",
            Operation::SearchPlaces => "search_places",
            Operation::CalculateRoute => "calculate_route",
            Operation::DistanceMatrix => "distance_matrix",
            Operation::FindNearby => "find_nearby",
            Operation::GetWeather => "get_weather",
            Operation::WeatherForecast => "weather_forecast",
            Operation::LocationWeatherInfo => "location_weather_info",
        }
    }

    pub fn server(&self) -> Server {
        match self {
            Operation::Geocode | Operation::ReverseGeocode | Operation::SearchPlaces => {
                Server::Geocoding
            }
            Operation::CalculateRoute | Operation::DistanceMatrix | Operation::FindNearby => {
                Server::Routing
            }
            Operation::GetWeather
            | Operation::WeatherForecast
            | Operation::LocationWeatherInfo => Server::Weather,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| ToolError::Validation(format!("unknown operation '{s}'")))
    }
}
