use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::geocoding::GeocodingFacade;
use super::not_served;
use crate::geo::GeoPoint;
use crate::tools::args::OperationArgs;
use crate::tools::catalog::MAX_FORECAST_DAYS;
use crate::tools::transport::{decode_body, HttpTransport};
use crate::tools::{Facade, InvocationResult, OperationOutput, Server, ToolError, ToolResult};

/// Days of forecast attached by `location_weather_info`
pub const COMPOSITE_FORECAST_DAYS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// °C, km/h, mm
    #[default]
    Metric,
    /// °F, mph, inch
    Imperial,
}

impl Units {
    fn query(&self) -> [(String, String); 3] {
        let (temperature, wind, precipitation) = match self {
            Units::Metric => ("celsius", "kmh", "mm"),
            Units::Imperial => ("fahrenheit", "mph", "inch"),
        };
        [
            ("temperature_unit".into(), temperature.into()),
            ("wind_speed_unit".into(), wind.into()),
            ("precipitation_unit".into(), precipitation.into()),
        ]
    }
}

/// Configuration for the weather facade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// API endpoint (default: Open-Meteo)
    pub api_endpoint: String,
    pub units: Units,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_endpoint: std::env::var("GEOMAP_OPEN_METEO_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://api.open-meteo.com/v1/forecast".to_string()),
            units: Units::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentConditions {
    pub location: GeoPoint,
    pub time: String,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub weather_code: i32,
    pub description: String,
    pub is_day: bool,
    pub units: Units,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temperature_max: Option<f64>,
    pub temperature_min: Option<f64>,
    pub precipitation: Option<f64>,
    pub weather_code: Option<i32>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub location: GeoPoint,
    pub units: Units,
    pub days: Vec<DailyForecast>,
}

/// Geocoded address plus the weather found there
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationWeather {
    pub query: String,
    pub name: String,
    pub location: GeoPoint,
    pub current: CurrentConditions,
    pub forecast: Option<Vec<DailyForecast>>,
}

/// Weather response from Open-Meteo
#[derive(Debug, Deserialize)]
struct CurrentResponse {
    current: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    time: String,
    temperature_2m: f64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
    wind_direction_10m: f64,
    weather_code: i32,
    is_day: u8,
}

#[derive(Debug, Deserialize)]
struct DailyResponse {
    daily: DailySeries,
}

#[derive(Debug, Deserialize)]
struct DailySeries {
    time: Vec<String>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    precipitation_sum: Vec<Option<f64>>,
    weather_code: Vec<Option<i32>>,
}

/// Weather facade over the Open-Meteo forecast API.
///
/// `location_weather_info` resolves its address through the geocoding facade
/// first; this is the only facade-to-facade edge in the crate.
pub struct WeatherFacade {
    config: WeatherConfig,
    transport: Arc<dyn HttpTransport>,
    geocoder: Arc<GeocodingFacade>,
}

impl WeatherFacade {
    pub fn new(transport: Arc<dyn HttpTransport>, geocoder: Arc<GeocodingFacade>) -> Self {
        Self::with_config(WeatherConfig::default(), transport, geocoder)
    }

    pub fn with_config(
        config: WeatherConfig,
        transport: Arc<dyn HttpTransport>,
        geocoder: Arc<GeocodingFacade>,
    ) -> Self {
        Self {
            config,
            transport,
            geocoder,
        }
    }

    fn base_query(&self, location: &GeoPoint) -> Vec<(String, String)> {
        let mut query = vec![
            ("latitude".to_string(), location.latitude.to_string()),
            ("longitude".to_string(), location.longitude.to_string()),
            ("timezone".to_string(), "auto".to_string()),
        ];
        query.extend(self.config.units.query());
        query
    }

    /// Current conditions at a point
    pub async fn get_weather(&self, location: GeoPoint) -> ToolResult<CurrentConditions> {
        location.validate()?;

        debug!(target: "weather", lat = location.latitude, lon = location.longitude, "Fetching current weather");
        let mut query = self.base_query(&location);
        query.push((
            "current".into(),
            "temperature_2m,relative_humidity_2m,wind_speed_10m,wind_direction_10m,weather_code,is_day"
                .into(),
        ));
        let body = self.transport.get_json(&self.config.api_endpoint, &query).await?;
        let current = decode_body::<CurrentResponse>(body, "current weather")?.current;

        Ok(CurrentConditions {
            location,
            time: current.time,
            temperature: current.temperature_2m,
            humidity: current.relative_humidity_2m,
            wind_speed: current.wind_speed_10m,
            wind_direction: current.wind_direction_10m,
            weather_code: current.weather_code,
            description: interpret_weather_code(current.weather_code).to_string(),
            is_day: current.is_day == 1,
            units: self.config.units,
        })
    }

    /// Daily forecast for `days` days (1-16), in date order
    pub async fn weather_forecast(&self, location: GeoPoint, days: u32) -> ToolResult<Forecast> {
        location.validate()?;
        if !(1..=MAX_FORECAST_DAYS).contains(&days) {
            return Err(ToolError::Validation(format!(
                "days must be between 1 and {MAX_FORECAST_DAYS}, got {days}"
            )));
        }

        debug!(target: "weather", lat = location.latitude, lon = location.longitude, days, "Fetching forecast");
        let mut query = self.base_query(&location);
        query.push((
            "daily".into(),
            "temperature_2m_max,temperature_2m_min,precipitation_sum,weather_code".into(),
        ));
        query.push(("forecast_days".into(), days.to_string()));
        let body = self.transport.get_json(&self.config.api_endpoint, &query).await?;
        let daily = decode_body::<DailyResponse>(body, "forecast")?.daily;

        let n = daily.time.len();
        if [
            daily.temperature_2m_max.len(),
            daily.temperature_2m_min.len(),
            daily.precipitation_sum.len(),
            daily.weather_code.len(),
        ]
        .iter()
        .any(|&len| len != n)
        {
            return Err(ToolError::UpstreamRejected(
                "forecast series have mismatched lengths".into(),
            ));
        }
        if n < days as usize {
            warn!(target: "weather", expected = days, got = n, "Short forecast");
            return Err(ToolError::UpstreamRejected(format!(
                "forecast returned {n} days, expected {days}"
            )));
        }

        let mut records = (0..n)
            .map(|i| {
                let date = NaiveDate::parse_from_str(&daily.time[i], "%Y-%m-%d").map_err(|e| {
                    ToolError::UpstreamRejected(format!("bad forecast date '{}': {e}", daily.time[i]))
                })?;
                let code = daily.weather_code[i];
                Ok(DailyForecast {
                    date,
                    temperature_max: daily.temperature_2m_max[i],
                    temperature_min: daily.temperature_2m_min[i],
                    precipitation: daily.precipitation_sum[i],
                    weather_code: code,
                    description: code
                        .map(interpret_weather_code)
                        .unwrap_or("Unknown")
                        .to_string(),
                })
            })
            .collect::<ToolResult<Vec<_>>>()?;
        records.sort_by_key(|r| r.date);
        records.truncate(days as usize);

        Ok(Forecast {
            location,
            units: self.config.units,
            days: records,
        })
    }

    /// Geocode `address`, then read the weather there
    pub async fn location_weather_info(
        &self,
        address: &str,
        include_forecast: bool,
    ) -> ToolResult<LocationWeather> {
        if address.trim().is_empty() {
            return Err(ToolError::Validation("address must not be empty".into()));
        }

        let geocoded = self.geocoder.geocode(address, 1).await?;
        let best = geocoded.best().ok_or_else(|| {
            ToolError::UpstreamRejected(format!("no location found for '{address}'"))
        })?;

        let current = self.get_weather(best.location).await?;
        let forecast = if include_forecast {
            Some(
                self.weather_forecast(best.location, COMPOSITE_FORECAST_DAYS)
                    .await?
                    .days,
            )
        } else {
            None
        };

        Ok(LocationWeather {
            query: geocoded.query.clone(),
            name: best.display_name.clone(),
            location: best.location,
            current,
            forecast,
        })
    }
}

/// WMO weather interpretation codes (WW)
pub fn interpret_weather_code(code: i32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Foggy",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow",
        73 => "Moderate snow",
        75 => "Heavy snow",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown",
    }
}

#[async_trait]
impl Facade for WeatherFacade {
    fn server(&self) -> Server {
        Server::Weather
    }

    async fn execute(&self, args: &OperationArgs) -> InvocationResult {
        let result = match args {
            OperationArgs::GetWeather { location } => {
                self.get_weather(*location).await.map(OperationOutput::Current)
            }
            OperationArgs::WeatherForecast { location, days } => self
                .weather_forecast(*location, *days)
                .await
                .map(OperationOutput::Forecast),
            OperationArgs::LocationWeatherInfo {
                address,
                include_forecast,
            } => self
                .location_weather_info(address, *include_forecast)
                .await
                .map(OperationOutput::LocationWeather),
            other => Err(not_served(Server::Weather, other.operation())),
        };
        result.into()
    }
}
