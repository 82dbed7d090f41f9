//! Geographic primitives shared by every facade.

use serde::{Deserialize, Serialize};

use crate::tools::{ToolError, ToolResult};

/// Mean Earth radius used for great-circle math
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate length of one degree of latitude
const KM_PER_DEGREE: f64 = 111.32;

const DIRECTIONS: [&str; 8] = [
    "North",
    "Northeast",
    "East",
    "Southeast",
    "South",
    "Southwest",
    "West",
    "Northwest",
];

/// A latitude/longitude pair in decimal degrees.
///
/// Fields are public so upstream payloads and tests can build points freely;
/// anything that crosses into a facade must pass [`GeoPoint::validate`] first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting anything outside [-90,90]×[-180,180]
    pub fn new(latitude: f64, longitude: f64) -> ToolResult<Self> {
        let point = Self {
            latitude,
            longitude,
        };
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> ToolResult<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ToolError::Validation(format!(
                "latitude {} is outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ToolError::Validation(format!(
                "longitude {} is outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Great-circle distance in kilometres (haversine)
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }

    /// Initial bearing towards `other`, in degrees within [0, 360)
    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let x = d_lon.sin() * lat2.cos();
        let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
        (x.atan2(y).to_degrees() + 360.0) % 360.0
    }

    /// Bounding box of roughly `radius_km` around this point as
    /// `(min_lon, max_lat, max_lon, min_lat)`, the order Nominatim's viewbox expects
    pub fn viewbox(&self, radius_km: f64) -> (f64, f64, f64, f64) {
        let lat_delta = radius_km / KM_PER_DEGREE;
        let cos_lat = self.latitude.to_radians().cos().abs().max(0.01);
        let lon_delta = radius_km / (KM_PER_DEGREE * cos_lat);
        (
            (self.longitude - lon_delta).max(-180.0),
            (self.latitude + lat_delta).min(90.0),
            (self.longitude + lon_delta).min(180.0),
            (self.latitude - lat_delta).max(-90.0),
        )
    }
}

/// Map a bearing in degrees onto one of eight compass directions
pub fn cardinal_direction(bearing: f64) -> &'static str {
    let index = (bearing.rem_euclid(360.0) / 45.0).round() as usize % DIRECTIONS.len();
    DIRECTIONS[index]
}

/// Round to two decimals for user-facing kilometre values
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
