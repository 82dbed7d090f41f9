pub mod geocoding;
pub mod routing;
pub mod weather;

pub use geocoding::{GeocodingConfig, GeocodingFacade};
pub use routing::{RoutingConfig, RoutingFacade};
pub use weather::{Units, WeatherConfig, WeatherFacade};

use super::{Operation, Server, ToolError};

/// Failure for an operation routed to a facade that does not serve it
pub(crate) fn not_served(server: Server, operation: Operation) -> ToolError {
    ToolError::Validation(format!(
        "operation '{operation}' is not served by the {server} server"
    ))
}
