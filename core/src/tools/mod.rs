pub mod args;
pub mod catalog;
pub mod dispatcher;
pub mod error;
pub mod invocation;
pub mod native;
pub mod operation;
pub mod registry;
pub mod traits;
pub mod transport;

// Re-export common types
pub use args::{OperationArgs, TravelMode};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use error::{FailureKind, RegistryError, ToolError, ToolResult};
pub use invocation::{InvocationRequest, InvocationResult, OperationOutput};
pub use native::{GeocodingFacade, RoutingFacade, WeatherFacade};
pub use operation::{Operation, Server};
pub use registry::{OperationRegistry, OperationSpec, ParamType, ParameterSpec};
pub use traits::Facade;
pub use transport::{HttpTransport, ReqwestTransport};
