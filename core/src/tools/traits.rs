use async_trait::async_trait;

use super::args::OperationArgs;
use super::invocation::InvocationResult;
use super::operation::Server;

/// Shared capability of the geocoding, routing and weather facades.
///
/// Callers never distinguish the concrete facade: the dispatcher picks one by
/// [`Server`] and hands it an already-validated [`OperationArgs`].
#[async_trait]
pub trait Facade: Send + Sync {
    /// The server whose operations this facade implements
    fn server(&self) -> Server;

    /// Run one operation. Arguments for another server's operation yield a
    /// validation failure rather than a panic.
    async fn execute(&self, args: &OperationArgs) -> InvocationResult;
}
