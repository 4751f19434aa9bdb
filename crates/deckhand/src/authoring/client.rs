//! Remote service adapter interface.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::RemoteError;
use super::resource::ResourceItem;

/// Result type returned by adapters.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Adapter for one service's remote resource collection.
///
/// Implemented once per integration on top of whatever HTTP client the
/// integration uses. The engine calls the mutating methods from at most
/// `batch_size` concurrent units of work, so implementations must tolerate
/// that much concurrency; anything stricter is the adapter's to serialize.
#[async_trait]
pub trait RemoteClient<P>: Send + Sync
where
    P: Send + Sync + 'static,
{
    /// Binds the client to a project environment. Failure aborts the run.
    async fn initialize(
        &self,
        environment_id: &str,
        project_id: &str,
        cancel: &CancellationToken,
    ) -> RemoteResult<()>;

    /// Lists every remote resource.
    async fn list(&self) -> RemoteResult<Vec<ResourceItem<P>>>;

    async fn get(&self, id: &str) -> RemoteResult<ResourceItem<P>>;

    async fn create(&self, item: &ResourceItem<P>) -> RemoteResult<()>;

    async fn update(&self, item: &ResourceItem<P>) -> RemoteResult<()>;

    async fn delete(&self, item: &ResourceItem<P>) -> RemoteResult<()>;
}
