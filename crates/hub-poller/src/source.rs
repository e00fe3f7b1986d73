use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use plcwatch_hub_connection::ConnectionManager;
use plcwatch_protocol::{BoxFuture, ConnectionId, TagSession, VariableDescriptor};

/// Where the poller finds sessions and catalogs.
pub trait VariableSource: Send + Sync + 'static {
    /// Open session of `id` and the token cancelled when it closes.
    fn session(&self, id: ConnectionId) -> BoxFuture<'_, Option<(Arc<dyn TagSession>, CancellationToken)>>;

    /// Current catalog entries of `id`; empty if it no longer exists.
    fn entries(&self, id: ConnectionId) -> BoxFuture<'_, Vec<VariableDescriptor>>;
}

impl VariableSource for ConnectionManager {
    fn session(&self, id: ConnectionId) -> BoxFuture<'_, Option<(Arc<dyn TagSession>, CancellationToken)>> {
        Box::pin(async move { ConnectionManager::session(self, id).await.ok() })
    }

    fn entries(&self, id: ConnectionId) -> BoxFuture<'_, Vec<VariableDescriptor>> {
        Box::pin(async move { ConnectionManager::entries(self, id).await.unwrap_or_default() })
    }
}
