use tracing::info;

use crate::error::{ErrorKind, NatResult};
use crate::nat_error;
use crate::store::StoreConnection;

/// Operation name carried by the cleanup notification.
const CLEANUP_OP: &str = "nat_cleanup";

/// Argument carried by the cleanup notification.
const CLEANUP_DATA: &str = "all";

/// Notifies peer daemons that NAT state is being cleaned up.
#[async_trait::async_trait]
pub trait CleanupNotify: Send + Sync {
    async fn notify_cleanup(&self) -> NatResult<()>;
}

/// Publishes cleanup notifications over the state store.
///
/// Peers subscribe to the configured channel and clear their own NAT state
/// when the message arrives. The payload is a flat JSON array of the
/// operation name, its argument, and a field map, which is what subscribers
/// parse. Cleanup carries no fields, so the map is always empty.
pub struct PeerNotifier {
    connection: StoreConnection,
    channel: String,
}

impl PeerNotifier {
    pub fn new(connection: StoreConnection, channel: String) -> Self {
        Self {
            connection,
            channel,
        }
    }
}

#[async_trait::async_trait]
impl CleanupNotify for PeerNotifier {
    async fn notify_cleanup(&self) -> NatResult<()> {
        let payload = cleanup_payload()?;

        let receivers = self
            .connection
            .publish(&self.channel, payload)
            .await
            .map_err(|error| {
                nat_error!(
                    ErrorKind::NotifyFailed,
                    "Failed to publish the cleanup notification",
                    source: error
                )
            })?;

        info!(
            channel = %self.channel,
            receivers,
            "published cleanup notification"
        );

        Ok(())
    }
}

/// Serializes the cleanup message published to peers.
fn cleanup_payload() -> NatResult<String> {
    let fields = serde_json::Map::new();
    let payload = serde_json::to_string(&(CLEANUP_OP, CLEANUP_DATA, fields))?;

    Ok(payload)
}
