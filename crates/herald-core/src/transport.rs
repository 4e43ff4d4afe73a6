use async_trait::async_trait;

use crate::errors::TransportError;
use crate::ids::ConnectionId;

/// Push delivery to a single live connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one text message to `connection_id`.
    async fn push(
        &self,
        connection_id: &ConnectionId,
        message: String,
    ) -> Result<(), TransportError>;
}
