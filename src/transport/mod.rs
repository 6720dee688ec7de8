//! Transport collaborator seam
//!
//! The physical connection (socket bootstrap, TLS, wire codec) lives outside
//! this crate. `Connection` is the narrow seam the dispatcher writes through;
//! the inbound half is the delivery sender returned by `Passage::open`, which
//! the transport's read loop feeds with every decoded message.

pub mod mem;

use crate::error::TransportError;
use crate::message::TaggedRequest;

/// Write half of one established channel to the peer (allows mocking in tests)
#[async_trait::async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Send one tagged request. An error here is fatal to the connection.
    async fn write(&self, request: TaggedRequest) -> Result<(), TransportError>;

    /// Release the channel. Idempotent.
    async fn close(&self) -> Result<(), TransportError>;
}
