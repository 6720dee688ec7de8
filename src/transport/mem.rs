//! In-memory transport
//!
//! Pairs a `Connection` with a channel receiver so a test or embedded loop
//! can observe outbound requests and script inbound responses without a
//! socket.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use super::Connection;
use crate::error::TransportError;
use crate::message::TaggedRequest;

/// Channel-backed connection. Written requests surface on the paired
/// receiver; after `close` every write fails.
pub struct MemoryConnection {
    outbound_tx: mpsc::UnboundedSender<TaggedRequest>,
    closed: AtomicBool,
}

impl MemoryConnection {
    /// Create the connection plus the receiver observing its writes
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaggedRequest>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound_tx,
                closed: AtomicBool::new(false),
            },
            outbound_rx,
        )
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait::async_trait]
impl Connection for MemoryConnection {
    async fn write(&self, request: TaggedRequest) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.outbound_tx
            .send(request)
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
