//! Response correlation
//!
//! Every decoded inbound message on the connection flows through one
//! correlator, which extracts the stream identifier and resolves the matching
//! pending slot. Messages with no identifier, or an identifier no exchange is
//! waiting on, are logged and discarded without disturbing anything else.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::PassageError;
use crate::message::InboundMessage;
use crate::pending::PendingExchanges;

/// Correlation outcome counters for one connection
#[derive(Debug, Default)]
pub struct CorrelationStats {
    completed: AtomicU64,
    unknown_stream: AtomicU64,
    unidentifiable: AtomicU64,
}

impl CorrelationStats {
    pub fn snapshot(&self) -> CorrelationSnapshot {
        CorrelationSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            unknown_stream: self.unknown_stream.load(Ordering::Relaxed),
            unidentifiable: self.unidentifiable.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the correlation counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationSnapshot {
    /// Exchanges resolved with their response
    pub completed: u64,
    /// Messages whose identifier matched no pending exchange
    pub unknown_stream: u64,
    /// Messages carrying no extractable identifier
    pub unidentifiable: u64,
}

/// Resolves inbound messages against the pending-slot map.
///
/// Runs on the transport's single delivery sequence; registrations may race
/// in from dispatcher tasks, which the map itself absorbs.
pub struct ResponseCorrelator {
    pending: Arc<PendingExchanges>,
    stats: Arc<CorrelationStats>,
    /// Shared with the dispatcher; set when this task exits so later sends
    /// fail fast instead of registering slots nothing will resolve
    closed: Arc<AtomicBool>,
}

impl ResponseCorrelator {
    pub fn new(
        pending: Arc<PendingExchanges>,
        stats: Arc<CorrelationStats>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pending,
            stats,
            closed,
        }
    }

    /// Handle one decoded inbound message
    pub fn on_message(&self, message: InboundMessage) {
        let InboundMessage {
            stream_id,
            response,
        } = message;

        let stream_id = match stream_id {
            Some(id) => id,
            None => {
                warn!("Unexpected message received with no stream identifier");
                self.stats.unidentifiable.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if self.pending.complete(stream_id, Ok(response)) {
            debug!(stream_id = %stream_id, "Exchange completed");
            self.stats.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!(stream_id = %stream_id, "Message received for unknown stream identifier");
            self.stats.unknown_stream.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drain the delivery channel until it closes or shutdown is signalled,
    /// then mark the connection closed and fail whatever is still pending so
    /// no caller hangs.
    pub async fn run(
        self,
        mut inbound_rx: mpsc::UnboundedReceiver<InboundMessage>,
        mut shutdown_rx: mpsc::UnboundedReceiver<()>,
    ) {
        loop {
            tokio::select! {
                message = inbound_rx.recv() => match message {
                    Some(message) => self.on_message(message),
                    None => {
                        debug!("Delivery channel closed");
                        break;
                    }
                },
                _ = shutdown_rx.recv() => {
                    debug!("Correlator shutdown requested");
                    break;
                }
            }
        }

        // Closed flag first: once any pending slot resolves with the failure,
        // the dispatcher must already be rejecting new sends.
        self.closed.store(true, Ordering::Release);
        let failed = self.pending.fail_all(&PassageError::ConnectionClosed);
        if failed > 0 {
            info!(failed = failed, "Connection ended with exchanges still pending");
        }
    }
}
