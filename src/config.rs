//! Client configuration

use std::time::Duration;

use crate::error::{PassageError, Result};

/// Configuration for one multiplexed connection
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on the blocking wait for the handshake exchange
    pub handshake_timeout: Duration,
    /// Skip the handshake barrier entirely. Set when the transport already
    /// negotiated the protocol out of band.
    pub prior_knowledge: bool,
    /// First client-side stream identifier. Must be odd; the even parity
    /// belongs to the peer.
    pub initial_stream_id: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            prior_knowledge: false,
            initial_stream_id: 1,
        }
    }
}

impl ClientConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.initial_stream_id == 0 {
            return Err(PassageError::Config(
                "initial_stream_id must be positive".to_string(),
            ));
        }
        if self.initial_stream_id % 2 == 0 {
            return Err(PassageError::Config(
                "initial_stream_id must be odd; even identifiers belong to the peer".to_string(),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(PassageError::Config(
                "handshake_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
