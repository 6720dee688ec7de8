//! Passage - multiplexed request/response correlator for the Elohim Protocol
//!
//! "Strait is the gate, and narrow is the way" - Matthew 7:14
//!
//! Passage carries many independent logical exchanges over a single shared
//! connection. Every request is tagged with a unique, strictly increasing
//! stream identifier, and responses arriving in any order are correlated
//! back to the caller that issued the matching request. The first exchange
//! doubles as the connection handshake: one caller performs it while every
//! concurrent caller holds at the gate, and once it completes steady-state
//! traffic flows with no serialization.
//!
//! ## Components
//!
//! - **Dispatcher** (`Passage`): allocates identifiers, enforces the
//!   handshake barrier, registers pending slots, writes tagged requests
//! - **Correlator** (`ResponseCorrelator`): resolves each inbound message
//!   against the pending-slot map, exactly once per exchange
//! - **Transport seam** (`Connection`): the narrow trait the crate writes
//!   through; connect, TLS, and the wire codec live with the embedding
//!   transport
//!
//! The transport's read loop feeds decoded messages into the delivery
//! sender returned by `Passage::open`; pending exchanges resolve as those
//! messages arrive.

pub mod client;
pub mod config;
pub mod correlator;
pub mod error;
pub mod handshake;
pub mod message;
pub mod pending;
pub mod stream;
pub mod transport;

pub use client::Passage;
pub use config::ClientConfig;
pub use correlator::{CorrelationSnapshot, ResponseCorrelator};
pub use error::{PassageError, Result, TransportError};
pub use message::{Headers, InboundMessage, Request, Response, TaggedRequest};
pub use pending::{ExchangeResult, ResponseFuture};
pub use stream::{StreamId, StreamIdAllocator};
pub use transport::Connection;
