//! Stream identifier allocation
//!
//! Every logical exchange on a connection is tagged with a positive integer.
//! Client-initiated exchanges live on the odd parity and the counter advances
//! by two, so peer-initiated identifiers (even) can never collide with ours.
//! Identifiers are strictly increasing and never reused for the lifetime of
//! the connection.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier tagging one logical exchange on a shared connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(NonZeroU32);

impl StreamId {
    /// Create from a raw wire value. Returns `None` for zero, which is
    /// reserved for the connection itself.
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(StreamId)
    }

    /// Raw integer value
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Whether this identifier was allocated by our side (odd parity)
    pub fn is_client_initiated(self) -> bool {
        self.get() % 2 == 1
    }

    /// Whether this identifier belongs to the peer (even parity)
    pub fn is_peer_initiated(self) -> bool {
        !self.is_client_initiated()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out client-side stream identifiers: strictly increasing, step two,
/// never reused
#[derive(Debug)]
pub struct StreamIdAllocator {
    next: AtomicU32,
}

impl StreamIdAllocator {
    /// Start allocating at `initial`. Callers keep `initial` odd so the whole
    /// sequence stays on the client parity.
    pub fn new(initial: u32) -> Self {
        Self {
            next: AtomicU32::new(initial),
        }
    }

    /// Allocate the next identifier. Safe under any number of concurrent
    /// callers; no two calls ever observe the same value.
    pub fn allocate(&self) -> StreamId {
        let raw = self.next.fetch_add(2, Ordering::Relaxed);
        // An odd start advanced by two never lands on zero, even across wrap.
        StreamId::new(raw).expect("stream id counter yielded zero")
    }
}

impl Default for StreamIdAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_zero_is_rejected() {
        assert!(StreamId::new(0).is_none());
        assert_eq!(StreamId::new(7).unwrap().get(), 7);
    }

    #[test]
    fn test_parity() {
        assert!(StreamId::new(1).unwrap().is_client_initiated());
        assert!(StreamId::new(2).unwrap().is_peer_initiated());
        assert!(StreamId::new(3).unwrap().is_client_initiated());
    }

    #[test]
    fn test_allocation_sequence() {
        let allocator = StreamIdAllocator::default();
        assert_eq!(allocator.allocate().get(), 1);
        assert_eq!(allocator.allocate().get(), 3);
        assert_eq!(allocator.allocate().get(), 5);
    }

    #[test]
    fn test_custom_start() {
        let allocator = StreamIdAllocator::new(11);
        assert_eq!(allocator.allocate().get(), 11);
        assert_eq!(allocator.allocate().get(), 13);
    }

    #[test]
    fn test_concurrent_allocation_is_collision_free() {
        let allocator = Arc::new(StreamIdAllocator::default());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let allocator = allocator.clone();
            handles.push(std::thread::spawn(move || {
                (0..1000).map(|_| allocator.allocate().get()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(id % 2 == 1, "client ids stay odd");
                assert!(seen.insert(id), "id {} allocated twice", id);
            }
        }
        assert_eq!(seen.len(), 8 * 1000);
    }
}
