//! Connection handshake barrier
//!
//! One exchange must complete before steady-state traffic is allowed on the
//! connection. The first caller to arrive claims leadership and performs that
//! exchange; everyone arriving while it is in flight waits for the outcome.
//! Once completed the gate never reverts, and the completed check is a single
//! atomic load so steady state pays no lock.
//!
//! A failed or abandoned attempt parks the gate in a claimable failed state:
//! the callers that were waiting see the failure, the next caller to arrive
//! may retry. The gate can never stick in flight because the leader's guard
//! publishes an outcome on every exit path, including drop.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{PassageError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    InFlight,
    Completed,
    Failed(String),
}

/// Outcome of entering the gate
pub enum GateEntry<'a> {
    /// The barrier is already cleared; proceed to steady state
    Ready,
    /// This caller leads the handshake and must report its outcome
    Lead(LeadGuard<'a>),
}

/// One-time barrier over the connection's handshake exchange
#[derive(Debug)]
pub struct HandshakeGate {
    /// Lock-free fast path for the steady state
    completed: AtomicBool,
    phase_tx: watch::Sender<Phase>,
}

impl HandshakeGate {
    pub fn new() -> Self {
        let (phase_tx, _) = watch::channel(Phase::Idle);
        Self {
            completed: AtomicBool::new(false),
            phase_tx,
        }
    }

    /// Whether the handshake has completed. Monotonic once true.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Enter the barrier.
    ///
    /// Returns `Ready` when the handshake is already done, `Lead` when this
    /// caller claimed the attempt, or the failure published by the leader
    /// this caller waited on.
    pub async fn enter(&self) -> Result<GateEntry<'_>> {
        loop {
            if self.is_completed() {
                return Ok(GateEntry::Ready);
            }

            // Double-checked claim: only an idle or previously failed gate
            // can be taken, and the watch lock makes the transition atomic.
            let claimed = self.phase_tx.send_if_modified(|phase| {
                if matches!(phase, Phase::Idle | Phase::Failed(_)) {
                    *phase = Phase::InFlight;
                    true
                } else {
                    false
                }
            });
            if claimed {
                debug!("handshake leadership claimed");
                return Ok(GateEntry::Lead(LeadGuard {
                    gate: self,
                    armed: true,
                }));
            }

            // Someone else holds the attempt; wait for its outcome.
            let mut phase_rx = self.phase_tx.subscribe();
            let outcome = phase_rx
                .wait_for(|phase| !matches!(phase, Phase::InFlight))
                .await;
            match outcome {
                Ok(phase) => match &*phase {
                    Phase::Completed => return Ok(GateEntry::Ready),
                    Phase::Failed(reason) => {
                        return Err(PassageError::Handshake(reason.clone()))
                    }
                    // No transition leads back to idle; contend again if the
                    // phase ever surprises us.
                    _ => continue,
                },
                Err(_) => return Err(PassageError::ConnectionClosed),
            }
        }
    }

    fn publish_completed(&self) {
        self.completed.store(true, Ordering::Release);
        self.phase_tx.send_replace(Phase::Completed);
        info!("handshake completed");
    }

    fn publish_failed(&self, reason: String) {
        warn!(reason = %reason, "handshake failed");
        self.phase_tx.send_replace(Phase::Failed(reason));
    }
}

impl Default for HandshakeGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by the caller performing the handshake. Every exit path publishes an
/// outcome: `complete` and `fail` explicitly, drop as an abandonment failure
/// so a cancelled leader never leaves the gate stuck in flight.
pub struct LeadGuard<'a> {
    gate: &'a HandshakeGate,
    armed: bool,
}

impl LeadGuard<'_> {
    /// Mark the handshake done and release every waiter into steady state
    pub fn complete(mut self) {
        self.armed = false;
        self.gate.publish_completed();
    }

    /// Fail this attempt, releasing waiters with the reason. The gate
    /// becomes claimable again for a later retry.
    pub fn fail(mut self, reason: impl Into<String>) {
        self.armed = false;
        self.gate.publish_failed(reason.into());
    }
}

impl Drop for LeadGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.gate.publish_failed("handshake abandoned".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_caller_leads_then_gate_stays_open() {
        let gate = HandshakeGate::new();
        assert!(!gate.is_completed());

        match gate.enter().await.unwrap() {
            GateEntry::Lead(guard) => guard.complete(),
            GateEntry::Ready => panic!("expected leadership on first entry"),
        }

        assert!(gate.is_completed());
        assert!(matches!(gate.enter().await.unwrap(), GateEntry::Ready));
    }

    #[tokio::test]
    async fn test_exactly_one_leader_among_concurrent_entries() {
        let gate = Arc::new(HandshakeGate::new());
        let leads = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let gate = gate.clone();
            let leads = leads.clone();
            handles.push(tokio::spawn(async move {
                match gate.enter().await.unwrap() {
                    GateEntry::Lead(guard) => {
                        leads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        guard.complete();
                    }
                    GateEntry::Ready => {}
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(leads.load(Ordering::SeqCst), 1);
        assert!(gate.is_completed());
    }

    #[tokio::test]
    async fn test_failure_releases_waiters_and_reopens_gate() {
        let gate = Arc::new(HandshakeGate::new());

        let guard = match gate.enter().await.unwrap() {
            GateEntry::Lead(guard) => guard,
            GateEntry::Ready => panic!("expected leadership"),
        };

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.enter().await.err() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        guard.fail("upgrade rejected");
        match waiter.await.unwrap() {
            Some(PassageError::Handshake(reason)) => assert_eq!(reason, "upgrade rejected"),
            other => panic!("expected handshake failure, got {:?}", other),
        }

        // A later caller may retry from the failed state.
        assert!(!gate.is_completed());
        match gate.enter().await.unwrap() {
            GateEntry::Lead(guard) => guard.complete(),
            GateEntry::Ready => panic!("expected a fresh claim after failure"),
        }
        assert!(gate.is_completed());
    }

    #[tokio::test]
    async fn test_dropped_guard_publishes_abandonment() {
        let gate = Arc::new(HandshakeGate::new());

        let guard = match gate.enter().await.unwrap() {
            GateEntry::Lead(guard) => guard,
            GateEntry::Ready => panic!("expected leadership"),
        };

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.enter().await.err() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(guard);

        match waiter.await.unwrap() {
            Some(PassageError::Handshake(reason)) => assert_eq!(reason, "handshake abandoned"),
            other => panic!("expected abandonment failure, got {:?}", other),
        }
    }
}
