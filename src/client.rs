//! Request dispatcher
//!
//! `Passage` multiplexes many logical exchanges over one connection. Each
//! `send` allocates a fresh stream identifier, registers a pending slot, and
//! hands the tagged request to the transport; the correlator task resolves
//! the slot when the peer's response arrives, in whatever order it arrives.
//!
//! The first exchange doubles as the connection handshake: the caller that
//! claims it blocks inside `send` until the response lands or the bounded
//! wait elapses, and every concurrent caller holds at the gate until that
//! outcome is known. Once the gate clears, sends never serialize.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::correlator::{CorrelationSnapshot, CorrelationStats, ResponseCorrelator};
use crate::error::{PassageError, Result};
use crate::handshake::{GateEntry, HandshakeGate, LeadGuard};
use crate::message::{InboundMessage, Request, Response, TaggedRequest};
use crate::pending::{PendingExchanges, ResponseFuture};
use crate::stream::StreamIdAllocator;
use crate::transport::Connection;

/// Multiplexed request/response client over one connection
pub struct Passage<C: Connection> {
    conn: C,
    config: ClientConfig,
    ids: StreamIdAllocator,
    pending: Arc<PendingExchanges>,
    gate: HandshakeGate,
    stats: Arc<CorrelationStats>,
    /// Set on shutdown, fatal transport failure, or correlator exit; sends
    /// fail fast after. Shared with the correlator task.
    closed: Arc<AtomicBool>,
    shutdown_tx: mpsc::UnboundedSender<()>,
    correlator_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Connection> Passage<C> {
    /// Open a passage over an established connection.
    ///
    /// Spawns the correlator task and returns the delivery sender the
    /// transport's read loop must feed with every decoded inbound message.
    pub async fn open(
        conn: C,
        config: ClientConfig,
    ) -> Result<(Self, mpsc::UnboundedSender<InboundMessage>)> {
        config.validate()?;

        let pending = Arc::new(PendingExchanges::new());
        let stats = Arc::new(CorrelationStats::default());
        let closed = Arc::new(AtomicBool::new(false));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

        let correlator = ResponseCorrelator::new(
            Arc::clone(&pending),
            Arc::clone(&stats),
            Arc::clone(&closed),
        );
        let correlator_handle = tokio::spawn(correlator.run(inbound_rx, shutdown_rx));

        info!(
            prior_knowledge = config.prior_knowledge,
            initial_stream_id = config.initial_stream_id,
            "Passage opened"
        );

        let passage = Self {
            conn,
            ids: StreamIdAllocator::new(config.initial_stream_id),
            config,
            pending,
            gate: HandshakeGate::new(),
            stats,
            closed,
            shutdown_tx,
            correlator_handle: Mutex::new(Some(correlator_handle)),
        };

        Ok((passage, inbound_tx))
    }

    /// Send a request, returning the future of its response.
    ///
    /// Until the handshake has completed this call may block: the caller
    /// that claims the handshake waits for its own response inside `send`,
    /// bounded by the configured timeout, and concurrent callers wait for
    /// that outcome before dispatching. Afterwards `send` only allocates,
    /// registers, and writes.
    pub async fn send(&self, request: Request) -> Result<ResponseFuture> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PassageError::ConnectionClosed);
        }

        if !self.config.prior_knowledge && !self.gate.is_completed() {
            match self.gate.enter().await? {
                GateEntry::Lead(guard) => return self.lead_handshake(request, guard).await,
                GateEntry::Ready => {}
            }
        }

        self.dispatch(request).await
    }

    /// Send a request and wait for its response, bounded by `deadline`.
    ///
    /// On expiry the pending slot is released immediately; a response
    /// arriving later is discarded as an unknown identifier.
    pub async fn request(&self, request: Request, deadline: Duration) -> Result<Response> {
        let future = self.send(request).await?;
        match timeout(deadline, future).await {
            Ok(result) => result,
            Err(_) => Err(PassageError::ResponseTimeout(deadline)),
        }
    }

    /// Release the connection and the correlator task, failing every still
    /// pending exchange. Idempotent, and still releases the transport when a
    /// fatal error already marked the passage closed.
    pub async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Passage shutting down");
        }
        self.teardown().await;
    }

    /// Whether the passage has been shut down or hit a fatal transport error
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the handshake barrier has cleared
    pub fn handshake_completed(&self) -> bool {
        self.gate.is_completed()
    }

    /// Exchanges currently awaiting a response
    pub fn pending_exchanges(&self) -> usize {
        self.pending.len()
    }

    /// Correlation counters for this connection
    pub fn stats(&self) -> CorrelationSnapshot {
        self.stats.snapshot()
    }

    /// Perform the handshake exchange as the gate leader. Blocks until the
    /// response arrives or the bounded wait elapses; every exit publishes an
    /// outcome through the guard.
    async fn lead_handshake(
        &self,
        request: Request,
        guard: LeadGuard<'_>,
    ) -> Result<ResponseFuture> {
        let stream_id = self.ids.allocate();
        let rx = self.pending.register(stream_id);
        let future = ResponseFuture::new(stream_id, rx, Arc::clone(&self.pending));

        if self.closed.load(Ordering::Acquire) {
            drop(future);
            let e = PassageError::ConnectionClosed;
            guard.fail(e.to_string());
            return Err(e);
        }

        debug!(stream_id = %stream_id, "Sending handshake exchange");
        let tagged = TaggedRequest { stream_id, request };
        if let Err(e) = self.conn.write(tagged).await {
            // Dropping the future releases the just-registered slot.
            drop(future);
            let e = PassageError::from(e);
            self.fail_connection(&e).await;
            guard.fail(e.to_string());
            return Err(e);
        }

        match timeout(self.config.handshake_timeout, future).await {
            Ok(Ok(response)) => {
                guard.complete();
                Ok(ResponseFuture::ready(
                    stream_id,
                    Ok(response),
                    Arc::clone(&self.pending),
                ))
            }
            Ok(Err(e)) => {
                guard.fail(e.to_string());
                Err(e)
            }
            // The timeout wrapper dropped the future, which purged the slot;
            // a late handshake response is now an unknown identifier.
            Err(_) => {
                let e = PassageError::HandshakeTimeout(self.config.handshake_timeout);
                guard.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Steady-state path: allocate, register, write, return the future
    async fn dispatch(&self, request: Request) -> Result<ResponseFuture> {
        let stream_id = self.ids.allocate();
        let rx = self.pending.register(stream_id);
        let future = ResponseFuture::new(stream_id, rx, Arc::clone(&self.pending));

        // Registration pairs with the failure path's sweep: a slot that
        // lands after the sweep collected its keys is released here instead.
        if self.closed.load(Ordering::Acquire) {
            drop(future);
            return Err(PassageError::ConnectionClosed);
        }

        let tagged = TaggedRequest { stream_id, request };
        if let Err(e) = self.conn.write(tagged).await {
            drop(future);
            let e = PassageError::from(e);
            self.fail_connection(&e).await;
            return Err(e);
        }

        debug!(stream_id = %stream_id, "Request dispatched");
        Ok(future)
    }

    /// A connection-fatal error invalidates the whole passage: mark it
    /// closed, fail every outstanding exchange, release the transport, stop
    /// the correlator.
    async fn fail_connection(&self, e: &PassageError) {
        if !e.is_connection_fatal() || self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        error!(error = %e, "Transport failure, failing all pending exchanges");
        self.pending.fail_all(e);
        self.teardown().await;
    }

    /// Close the transport, stop the correlator, and reap its task. Runs at
    /// most once; later callers find the handle already taken.
    async fn teardown(&self) {
        let handle = self.correlator_handle.lock().await.take();
        let handle = match handle {
            Some(handle) => handle,
            None => return,
        };

        if let Err(e) = self.conn.close().await {
            warn!(error = %e, "Transport close reported an error");
        }
        let _ = self.shutdown_tx.send(());
        if let Err(e) = handle.await {
            warn!(error = %e, "Correlator task ended abnormally");
        }
    }
}
