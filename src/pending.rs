//! Pending response slots
//!
//! One slot per in-flight exchange, keyed by stream identifier. A slot is a
//! single-assignment promise: it is created when the request is dispatched
//! and removed the instant it resolves, so a duplicate arrival for the same
//! identifier finds no slot and falls out as an unknown-identifier event.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{PassageError, Result};
use crate::message::Response;
use crate::stream::StreamId;

/// What a resolved exchange yields: the peer's response, or the failure that
/// ended it
pub type ExchangeResult = Result<Response>;

/// Concurrent map of stream identifier to its single-assignment promise.
///
/// Registration happens on dispatcher tasks, resolution on the delivery
/// path; the map's own sharding is the only synchronization either needs.
#[derive(Debug, Default)]
pub struct PendingExchanges {
    slots: DashMap<StreamId, oneshot::Sender<ExchangeResult>>,
}

impl PendingExchanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot for `stream_id` and return the receiving half.
    ///
    /// Identifiers are never reused, so no slot can already exist here.
    pub fn register(&self, stream_id: StreamId) -> oneshot::Receiver<ExchangeResult> {
        let (tx, rx) = oneshot::channel();
        self.slots.insert(stream_id, tx);
        debug!(stream_id = %stream_id, pending = self.slots.len(), "exchange registered");
        rx
    }

    /// Resolve the slot for `stream_id`, removing it first so resolution
    /// happens at most once. Returns false when no slot exists.
    pub fn complete(&self, stream_id: StreamId, result: ExchangeResult) -> bool {
        match self.slots.remove(&stream_id) {
            Some((_, tx)) => {
                // The waiter may have given up; a failed send is not an error.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Drop the slot for `stream_id` without resolving it. Returns whether a
    /// slot was present.
    pub fn discard(&self, stream_id: StreamId) -> bool {
        self.slots.remove(&stream_id).is_some()
    }

    /// Fail every outstanding slot with `error`. Returns how many were
    /// failed.
    pub fn fail_all(&self, error: &PassageError) -> usize {
        let ids: Vec<StreamId> = self.slots.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, tx)) = self.slots.remove(&id) {
                let _ = tx.send(Err(error.clone()));
                failed += 1;
            }
        }
        if failed > 0 {
            debug!(failed = failed, error = %error, "failed all pending exchanges");
        }
        failed
    }

    /// Number of exchanges still awaiting a response
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[derive(Debug)]
enum FutureState {
    /// Waiting on the slot's promise
    Waiting(oneshot::Receiver<ExchangeResult>),
    /// Resolved before the future was returned (handshake leader path)
    Ready(Option<ExchangeResult>),
    /// Output already yielded
    Done,
}

/// The caller's handle on one exchange's eventual response.
///
/// Dropping the future before it resolves purges its slot, so a response
/// arriving after the caller gave up is treated as an unknown identifier
/// rather than delivered to nobody.
#[derive(Debug)]
pub struct ResponseFuture {
    stream_id: StreamId,
    state: FutureState,
    pending: Arc<PendingExchanges>,
}

impl ResponseFuture {
    pub(crate) fn new(
        stream_id: StreamId,
        rx: oneshot::Receiver<ExchangeResult>,
        pending: Arc<PendingExchanges>,
    ) -> Self {
        Self {
            stream_id,
            state: FutureState::Waiting(rx),
            pending,
        }
    }

    /// A future that is already resolved
    pub(crate) fn ready(
        stream_id: StreamId,
        result: ExchangeResult,
        pending: Arc<PendingExchanges>,
    ) -> Self {
        Self {
            stream_id,
            state: FutureState::Ready(Some(result)),
            pending,
        }
    }

    /// The stream identifier this exchange was tagged with
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }
}

impl Future for ResponseFuture {
    type Output = ExchangeResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            FutureState::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => {
                    this.state = FutureState::Done;
                    Poll::Ready(result)
                }
                // Sender dropped without resolving: the slot map was torn
                // down out from under us.
                Poll::Ready(Err(_)) => {
                    this.state = FutureState::Done;
                    Poll::Ready(Err(PassageError::ConnectionClosed))
                }
                Poll::Pending => Poll::Pending,
            },
            FutureState::Ready(result) => {
                let result = result
                    .take()
                    .expect("ResponseFuture polled after completion");
                this.state = FutureState::Done;
                Poll::Ready(result)
            }
            FutureState::Done => panic!("ResponseFuture polled after completion"),
        }
    }
}

impl Drop for ResponseFuture {
    fn drop(&mut self) {
        if matches!(self.state, FutureState::Waiting(_)) && self.pending.discard(self.stream_id) {
            debug!(stream_id = %self.stream_id, "exchange abandoned before resolution");
        }
    }
}
