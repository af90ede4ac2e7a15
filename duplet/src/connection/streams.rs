use crate::connection::credits::Credits;
use crate::connection::registry::StreamRegistry;
use crate::frame::codec::{CancelFrame, RequestNFrame};
use crate::frame::{Frame, Payload};
use crate::{Error, Result};

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;
use tokio_stream::Stream;

/// Interaction model a live stream follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    RequestResponse,
    RequestStream,
    RequestChannel,
}

/// Which side of the stream this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamRole {
    Requester,
    Responder,
}

/// Events delivered to the local consumer of a stream, in wire order.
#[derive(Debug)]
pub(crate) enum StreamEvent {
    Next(Payload),
    Complete,
    Error(Error),
}

/// What happened to an event offered to a stream mailbox.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// The local consumer is gone; the event was dropped.
    ConsumerGone,
    /// The mailbox is full, meaning the peer overran the credit it was granted.
    Overflow,
}

/// Book-keeping for one live stream.
///
/// The slot is shared between the ingress dispatcher, the egress producer task and the local
/// consumer handle; each field is owned by exactly one of them or is atomic.
#[derive(Debug)]
pub(crate) struct StreamSlot {
    pub(crate) kind: StreamKind,
    pub(crate) role: StreamRole,
    /// Mailbox toward the local consumer; `None` for responder streams without an inbound
    /// direction.
    events: Option<mpsc::Sender<StreamEvent>>,
    /// Credit the peer has granted the local producer.
    pub(crate) credits: Arc<Credits>,
    pub(crate) local_complete: AtomicBool,
    pub(crate) remote_complete: AtomicBool,
    terminated: AtomicBool,
    abort: Mutex<Option<AbortHandle>>,
}

impl StreamSlot {
    pub(crate) fn new(
        kind: StreamKind,
        role: StreamRole,
        events: Option<mpsc::Sender<StreamEvent>>,
        credits: Arc<Credits>,
    ) -> Arc<StreamSlot> {
        Arc::new(StreamSlot {
            kind,
            role,
            events,
            credits,
            local_complete: AtomicBool::new(false),
            remote_complete: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            abort: Mutex::new(None),
        })
    }

    /// Registers the responder task driving this stream so a CANCEL can abort it.
    pub(crate) fn set_abort(&self, handle: AbortHandle) {
        *self.abort.lock().unwrap() = Some(handle);
    }

    /// Marks the stream terminated and aborts its responder task, if any.
    ///
    /// Returns false if the stream had already terminated; termination is idempotent.
    pub(crate) fn terminate(&self) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(handle) = self.abort.lock().unwrap().take() {
            handle.abort();
        }
        true
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Offers an event to the local consumer without blocking the ingress loop.
    pub(crate) fn deliver(&self, event: StreamEvent) -> Delivery {
        let events = match &self.events {
            Some(events) => events,
            None => return Delivery::Delivered,
        };
        match events.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Closed(_)) => Delivery::ConsumerGone,
            Err(TrySendError::Full(_)) => Delivery::Overflow,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Arc<StreamSlot> {
        StreamSlot::new(
            StreamKind::RequestStream,
            StreamRole::Requester,
            None,
            Arc::new(Credits::new(0)),
        )
    }
}

/// Whether dropping a consumer cancels the stream on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GuardMode {
    /// Requester-side consumers: dropping clears the registry entry and sends CANCEL.
    CancelOnDrop,
    /// Responder-side channel inbound: dropping only stops granting credit. The registry entry
    /// stays live because the outbound half of the channel may still be producing.
    Silent,
}

/// Clears the registry entry (and optionally cancels the stream on the wire) when a consumer
/// is dropped before its stream terminates.
#[derive(Debug)]
pub(crate) struct StreamGuard {
    id: u32,
    registry: Arc<StreamRegistry>,
    outbox: mpsc::Sender<Frame>,
    mode: GuardMode,
    armed: bool,
}

impl StreamGuard {
    pub(crate) fn new(
        id: u32,
        registry: Arc<StreamRegistry>,
        outbox: mpsc::Sender<Frame>,
        mode: GuardMode,
    ) -> StreamGuard {
        StreamGuard { id, registry, outbox, mode, armed: true }
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    /// Disarms the guard once the stream reached a terminal state on its own.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if !self.armed || self.mode == GuardMode::Silent {
            return;
        }
        if let Some(slot) = self.registry.remove(self.id) {
            slot.terminate();
        }
        let _ = self
            .outbox
            .try_send(Frame::Cancel(CancelFrame::new(self.id)));
    }
}

/// A backpressured stream of payloads received on one stream ID.
///
/// Demand is replenished with REQUEST_N frames once the outstanding window drops to half of
/// the configured batch, so a steadily-consuming application sees no stalls and a stalled one
/// grants no credit.
pub(crate) struct PayloadStream {
    rx: mpsc::Receiver<StreamEvent>,
    guard: StreamGuard,
    outbox: mpsc::Sender<Frame>,
    batch: u32,
    demand: u32,
    done: bool,
}

impl PayloadStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<StreamEvent>,
        guard: StreamGuard,
        outbox: mpsc::Sender<Frame>,
        batch: u32,
    ) -> PayloadStream {
        PayloadStream { rx, guard, outbox, batch, demand: batch, done: false }
    }

    fn replenish(&mut self) {
        if self.demand > self.batch / 2 {
            return;
        }
        let frame =
            Frame::RequestN(RequestNFrame::new(self.guard.id(), self.batch));
        if self.outbox.try_send(frame).is_ok() {
            self.demand = self.demand.saturating_add(self.batch);
        }
    }
}

impl Stream for PayloadStream {
    type Item = Result<Payload>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(StreamEvent::Next(payload))) => {
                this.demand = this.demand.saturating_sub(1);
                this.replenish();
                Poll::Ready(Some(Ok(payload)))
            }
            Poll::Ready(Some(StreamEvent::Complete)) => {
                this.done = true;
                this.guard.disarm();
                Poll::Ready(None)
            }
            Poll::Ready(Some(StreamEvent::Error(err))) => {
                this.done = true;
                this.guard.disarm();
                Poll::Ready(Some(Err(err)))
            }
            // The mailbox closed without a terminal event: the connection went away.
            Poll::Ready(None) => {
                this.done = true;
                this.guard.disarm();
                Poll::Ready(Some(Err(Error::canceled("connection closed"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Capacity of a stream's event mailbox, sized so a peer honoring its granted credit can
/// never fill it.
pub(crate) fn event_capacity(batch: u32) -> usize {
    (batch as usize).saturating_mul(2).clamp(4, 8192)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn guard_parts() -> (Arc<StreamRegistry>, mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        let registry = Arc::new(StreamRegistry::new());
        let (tx, rx) = mpsc::channel(8);
        (registry, tx, rx)
    }

    #[test]
    fn termination_is_idempotent() {
        let slot = StreamSlot::for_test();
        assert!(slot.terminate());
        assert!(!slot.terminate());
        assert!(slot.is_terminated());
    }

    #[tokio::test]
    async fn guard_cancels_on_drop() {
        let (registry, tx, mut rx) = guard_parts();
        registry.insert(7, StreamSlot::for_test());
        let guard = StreamGuard::new(
            7,
            registry.clone(),
            tx,
            GuardMode::CancelOnDrop,
        );
        drop(guard);
        assert!(registry.is_empty());
        match rx.recv().await.unwrap() {
            Frame::Cancel(frame) => assert_eq!(frame.stream_id(), 7),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn disarmed_guard_stays_quiet() {
        let (registry, tx, mut rx) = guard_parts();
        registry.insert(7, StreamSlot::for_test());
        let mut guard =
            StreamGuard::new(7, registry.clone(), tx, GuardMode::CancelOnDrop);
        guard.disarm();
        drop(guard);
        assert_eq!(registry.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn silent_guard_leaves_the_stream_alone() {
        let (registry, tx, mut rx) = guard_parts();
        registry.insert(9, StreamSlot::for_test());
        let guard = StreamGuard::new(9, registry.clone(), tx, GuardMode::Silent);
        drop(guard);
        assert_eq!(registry.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn payload_stream_replenishes_demand() {
        let (registry, outbox_tx, mut outbox_rx) = guard_parts();
        let (events_tx, events_rx) = mpsc::channel(16);
        let guard =
            StreamGuard::new(3, registry, outbox_tx.clone(), GuardMode::Silent);
        let mut stream = PayloadStream::new(events_rx, guard, outbox_tx, 2);

        for _ in 0..3 {
            events_tx
                .send(StreamEvent::Next(Payload::from("item")))
                .await
                .unwrap();
        }
        events_tx.send(StreamEvent::Complete).await.unwrap();

        let mut received = 0;
        while let Some(item) = stream.next().await {
            item.unwrap();
            received += 1;
        }
        assert_eq!(received, 3);

        // demand 2 -> 1 after the first item, which is the half-way mark
        match outbox_rx.recv().await.unwrap() {
            Frame::RequestN(frame) => {
                assert_eq!(frame.stream_id(), 3);
                assert_eq!(frame.request_n(), 2);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn payload_stream_surfaces_errors() {
        let (registry, outbox_tx, _outbox_rx) = guard_parts();
        let (events_tx, events_rx) = mpsc::channel(16);
        let guard = StreamGuard::new(
            4,
            registry,
            outbox_tx.clone(),
            GuardMode::Silent,
        );
        let mut stream = PayloadStream::new(events_rx, guard, outbox_tx, 8);

        events_tx
            .send(StreamEvent::Error(Error::application("boom")))
            .await
            .unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_application_error());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn closed_mailbox_is_an_abnormal_end() {
        let (registry, outbox_tx, _outbox_rx) = guard_parts();
        let (events_tx, events_rx) = mpsc::channel(4);
        let guard = StreamGuard::new(
            5,
            registry,
            outbox_tx.clone(),
            GuardMode::Silent,
        );
        let mut stream = PayloadStream::new(events_rx, guard, outbox_tx, 8);
        drop(events_tx);
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_canceled());
        assert!(stream.next().await.is_none());
    }
}
