use crate::connection::config::ConnectionConfig;
use crate::connection::conn::{ConnectionStatus, DuplexConnection};
use crate::connection::credits::Credits;
use crate::connection::keepalive::KeepaliveTracker;
use crate::connection::lease::LeaseState;
use crate::connection::registry::StreamRegistry;
use crate::connection::stream_id::StreamIdProvider;
use crate::connection::streams::{
    event_capacity, Delivery, GuardMode, PayloadStream, StreamEvent,
    StreamGuard, StreamKind, StreamRole, StreamSlot,
};
use crate::error::{Kind, Timeout};
use crate::fragment::{ChainKind, Fragmenter, Reassembler, RequestKind};
use crate::frame::codec::*;
use crate::frame::{DecodeError, Encode, Frame, Payload, Version, MAX_U63};
use crate::rsocket::Responder;
use crate::runtime;
use crate::{Error, Flux, Mono, RSocket, Result};

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Notify, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tracing::{debug, error, trace, warn};

const OUTBOX_CAPACITY: usize = 128;

/// Client/server role of the local peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The peer that sends SETUP and allocates odd stream IDs.
    Client,
    /// The peer that accepts SETUP and allocates even stream IDs.
    Server,
}

/// Callback invoked with frames that were legally ignored: frames for unknown stream IDs and
/// ignorable extension frames. Must not block and must not panic.
pub type IgnoredFrameConsumer = Box<dyn Fn(&Frame) + Send + Sync>;

/// Called once per accepted connection with the decoded SETUP information and a requester
/// handle for the new connection; returns the responder serving the peer's requests.
pub type Acceptor = Box<
    dyn Fn(ConnectionSetup, RSocketMachine) -> Result<Box<dyn RSocket>>
        + Send
        + Sync,
>;

/// Store collaborator that persists resume positions keyed by resume token.
///
/// The engine records positions through this trait but keeps no replay buffer itself; actual
/// session resumption is the store owner's concern.
pub trait ResumeStore: Send + Sync {
    /// Records the peer's last received position for `token`.
    fn save(&self, token: &[u8], position: u64);

    /// Returns the saved position for `token`, if any.
    fn load(&self, token: &[u8]) -> Option<u64>;
}

/// Decoded SETUP information handed to a server [`Acceptor`].
#[derive(Debug)]
pub struct ConnectionSetup {
    version: Version,
    keepalive_interval: Duration,
    keepalive_timeout: Duration,
    metadata_mimetype: Option<String>,
    data_mimetype: Option<String>,
    lease_enabled: bool,
    resume_token: Option<Bytes>,
    payload: Payload,
}

impl ConnectionSetup {
    /// Returns the protocol version the client declared.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the keepalive interval the client will honor.
    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    /// Returns the max lifetime without traffic before the connection is considered dead.
    pub fn keepalive_timeout(&self) -> Duration {
        self.keepalive_timeout
    }

    /// Returns the declared metadata mimetype, if it was valid ASCII.
    pub fn metadata_mimetype(&self) -> Option<&str> {
        self.metadata_mimetype.as_deref()
    }

    /// Returns the declared data mimetype, if it was valid ASCII.
    pub fn data_mimetype(&self) -> Option<&str> {
        self.data_mimetype.as_deref()
    }

    /// Returns true if the client requested lease semantics.
    pub fn lease_enabled(&self) -> bool {
        self.lease_enabled
    }

    /// Returns the resume token carried by SETUP, if any.
    pub fn resume_token(&self) -> Option<&Bytes> {
        self.resume_token.as_ref()
    }

    /// Returns the setup payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consumes the setup information, returning the setup payload.
    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

/// The state machine driving one RSocket connection.
///
/// One machine multiplexes every stream of the connection over a single [`DuplexConnection`]:
/// ingress frames are demultiplexed by stream ID, egress frames funnel through one writer task
/// so per-stream wire order is preserved. The machine is the requester handle as well; it
/// implements [`RSocket`], and cloning it is cheap.
#[derive(Clone)]
pub struct RSocketMachine {
    inner: Arc<Machine>,
}

struct Machine {
    role: Role,
    fragmenter: Fragmenter,
    /// Largest acceptable encoded frame, mirroring the fragmentation MTU; 0 means unbounded.
    max_frame_len: usize,
    initial_request_n: u32,
    keepalive_interval: Duration,
    keepalive_timeout: Duration,
    stream_ids: StreamIdProvider,
    registry: Arc<StreamRegistry>,
    outbox: mpsc::Sender<Frame>,
    handler: RwLock<Box<dyn RSocket>>,
    ignored: IgnoredFrameConsumer,
    resume_store: Option<Box<dyn ResumeStore>>,
    resume_token: Option<Bytes>,
    lease: Option<StdMutex<LeaseState>>,
    keepalive: KeepaliveTracker,
    position: AtomicU64,
    status: watch::Sender<ConnectionStatus>,
    close_reason: StdMutex<Option<(u32, String)>>,
    shutdown: Notify,
}

impl RSocketMachine {
    /// Establishes the client side of a connection: sends SETUP, then starts the connection
    /// driver and keepalive tasks.
    pub async fn client(
        mut connection: Box<dyn DuplexConnection>,
        config: ConnectionConfig,
        responder: Box<dyn RSocket>,
    ) -> Result<RSocketMachine> {
        let mut setup = SetupFrame::builder()
            .set_keepalive_interval(config.keepalive_interval.as_millis() as u32)
            .set_keepalive_timeout(config.keepalive_timeout.as_millis() as u32)
            .set_metadata_mimetype(config.metadata_mimetype.clone())
            .set_data_mimetype(config.data_mimetype.clone());
        if config.lease_enabled {
            setup = setup.set_lease_flag();
        }
        if let Some(token) = &config.resume_token {
            setup = setup.set_resume_token(token.clone());
        }
        let (metadata, data) = config.setup_payload.clone().split();
        if let Some(metadata) = metadata {
            setup = setup.set_metadata(metadata);
        }
        if let Some(data) = data {
            setup = setup.set_data(data);
        }
        connection.send(Frame::Setup(setup.build()).to_bytes()).await?;

        let keepalive_interval = config.keepalive_interval;
        let keepalive_timeout = config.keepalive_timeout;
        let (machine, outbox_rx) = Machine::new(
            Role::Client,
            config,
            responder,
            keepalive_interval,
            keepalive_timeout,
        );
        machine.status.send_replace(ConnectionStatus::Established);
        runtime::spawn(drive(machine.clone(), connection, outbox_rx));
        runtime::spawn(run_keepalive(machine.clone()));
        runtime::spawn(run_lifetime_watcher(machine.clone()));
        Ok(RSocketMachine { inner: machine })
    }

    /// Establishes the server side of a connection: awaits and validates the client's SETUP,
    /// invokes the acceptor to obtain the responder, then starts the connection driver.
    ///
    /// A rejected SETUP answers the client with the matching setup error code and closes the
    /// transport.
    pub async fn server(
        mut connection: Box<dyn DuplexConnection>,
        config: ConnectionConfig,
        acceptor: Acceptor,
    ) -> Result<RSocketMachine> {
        let bytes = match connection.receive().await {
            Some(Ok(bytes)) => bytes,
            Some(Err(err)) => {
                connection.close().await;
                return Err(err);
            }
            None => {
                connection.close().await;
                return Err(Error::connection_close(
                    "transport closed before SETUP",
                ));
            }
        };
        let mut buf = bytes;
        let frame = match Frame::decode(&mut buf) {
            Ok(frame) => frame,
            Err(err) => {
                reject_connection(
                    &mut connection,
                    ErrorFrame::INVALID_SETUP,
                    &err.to_string(),
                )
                .await;
                return Err(err.into());
            }
        };
        let setup = match frame {
            Frame::Setup(setup) => setup,
            Frame::Resume(resume) => {
                // No replay buffer is kept, so resumption is always refused; the store still
                // tells a recognized session apart from an unknown token.
                let known = config
                    .resume_store
                    .as_ref()
                    .and_then(|store| store.load(resume.resume_token()))
                    .is_some();
                let message = if known {
                    "resume token recognized but session state is gone"
                } else {
                    "unknown resume token"
                };
                reject_connection(
                    &mut connection,
                    ErrorFrame::REJECTED_RESUME,
                    message,
                )
                .await;
                return Err(Error::with_message(Kind::RejectedResume, message));
            }
            other => {
                reject_connection(
                    &mut connection,
                    ErrorFrame::INVALID_SETUP,
                    "first frame was not SETUP",
                )
                .await;
                return Err(Error::with_message(
                    Kind::InvalidSetup,
                    format!("unexpected {:?} before SETUP", other.frame_type()),
                ));
            }
        };
        if setup.version().major() != 1 {
            let message =
                format!("unsupported protocol version {}", setup.version());
            reject_connection(
                &mut connection,
                ErrorFrame::UNSUPPORTED_SETUP,
                &message,
            )
            .await;
            return Err(Error::with_message(Kind::UnsupportedSetup, message));
        }
        if setup.keepalive_interval().is_zero()
            || setup.keepalive_timeout().is_zero()
        {
            reject_connection(
                &mut connection,
                ErrorFrame::INVALID_SETUP,
                "zero keepalive settings",
            )
            .await;
            return Err(Error::with_message(
                Kind::InvalidSetup,
                "zero keepalive settings",
            ));
        }

        let keepalive_interval = setup.keepalive_interval();
        let keepalive_timeout = setup.keepalive_timeout();
        let info = ConnectionSetup {
            version: setup.version(),
            keepalive_interval,
            keepalive_timeout,
            metadata_mimetype: setup.metadata_mimetype().map(str::to_owned),
            data_mimetype: setup.data_mimetype().map(str::to_owned),
            lease_enabled: setup.is_lease(),
            resume_token: setup.resume_token().cloned(),
            payload: setup.payload(),
        };
        if let (Some(store), Some(token)) =
            (&config.resume_store, info.resume_token.as_ref())
        {
            store.save(token, 0);
        }

        let (machine, outbox_rx) = Machine::new(
            Role::Server,
            config,
            Box::new(Responder::default()),
            keepalive_interval,
            keepalive_timeout,
        );
        let handle = RSocketMachine { inner: machine.clone() };
        match acceptor(info, handle.clone()) {
            Ok(responder) => {
                *machine.handler.write().await = responder;
            }
            Err(err) => {
                reject_connection(
                    &mut connection,
                    ErrorFrame::REJECTED_SETUP,
                    &err.message().unwrap_or_default(),
                )
                .await;
                machine.status.send_replace(ConnectionStatus::Closed);
                return Err(err);
            }
        }
        machine.status.send_replace(ConnectionStatus::Established);
        runtime::spawn(drive(machine.clone(), connection, outbox_rx));
        runtime::spawn(run_lifetime_watcher(machine.clone()));
        Ok(handle)
    }

    /// Returns the role this peer plays on the connection.
    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Returns the current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.borrow().clone()
    }

    /// Returns a watch receiver that observes connection status changes.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Closes the connection: notifies the peer with `CONNECTION_CLOSE`, terminates every live
    /// stream, then shuts the transport down.
    pub fn close(&self) {
        let reason = Error::connection_close("closed by local peer");
        self.inner.begin_close(&reason, true);
    }

    #[cfg(test)]
    pub(crate) fn live_stream_count(&self) -> usize {
        self.inner.registry.len()
    }

    #[cfg(test)]
    pub(crate) fn close_reason(&self) -> Option<(u32, String)> {
        self.inner.close_reason.lock().unwrap().clone()
    }
}

impl fmt::Debug for RSocketMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RSocketMachine")
            .field("role", &self.inner.role)
            .field("status", &*self.inner.status.borrow())
            .field("live_streams", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl Machine {
    fn new(
        role: Role,
        mut config: ConnectionConfig,
        responder: Box<dyn RSocket>,
        keepalive_interval: Duration,
        keepalive_timeout: Duration,
    ) -> (Arc<Machine>, mpsc::Receiver<Frame>) {
        let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
        let stream_ids = match role {
            Role::Client => StreamIdProvider::new_for_client(),
            Role::Server => StreamIdProvider::new_for_server(),
        };
        let ignored = config.ignored_frame_consumer.take().unwrap_or_else(|| {
            Box::new(|frame: &Frame| {
                trace!(
                    "ignored {:?} frame on stream {}",
                    frame.frame_type(),
                    frame.stream_id()
                );
            })
        });
        let lease = if config.lease_enabled {
            Some(StdMutex::new(LeaseState::exhausted()))
        } else {
            None
        };
        let (status, _) = watch::channel(ConnectionStatus::Connecting);
        let machine = Arc::new(Machine {
            role,
            fragmenter: Fragmenter::new(config.fragment_mtu),
            max_frame_len: config.fragment_mtu,
            initial_request_n: config.initial_request_n,
            keepalive_interval,
            keepalive_timeout,
            stream_ids,
            registry: Arc::new(StreamRegistry::new()),
            outbox: outbox_tx,
            handler: RwLock::new(responder),
            ignored,
            resume_store: config.resume_store.take(),
            resume_token: config.resume_token.take(),
            lease,
            keepalive: KeepaliveTracker::new(),
            position: AtomicU64::new(0),
            status,
            close_reason: StdMutex::new(None),
            shutdown: Notify::new(),
        });
        (machine, outbox_rx)
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed) & MAX_U63
    }

    fn ensure_open(&self) -> Result<()> {
        if self.close_reason.lock().unwrap().is_some() {
            Err(Error::connection_close("connection closed"))
        } else {
            Ok(())
        }
    }

    fn lease_claim(&self) -> Result<()> {
        match &self.lease {
            None => Ok(()),
            Some(state) => {
                if state.lock().unwrap().try_use() {
                    Ok(())
                } else {
                    Err(Error::rejected("lease expired or exhausted"))
                }
            }
        }
    }

    async fn send_frame(&self, frame: Frame) -> Result<()> {
        self.outbox
            .send(frame)
            .await
            .map_err(|_| Error::connection_close("connection closed"))
    }

    /// Moves the connection to Closing exactly once, cascading termination to every live
    /// stream. `notify_peer` additionally queues an ERROR frame at stream 0.
    fn begin_close(&self, reason: &Error, notify_peer: bool) {
        let (code, message) = {
            let mut guard = self.close_reason.lock().unwrap();
            if guard.is_some() {
                return;
            }
            let code = connection_scoped_code(reason.wire_code());
            let message = reason.message().unwrap_or_default();
            *guard = Some((code, message.clone()));
            (code, message)
        };
        debug!("closing connection: {}", reason);
        if notify_peer {
            let data = if message.is_empty() {
                None
            } else {
                Some(Bytes::from(message.clone()))
            };
            let _ = self
                .outbox
                .try_send(Frame::Error(ErrorFrame::new(0, code, data)));
        }
        self.status.send_replace(ConnectionStatus::Closing);
        let data = if message.is_empty() {
            None
        } else {
            Some(Bytes::from(message))
        };
        for slot in self.registry.drain() {
            slot.terminate();
            let _ = slot.deliver(StreamEvent::Error(Error::from_wire(
                code,
                data.as_ref(),
            )));
        }
        self.shutdown.notify_one();
    }

    fn finish_close(&self) {
        self.status.send_replace(ConnectionStatus::Closed);
    }

    fn protocol_violation(&self, message: impl Into<String>) {
        let reason = Error::connection_error(message);
        self.begin_close(&reason, true);
    }

    /// A REQUEST_N (or initial-request-n) of zero is invalid but scoped to its stream: the
    /// offending stream is answered with ERROR(INVALID) and terminated; the connection and
    /// every other stream stay up.
    fn reject_zero_request_n(&self, stream_id: u32) {
        warn!("request-n of zero on stream {}", stream_id);
        let _ = self.outbox.try_send(Frame::Error(ErrorFrame::new(
            stream_id,
            ErrorFrame::INVALID,
            Some(Bytes::from_static(b"request-n of zero")),
        )));
        if let Some(slot) = self.registry.remove(stream_id) {
            slot.terminate();
            let _ = slot.deliver(StreamEvent::Error(Error::with_message(
                Kind::Invalid,
                "request-n of zero",
            )));
        }
    }

    /// Routes one decoded frame: stream 0 frames are handled here, stream frames go through
    /// reassembly and on to the per-stream state machines.
    fn dispatch(
        self: &Arc<Self>,
        frame: Frame,
        assembly: &mut HashMap<u32, Reassembler>,
    ) {
        match frame {
            Frame::Setup(_) => {
                self.protocol_violation("SETUP after connection establishment")
            }
            Frame::Resume(_) => {
                let _ = self.outbox.try_send(Frame::Error(ErrorFrame::new(
                    0,
                    ErrorFrame::REJECTED_RESUME,
                    Some(Bytes::from_static(b"resume is not supported")),
                )));
                self.begin_close(
                    &Error::with_message(
                        Kind::RejectedResume,
                        "RESUME after establishment",
                    ),
                    false,
                );
            }
            Frame::ResumeOk(ok) => {
                match (&self.resume_store, &self.resume_token) {
                    (Some(store), Some(token)) => {
                        store.save(token, ok.last_received_client_position())
                    }
                    _ => trace!("RESUME_OK without resume store"),
                }
            }
            Frame::Keepalive(keepalive) => {
                if let (Some(store), Some(token)) =
                    (&self.resume_store, &self.resume_token)
                {
                    store.save(token, keepalive.last_received_position());
                }
                if keepalive.is_respond() {
                    let reply = KeepaliveFrame::new(
                        false,
                        self.position(),
                        keepalive.into_data(),
                    );
                    let _ = self.outbox.try_send(Frame::Keepalive(reply));
                }
            }
            Frame::Lease(lease) => match &self.lease {
                Some(state) => state
                    .lock()
                    .unwrap()
                    .renew(lease.ttl(), lease.number_of_requests()),
                None => trace!("LEASE frame without lease support"),
            },
            Frame::MetadataPush(push) => {
                let machine = self.clone();
                runtime::spawn(async move {
                    let fut = {
                        machine
                            .handler
                            .read()
                            .await
                            .metadata_push(push.into_metadata())
                    };
                    if let Err(err) = fut.await {
                        debug!("metadata push handler failed: {}", err);
                    }
                });
            }
            Frame::Error(ref error_frame) if error_frame.stream_id() == 0 => {
                let reason = Error::from_wire(
                    error_frame.code(),
                    error_frame.data(),
                );
                self.begin_close(&reason, false);
            }
            Frame::Ext(ref ext) if ext.is_ignorable() => (self.ignored)(&frame),
            Frame::Ext(_) => {
                self.protocol_violation("unsupported extension frame")
            }
            frame => self.dispatch_stream(frame, assembly),
        }
    }

    fn dispatch_stream(
        self: &Arc<Self>,
        frame: Frame,
        assembly: &mut HashMap<u32, Reassembler>,
    ) {
        let id = frame.stream_id();
        if assembly.contains_key(&id) {
            match frame {
                Frame::Payload(payload_frame) => {
                    if payload_frame.is_follows() {
                        let chain = assembly.get_mut(&id).unwrap();
                        chain.push(payload_frame.payload());
                    } else {
                        let chain = assembly.remove(&id).unwrap();
                        let kind = chain.kind();
                        let request_n = chain.initial_request_n();
                        let next = payload_frame.is_next();
                        let complete = payload_frame.is_complete();
                        let joined = chain.finish(payload_frame.payload());
                        self.dispatch_logical(
                            id, kind, request_n, joined, next, complete,
                        );
                    }
                }
                other => {
                    assembly.remove(&id);
                    self.protocol_violation(format!(
                        "{:?} frame interrupted a fragment chain on stream {}",
                        other.frame_type(),
                        id
                    ));
                }
            }
            return;
        }

        match frame {
            Frame::RequestResponse(request) => {
                if request.is_follows() {
                    assembly.insert(
                        id,
                        Reassembler::new(
                            ChainKind::Request(RequestKind::Response),
                            0,
                            request.payload(),
                        ),
                    );
                } else {
                    self.dispatch_logical(
                        id,
                        ChainKind::Request(RequestKind::Response),
                        0,
                        request.payload(),
                        true,
                        false,
                    );
                }
            }
            Frame::RequestFnf(request) => {
                if request.is_follows() {
                    assembly.insert(
                        id,
                        Reassembler::new(
                            ChainKind::Request(RequestKind::FireAndForget),
                            0,
                            request.payload(),
                        ),
                    );
                } else {
                    self.dispatch_logical(
                        id,
                        ChainKind::Request(RequestKind::FireAndForget),
                        0,
                        request.payload(),
                        true,
                        false,
                    );
                }
            }
            Frame::RequestStream(request) => {
                let request_n = request.initial_request_n();
                if request.is_follows() {
                    assembly.insert(
                        id,
                        Reassembler::new(
                            ChainKind::Request(RequestKind::Stream),
                            request_n,
                            request.payload(),
                        ),
                    );
                } else {
                    self.dispatch_logical(
                        id,
                        ChainKind::Request(RequestKind::Stream),
                        request_n,
                        request.payload(),
                        true,
                        false,
                    );
                }
            }
            Frame::RequestChannel(request) => {
                let request_n = request.initial_request_n();
                let complete = request.is_complete();
                if request.is_follows() {
                    assembly.insert(
                        id,
                        Reassembler::new(
                            ChainKind::Request(RequestKind::Channel),
                            request_n,
                            request.payload(),
                        ),
                    );
                } else {
                    self.dispatch_logical(
                        id,
                        ChainKind::Request(RequestKind::Channel),
                        request_n,
                        request.payload(),
                        true,
                        complete,
                    );
                }
            }
            Frame::Payload(payload_frame) => {
                if payload_frame.is_follows() {
                    assembly.insert(
                        id,
                        Reassembler::new(
                            ChainKind::Payload,
                            0,
                            payload_frame.payload(),
                        ),
                    );
                } else {
                    let next = payload_frame.is_next();
                    let complete = payload_frame.is_complete();
                    self.dispatch_logical(
                        id,
                        ChainKind::Payload,
                        0,
                        payload_frame.payload(),
                        next,
                        complete,
                    );
                }
            }
            Frame::RequestN(request_n) => match self.registry.get(id) {
                Some(slot) => slot.credits.add(request_n.request_n()),
                None => (self.ignored)(&Frame::RequestN(request_n)),
            },
            Frame::Cancel(_) => match self.registry.remove(id) {
                Some(slot) => {
                    slot.terminate();
                    let _ = slot.deliver(StreamEvent::Error(Error::canceled(
                        "canceled by peer",
                    )));
                }
                None => (self.ignored)(&frame),
            },
            Frame::Error(error_frame) => match self.registry.remove(id) {
                Some(slot) => {
                    slot.terminate();
                    let _ = slot.deliver(StreamEvent::Error(Error::from_wire(
                        error_frame.code(),
                        error_frame.data(),
                    )));
                }
                None => (self.ignored)(&Frame::Error(error_frame)),
            },
            _ => self.protocol_violation("connection frame routed to a stream"),
        }
    }

    fn dispatch_logical(
        self: &Arc<Self>,
        id: u32,
        kind: ChainKind,
        request_n: u32,
        payload: Payload,
        next: bool,
        complete: bool,
    ) {
        match kind {
            ChainKind::Request(RequestKind::Response) => {
                self.accept_request_response(id, payload)
            }
            ChainKind::Request(RequestKind::FireAndForget) => {
                self.accept_fire_and_forget(payload)
            }
            ChainKind::Request(RequestKind::Stream) => {
                self.accept_request_stream(id, request_n, payload)
            }
            ChainKind::Request(RequestKind::Channel) => {
                self.accept_request_channel(id, request_n, payload, complete)
            }
            ChainKind::Payload => {
                self.accept_payload(id, payload, next, complete)
            }
        }
    }

    /// PAYLOAD frames carry responses toward a requester or channel traffic in either
    /// direction.
    fn accept_payload(
        self: &Arc<Self>,
        id: u32,
        payload: Payload,
        next: bool,
        complete: bool,
    ) {
        let slot = match self.registry.get(id) {
            Some(slot) => slot,
            None => {
                let frame = Frame::Payload(PayloadFrame::new(
                    id, false, complete, next, payload,
                ));
                (self.ignored)(&frame);
                return;
            }
        };
        if next {
            if let Delivery::Overflow = slot.deliver(StreamEvent::Next(payload))
            {
                self.protocol_violation(format!(
                    "peer exceeded granted credit on stream {}",
                    id
                ));
                return;
            }
        }
        if complete {
            slot.remote_complete.store(true, Ordering::SeqCst);
            let _ = slot.deliver(StreamEvent::Complete);
            let both_closed = match slot.kind {
                StreamKind::RequestResponse | StreamKind::RequestStream => true,
                StreamKind::RequestChannel => {
                    slot.local_complete.load(Ordering::SeqCst)
                }
            };
            if both_closed {
                if let Some(removed) = self.registry.remove(id) {
                    removed.terminate();
                }
            }
        }
    }

    fn accept_request_response(self: &Arc<Self>, id: u32, payload: Payload) {
        let slot = StreamSlot::new(
            StreamKind::RequestResponse,
            StreamRole::Responder,
            None,
            Arc::new(Credits::new(0)),
        );
        if !self.registry.insert(id, slot.clone()) {
            (self.ignored)(&Frame::RequestResponse(RequestResponseFrame::new(
                id, false, payload,
            )));
            return;
        }
        let machine = self.clone();
        let task_slot = slot.clone();
        let task = runtime::spawn(async move {
            let response = {
                machine.handler.read().await.request_response(payload)
            }
            .await;
            if task_slot.is_terminated() {
                return;
            }
            match response {
                Ok(reply) => {
                    machine
                        .send_payload_chain(&task_slot, id, reply, true, true)
                        .await
                }
                Err(err) => machine.send_stream_error(id, &err).await,
            }
            if let Some(removed) = machine.registry.remove(id) {
                removed.terminate();
            }
        });
        slot.set_abort(task.abort_handle());
        self.watch_for_panic(id, task);
    }

    fn accept_fire_and_forget(self: &Arc<Self>, payload: Payload) {
        let machine = self.clone();
        runtime::spawn(async move {
            let outcome =
                { machine.handler.read().await.fire_and_forget(payload) };
            if let Err(err) = outcome {
                debug!("fire-and-forget handler failed: {}", err);
            }
        });
    }

    fn accept_request_stream(
        self: &Arc<Self>,
        id: u32,
        initial_request_n: u32,
        payload: Payload,
    ) {
        let credits = Arc::new(Credits::new(initial_request_n));
        let slot = StreamSlot::new(
            StreamKind::RequestStream,
            StreamRole::Responder,
            None,
            credits,
        );
        if !self.registry.insert(id, slot.clone()) {
            (self.ignored)(&Frame::RequestStream(RequestStreamFrame::new(
                id,
                false,
                initial_request_n,
                payload,
            )));
            return;
        }
        let machine = self.clone();
        let task_slot = slot.clone();
        let task = runtime::spawn(async move {
            let mut source =
                { machine.handler.read().await.request_stream(payload) };
            loop {
                match source.next().await {
                    Some(Ok(item)) => {
                        task_slot.credits.claim().await;
                        if task_slot.is_terminated() {
                            return;
                        }
                        machine
                            .send_payload_chain(&task_slot, id, item, true, false)
                            .await;
                    }
                    Some(Err(err)) => {
                        machine.send_stream_error(id, &err).await;
                        break;
                    }
                    None => {
                        let _ = machine
                            .send_frame(Frame::Payload(PayloadFrame::new(
                                id,
                                false,
                                true,
                                false,
                                Payload::default(),
                            )))
                            .await;
                        break;
                    }
                }
                if task_slot.is_terminated() {
                    return;
                }
            }
            if let Some(removed) = machine.registry.remove(id) {
                removed.terminate();
            }
        });
        slot.set_abort(task.abort_handle());
        self.watch_for_panic(id, task);
    }

    fn accept_request_channel(
        self: &Arc<Self>,
        id: u32,
        initial_request_n: u32,
        payload: Payload,
        complete: bool,
    ) {
        let credits = Arc::new(Credits::new(initial_request_n));
        let batch = self.initial_request_n;
        let (events_tx, events_rx) = mpsc::channel(event_capacity(batch));
        let slot = StreamSlot::new(
            StreamKind::RequestChannel,
            StreamRole::Responder,
            Some(events_tx.clone()),
            credits,
        );
        if !self.registry.insert(id, slot.clone()) {
            (self.ignored)(&Frame::RequestChannel(RequestChannelFrame::new(
                id,
                false,
                complete,
                initial_request_n,
                payload,
            )));
            return;
        }
        // grant credit for the requester's direction of the channel
        let _ = self
            .outbox
            .try_send(Frame::RequestN(RequestNFrame::new(id, batch)));
        let _ = events_tx.try_send(StreamEvent::Next(payload));
        if complete {
            slot.remote_complete.store(true, Ordering::SeqCst);
            let _ = events_tx.try_send(StreamEvent::Complete);
        }
        let guard = StreamGuard::new(
            id,
            self.registry.clone(),
            self.outbox.clone(),
            GuardMode::Silent,
        );
        let inbound: Flux<Result<Payload>> = Box::pin(PayloadStream::new(
            events_rx,
            guard,
            self.outbox.clone(),
            batch,
        ));
        let machine = self.clone();
        let task_slot = slot.clone();
        let task = runtime::spawn(async move {
            let source =
                { machine.handler.read().await.request_channel(inbound) };
            drive_channel_outbound(machine, task_slot, id, source).await;
        });
        slot.set_abort(task.abort_handle());
        self.watch_for_panic(id, task);
    }

    async fn send_payload_chain(
        &self,
        slot: &StreamSlot,
        id: u32,
        payload: Payload,
        next: bool,
        complete: bool,
    ) {
        for frame in self.fragmenter.fragment_payload(id, payload, next, complete)
        {
            if slot.is_terminated() {
                return;
            }
            if self.send_frame(frame).await.is_err() {
                return;
            }
        }
    }

    async fn send_stream_error(&self, id: u32, err: &Error) {
        let code = stream_scoped_code(err.wire_code());
        let data = err.message().map(Bytes::from);
        let _ = self
            .send_frame(Frame::Error(ErrorFrame::new(id, code, data)))
            .await;
    }

    /// Converts a panicking handler task into ERROR(APPLICATION_ERROR) toward the peer.
    fn watch_for_panic(self: &Arc<Self>, id: u32, task: JoinHandle<()>) {
        let machine = self.clone();
        runtime::spawn(async move {
            if let Err(join_err) = task.await {
                if join_err.is_panic() {
                    let message = panic_message(join_err);
                    error!("handler for stream {} panicked: {}", id, message);
                    machine
                        .send_stream_error(id, &Error::application(message))
                        .await;
                    if let Some(removed) = machine.registry.remove(id) {
                        removed.terminate();
                    }
                }
            }
        });
    }

    fn open_requester_stream(
        self: &Arc<Self>,
        payload: Payload,
    ) -> Result<Flux<Result<Payload>>> {
        self.ensure_open()?;
        self.lease_claim()?;
        let batch = self.initial_request_n;
        let (events_tx, events_rx) = mpsc::channel(event_capacity(batch));
        let id = self.stream_ids.next_stream_id(&self.registry);
        let slot = StreamSlot::new(
            StreamKind::RequestStream,
            StreamRole::Requester,
            Some(events_tx),
            Arc::new(Credits::new(0)),
        );
        if !self.registry.insert(id, slot) {
            return Err(Error::with_message(
                Kind::Invalid,
                "stream id collision",
            ));
        }
        let guard = StreamGuard::new(
            id,
            self.registry.clone(),
            self.outbox.clone(),
            GuardMode::CancelOnDrop,
        );
        let frames = self.fragmenter.fragment_request(
            RequestKind::Stream,
            id,
            batch,
            payload,
            false,
        );
        let machine = self.clone();
        runtime::spawn(async move {
            for frame in frames {
                if machine.send_frame(frame).await.is_err() {
                    break;
                }
            }
        });
        Ok(Box::pin(PayloadStream::new(
            events_rx,
            guard,
            self.outbox.clone(),
            batch,
        )))
    }

    fn open_requester_channel(
        self: &Arc<Self>,
        payloads: Flux<Result<Payload>>,
    ) -> Result<Flux<Result<Payload>>> {
        self.ensure_open()?;
        self.lease_claim()?;
        let batch = self.initial_request_n;
        let (events_tx, events_rx) = mpsc::channel(event_capacity(batch));
        let id = self.stream_ids.next_stream_id(&self.registry);
        let slot = StreamSlot::new(
            StreamKind::RequestChannel,
            StreamRole::Requester,
            Some(events_tx),
            Arc::new(Credits::new(0)),
        );
        if !self.registry.insert(id, slot.clone()) {
            return Err(Error::with_message(
                Kind::Invalid,
                "stream id collision",
            ));
        }
        let guard = StreamGuard::new(
            id,
            self.registry.clone(),
            self.outbox.clone(),
            GuardMode::CancelOnDrop,
        );
        let machine = self.clone();
        runtime::spawn(drive_channel_requester(
            machine, slot, id, payloads, batch,
        ));
        Ok(Box::pin(PayloadStream::new(
            events_rx,
            guard,
            self.outbox.clone(),
            batch,
        )))
    }
}

impl RSocket for RSocketMachine {
    fn request_response(&self, payload: Payload) -> Mono<Result<Payload>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_open()?;
            inner.lease_claim()?;
            let (events_tx, mut events_rx) = mpsc::channel(2);
            let id = inner.stream_ids.next_stream_id(&inner.registry);
            let slot = StreamSlot::new(
                StreamKind::RequestResponse,
                StreamRole::Requester,
                Some(events_tx),
                Arc::new(Credits::new(0)),
            );
            if !inner.registry.insert(id, slot) {
                return Err(Error::with_message(
                    Kind::Invalid,
                    "stream id collision",
                ));
            }
            let mut guard = StreamGuard::new(
                id,
                inner.registry.clone(),
                inner.outbox.clone(),
                GuardMode::CancelOnDrop,
            );
            for frame in inner.fragmenter.fragment_request(
                RequestKind::Response,
                id,
                0,
                payload,
                false,
            ) {
                inner.send_frame(frame).await?;
            }
            let mut value = None;
            loop {
                match events_rx.recv().await {
                    Some(StreamEvent::Next(payload)) => value = Some(payload),
                    Some(StreamEvent::Complete) => {
                        guard.disarm();
                        return Ok(value.unwrap_or_default());
                    }
                    Some(StreamEvent::Error(err)) => {
                        guard.disarm();
                        return Err(err);
                    }
                    None => {
                        guard.disarm();
                        return Err(Error::canceled("connection closed"));
                    }
                }
            }
        })
    }

    fn request_stream(&self, payload: Payload) -> Flux<Result<Payload>> {
        match self.inner.open_requester_stream(payload) {
            Ok(flux) => flux,
            Err(err) => Box::pin(tokio_stream::once(Err(err))),
        }
    }

    fn request_channel(
        &self,
        payloads: Flux<Result<Payload>>,
    ) -> Flux<Result<Payload>> {
        match self.inner.open_requester_channel(payloads) {
            Ok(flux) => flux,
            Err(err) => Box::pin(tokio_stream::once(Err(err))),
        }
    }

    fn fire_and_forget(&self, payload: Payload) -> Result<()> {
        let inner = &self.inner;
        inner.ensure_open()?;
        inner.lease_claim()?;
        let id = inner.stream_ids.next_stream_id(&inner.registry);
        for frame in inner.fragmenter.fragment_request(
            RequestKind::FireAndForget,
            id,
            0,
            payload,
            false,
        ) {
            inner.outbox.try_send(frame).map_err(|err| match err {
                TrySendError::Full(_) => {
                    Error::connection_error("outbound mailbox full")
                }
                TrySendError::Closed(_) => {
                    Error::connection_close("connection closed")
                }
            })?;
        }
        Ok(())
    }

    fn metadata_push(&self, metadata: Bytes) -> Mono<Result<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_open()?;
            inner
                .send_frame(Frame::MetadataPush(MetadataPushFrame::new(
                    metadata,
                )))
                .await
        })
    }
}

/// Pumps a channel's outbound direction: one credit per payload, COMPLETE on exhaustion, an
/// ERROR frame (terminating both directions) when the local source fails.
async fn drive_channel_outbound(
    machine: Arc<Machine>,
    slot: Arc<StreamSlot>,
    id: u32,
    mut source: Flux<Result<Payload>>,
) {
    loop {
        if slot.is_terminated() {
            return;
        }
        match source.next().await {
            Some(Ok(item)) => {
                slot.credits.claim().await;
                if slot.is_terminated() {
                    return;
                }
                machine.send_payload_chain(&slot, id, item, true, false).await;
            }
            Some(Err(err)) => {
                machine.send_stream_error(id, &err).await;
                if let Some(removed) = machine.registry.remove(id) {
                    removed.terminate();
                    let _ = removed.deliver(StreamEvent::Error(
                        Error::canceled("channel terminated by local error"),
                    ));
                }
                return;
            }
            None => {
                slot.local_complete.store(true, Ordering::SeqCst);
                let _ = machine
                    .send_frame(Frame::Payload(PayloadFrame::new(
                        id,
                        false,
                        true,
                        false,
                        Payload::default(),
                    )))
                    .await;
                if slot.remote_complete.load(Ordering::SeqCst) {
                    if let Some(removed) = machine.registry.remove(id) {
                        removed.terminate();
                    }
                }
                return;
            }
        }
    }
}

/// Requester half of a channel: the first local payload rides the REQUEST_CHANNEL head frame,
/// the rest flow as credit-gated PAYLOAD frames.
async fn drive_channel_requester(
    machine: Arc<Machine>,
    slot: Arc<StreamSlot>,
    id: u32,
    mut source: Flux<Result<Payload>>,
    initial_request_n: u32,
) {
    match source.next().await {
        Some(Ok(first)) => {
            for frame in machine.fragmenter.fragment_request(
                RequestKind::Channel,
                id,
                initial_request_n,
                first,
                false,
            ) {
                if machine.send_frame(frame).await.is_err() {
                    return;
                }
            }
        }
        Some(Err(err)) => {
            // nothing reached the wire yet, tear the stream down locally
            if let Some(removed) = machine.registry.remove(id) {
                removed.terminate();
                let _ = removed.deliver(StreamEvent::Error(err));
            }
            return;
        }
        None => {
            slot.local_complete.store(true, Ordering::SeqCst);
            for frame in machine.fragmenter.fragment_request(
                RequestKind::Channel,
                id,
                initial_request_n,
                Payload::default(),
                true,
            ) {
                if machine.send_frame(frame).await.is_err() {
                    return;
                }
            }
            return;
        }
    }
    drive_channel_outbound(machine, slot, id, source).await;
}

/// The connection driver: the single task owning the transport. Egress frames funnel through
/// the outbox so byte-level writes are serialized; ingress frames are decoded, counted for the
/// resume position, and dispatched.
async fn drive(
    machine: Arc<Machine>,
    mut connection: Box<dyn DuplexConnection>,
    mut outbox: mpsc::Receiver<Frame>,
) {
    let mut assembly: HashMap<u32, Reassembler> = HashMap::new();
    loop {
        tokio::select! {
            _ = machine.shutdown.notified() => {
                // flush already-queued egress, then stop
                while let Ok(frame) = outbox.try_recv() {
                    if connection.send(frame.to_bytes()).await.is_err() {
                        break;
                    }
                }
                break;
            }
            outbound = outbox.recv() => match outbound {
                Some(frame) => {
                    if let Err(err) = connection.send(frame.to_bytes()).await {
                        machine.begin_close(
                            &Error::connection_error(format!(
                                "transport write failed: {}",
                                err
                            )),
                            false,
                        );
                        break;
                    }
                }
                None => break,
            },
            inbound = connection.receive() => match inbound {
                Some(Ok(bytes)) => {
                    machine
                        .position
                        .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                    machine.keepalive.touch();
                    if machine.max_frame_len > 0
                        && bytes.len() > machine.max_frame_len
                    {
                        machine.protocol_violation(format!(
                            "frame of {} bytes exceeds the negotiated maximum of {}",
                            bytes.len(),
                            machine.max_frame_len
                        ));
                        continue;
                    }
                    let mut buf = bytes;
                    match Frame::decode(&mut buf) {
                        Ok(frame) => machine.dispatch(frame, &mut assembly),
                        Err(DecodeError::ZeroRequestN { stream_id }) => {
                            assembly.remove(&stream_id);
                            machine.reject_zero_request_n(stream_id);
                        }
                        Err(err) if err.is_ignorable() => {
                            trace!("dropping ignorable frame: {}", err);
                        }
                        Err(err) => {
                            warn!("malformed frame: {}", err);
                            machine.begin_close(&Error::from(err), true);
                        }
                    }
                }
                Some(Err(err)) => {
                    machine.begin_close(
                        &Error::connection_error(format!(
                            "transport read failed: {}",
                            err
                        )),
                        false,
                    );
                    break;
                }
                None => {
                    machine.begin_close(
                        &Error::connection_close("transport closed"),
                        false,
                    );
                    break;
                }
            },
        }
    }
    connection.close().await;
    machine.finish_close();
}

/// Periodic KEEPALIVE sender; runs on the client, which owns the negotiated interval.
async fn run_keepalive(machine: Arc<Machine>) {
    let mut status = machine.status.subscribe();
    let mut ticker = tokio::time::interval(machine.keepalive_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = Frame::Keepalive(KeepaliveFrame::new(
                    true,
                    machine.position(),
                    None,
                ));
                match machine.outbox.try_send(frame) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Closed(_)) => return,
                }
            }
            changed = status.changed() => {
                if changed.is_err() || status.borrow().is_closing() {
                    return;
                }
            }
        }
    }
}

/// Closes the connection with CONNECTION_ERROR("keepalive timeout") once the peer has been
/// quiet for a full max lifetime.
async fn run_lifetime_watcher(machine: Arc<Machine>) {
    let mut status = machine.status.subscribe();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(machine.keepalive_timeout) => {
                if machine.keepalive.expired(machine.keepalive_timeout) {
                    let reason = Error::new(Kind::ConnectionError, Some(Timeout));
                    machine.begin_close(&reason, true);
                    return;
                }
            }
            changed = status.changed() => {
                if changed.is_err() || status.borrow().is_closing() {
                    return;
                }
            }
        }
    }
}

async fn reject_connection(
    connection: &mut Box<dyn DuplexConnection>,
    code: u32,
    message: &str,
) {
    let data = if message.is_empty() {
        None
    } else {
        Some(Bytes::from(message.to_owned()))
    };
    let frame = Frame::Error(ErrorFrame::new(0, code, data));
    let _ = connection.send(frame.to_bytes()).await;
    connection.close().await;
}

fn connection_scoped_code(code: u32) -> u32 {
    match code {
        ErrorFrame::INVALID_SETUP
        | ErrorFrame::UNSUPPORTED_SETUP
        | ErrorFrame::REJECTED_SETUP
        | ErrorFrame::REJECTED_RESUME
        | ErrorFrame::CONNECTION_ERROR
        | ErrorFrame::CONNECTION_CLOSE => code,
        _ => ErrorFrame::CONNECTION_ERROR,
    }
}

fn stream_scoped_code(code: u32) -> u32 {
    match code {
        ErrorFrame::APPLICATION_ERROR
        | ErrorFrame::REJECTED
        | ErrorFrame::CANCELED
        | ErrorFrame::INVALID => code,
        code if (ErrorFrame::MIN_APPLICATION_ERROR_CODE
            ..=ErrorFrame::MAX_APPLICATION_ERROR_CODE)
            .contains(&code) =>
        {
            code
        }
        _ => ErrorFrame::APPLICATION_ERROR,
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(panic) => {
            if let Some(message) = panic.downcast_ref::<&str>() {
                (*message).to_owned()
            } else if let Some(message) = panic.downcast_ref::<String>() {
                message.clone()
            } else {
                "handler panicked".to_owned()
            }
        }
        Err(_) => "handler panicked".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{local_pair, LocalConnection};
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    fn fast_config() -> ConnectionConfig {
        ConnectionConfig::default()
            .set_keepalive_interval(Duration::from_millis(500))
            .set_keepalive_timeout(Duration::from_secs(2))
    }

    fn pong_acceptor() -> Acceptor {
        Box::new(|_setup, _requester| {
            let responder = Responder::builder()
                .request_response(|_payload| {
                    Box::pin(async { Ok(Payload::from("pong")) })
                })
                .build();
            Ok(Box::new(responder) as Box<dyn RSocket>)
        })
    }

    async fn connected_pair(
        client_config: ConnectionConfig,
        server_config: ConnectionConfig,
        acceptor: Acceptor,
    ) -> (RSocketMachine, RSocketMachine) {
        let (client_end, server_end) = local_pair();
        let server_task = runtime::spawn(RSocketMachine::server(
            Box::new(server_end),
            server_config,
            acceptor,
        ));
        let client = RSocketMachine::client(
            Box::new(client_end),
            client_config,
            Box::new(Responder::default()),
        )
        .await
        .unwrap();
        let server = server_task.await.unwrap().unwrap();
        (client, server)
    }

    /// Receives the next non-KEEPALIVE frame from a raw connection end.
    async fn recv_frame(conn: &mut LocalConnection) -> Frame {
        loop {
            let bytes = conn.receive().await.expect("connection closed").unwrap();
            let mut buf = bytes;
            match Frame::decode(&mut buf).unwrap() {
                Frame::Keepalive(_) => continue,
                frame => return frame,
            }
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    fn raw_setup() -> Frame {
        Frame::Setup(
            SetupFrame::builder()
                .set_keepalive_interval(500)
                .set_keepalive_timeout(2000)
                .build(),
        )
    }

    #[tokio::test]
    async fn request_response_happy_path() {
        let (client, server) =
            connected_pair(fast_config(), fast_config(), pong_acceptor()).await;

        let reply =
            client.request_response(Payload::from("ping")).await.unwrap();
        assert_eq!(reply.data_utf8(), Some("pong"));

        wait_for(|| {
            client.live_stream_count() == 0 && server.live_stream_count() == 0
        })
        .await;
        assert_eq!(client.status(), ConnectionStatus::Established);
        assert_eq!(server.status(), ConnectionStatus::Established);
    }

    #[tokio::test]
    async fn request_response_error_surfaces_to_the_requester() {
        let acceptor: Acceptor = Box::new(|_setup, _requester| {
            let responder = Responder::builder()
                .request_response(|_payload| {
                    Box::pin(async {
                        Err(Error::application("no such user"))
                    })
                })
                .build();
            Ok(Box::new(responder) as Box<dyn RSocket>)
        });
        let (client, _server) =
            connected_pair(fast_config(), fast_config(), acceptor).await;

        let err = client
            .request_response(Payload::from("lookup"))
            .await
            .unwrap_err();
        assert!(err.is_application_error());
        assert_eq!(err.message().unwrap(), "no such user");
    }

    #[tokio::test]
    async fn default_responder_rejects_requests() {
        let acceptor: Acceptor = Box::new(|_setup, _requester| {
            Ok(Box::new(Responder::default()) as Box<dyn RSocket>)
        });
        let (client, _server) =
            connected_pair(fast_config(), fast_config(), acceptor).await;

        let err =
            client.request_response(Payload::from("ping")).await.unwrap_err();
        assert!(err.is_rejected());
    }

    #[tokio::test]
    async fn fire_and_forget_reaches_the_handler() {
        let (seen_tx, mut seen_rx) = mpsc::channel(1);
        let acceptor: Acceptor = Box::new(move |_setup, _requester| {
            let seen_tx = seen_tx.clone();
            let responder = Responder::builder()
                .fire_and_forget(move |payload| {
                    let _ = seen_tx.try_send(
                        payload.data_utf8().unwrap_or("").to_owned(),
                    );
                    Ok(())
                })
                .build();
            Ok(Box::new(responder) as Box<dyn RSocket>)
        });
        let (client, _server) =
            connected_pair(fast_config(), fast_config(), acceptor).await;

        client.fire_and_forget(Payload::from("event")).unwrap();
        let seen = timeout(Duration::from_secs(1), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, "event");
    }

    #[tokio::test]
    async fn request_stream_delivers_in_order() {
        let acceptor: Acceptor = Box::new(|_setup, _requester| {
            let responder = Responder::builder()
                .request_stream(|_payload| {
                    Box::pin(tokio_stream::iter(vec![
                        Ok(Payload::from("a")),
                        Ok(Payload::from("b")),
                        Ok(Payload::from("c")),
                        Ok(Payload::from("d")),
                    ]))
                })
                .build();
            Ok(Box::new(responder) as Box<dyn RSocket>)
        });
        // a small window forces REQUEST_N replenishment mid-stream
        let client_config = fast_config().set_initial_request_n(2);
        let (client, server) =
            connected_pair(client_config, fast_config(), acceptor).await;

        let mut stream = client.request_stream(Payload::from("sub"));
        let mut received = Vec::new();
        while let Some(item) = stream.next().await {
            received.push(item.unwrap().data_utf8().unwrap().to_owned());
        }
        assert_eq!(received, vec!["a", "b", "c", "d"]);

        wait_for(|| {
            client.live_stream_count() == 0 && server.live_stream_count() == 0
        })
        .await;
    }

    #[tokio::test]
    async fn responder_waits_for_credit() {
        let (mut raw_client, server_end) = local_pair();
        let acceptor: Acceptor = Box::new(|_setup, _requester| {
            let responder = Responder::builder()
                .request_stream(|_payload| {
                    let items: Vec<Result<Payload>> = (0..4)
                        .map(|i| Ok(Payload::from(format!("item{}", i))))
                        .collect();
                    Box::pin(tokio_stream::iter(items))
                })
                .build();
            Ok(Box::new(responder) as Box<dyn RSocket>)
        });
        let server_task = runtime::spawn(RSocketMachine::server(
            Box::new(server_end),
            fast_config(),
            acceptor,
        ));
        raw_client.send(raw_setup().to_bytes()).await.unwrap();
        let server = server_task.await.unwrap().unwrap();

        raw_client
            .send(
                Frame::RequestStream(RequestStreamFrame::new(
                    1,
                    false,
                    2,
                    Payload::from("sub"),
                ))
                .to_bytes(),
            )
            .await
            .unwrap();

        for expected in ["item0", "item1"] {
            match recv_frame(&mut raw_client).await {
                Frame::Payload(frame) => {
                    assert!(frame.is_next());
                    assert_eq!(frame.data().unwrap(), expected.as_bytes());
                }
                other => panic!("unexpected frame {:?}", other),
            }
        }
        // the third payload must wait for more credit
        assert!(timeout(Duration::from_millis(100), raw_client.receive())
            .await
            .is_err());

        raw_client
            .send(Frame::RequestN(RequestNFrame::new(1, 2)).to_bytes())
            .await
            .unwrap();
        for expected in ["item2", "item3"] {
            match recv_frame(&mut raw_client).await {
                Frame::Payload(frame) => {
                    assert_eq!(frame.data().unwrap(), expected.as_bytes());
                }
                other => panic!("unexpected frame {:?}", other),
            }
        }
        match recv_frame(&mut raw_client).await {
            Frame::Payload(frame) => {
                assert!(frame.is_complete());
                assert!(!frame.is_next());
            }
            other => panic!("unexpected frame {:?}", other),
        }

        wait_for(|| server.live_stream_count() == 0).await;
    }

    #[tokio::test]
    async fn fragmented_request_round_trips() {
        let acceptor: Acceptor = Box::new(|_setup, _requester| {
            let responder = Responder::builder()
                .request_response(|payload| {
                    Box::pin(async move { Ok(payload) })
                })
                .build();
            Ok(Box::new(responder) as Box<dyn RSocket>)
        });
        let client_config = fast_config().set_fragment_mtu(64);
        let server_config = fast_config().set_fragment_mtu(64);
        let (client, _server) =
            connected_pair(client_config, server_config, acceptor).await;

        let payload = Payload::builder()
            .set_metadata(vec![0x03u8; 150])
            .set_data(vec![0x05u8; 200])
            .build();
        let reply =
            client.request_response(payload.clone()).await.unwrap();
        assert_eq!(reply, payload);
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_timeout_closes_the_connection() {
        let (client_end, mut raw_server) = local_pair();
        let client = RSocketMachine::client(
            Box::new(client_end),
            fast_config(),
            Box::new(Responder::default()),
        )
        .await
        .unwrap();
        // swallow every frame without ever answering
        runtime::spawn(async move {
            while raw_server.receive().await.is_some() {}
        });

        let started = tokio::time::Instant::now();
        let mut status = client.status_watch();
        while !status.borrow().is_closing() {
            status.changed().await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_secs(2));

        let (code, message) = client.close_reason().unwrap();
        assert_eq!(code, ErrorFrame::CONNECTION_ERROR);
        assert_eq!(message, "keepalive timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_echo_keeps_the_connection_established() {
        let (client_end, mut raw_server) = local_pair();
        let client = RSocketMachine::client(
            Box::new(client_end),
            fast_config(),
            Box::new(Responder::default()),
        )
        .await
        .unwrap();
        // answer every KEEPALIVE that asks for a response
        runtime::spawn(async move {
            while let Some(Ok(bytes)) = raw_server.receive().await {
                let mut buf = bytes;
                if let Ok(Frame::Keepalive(keepalive)) = Frame::decode(&mut buf)
                {
                    if keepalive.is_respond() {
                        let reply = Frame::Keepalive(KeepaliveFrame::new(
                            false,
                            0,
                            keepalive.into_data(),
                        ));
                        if raw_server.send(reply.to_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(client.status(), ConnectionStatus::Established);
    }

    #[tokio::test]
    async fn unknown_stream_frames_are_ignored() {
        let (mut raw_client, server_end) = local_pair();
        let ignored = Arc::new(AtomicUsize::new(0));
        let counter = ignored.clone();
        let config = fast_config().set_ignored_frame_consumer(Box::new(
            move |_frame| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));
        let server_task = runtime::spawn(RSocketMachine::server(
            Box::new(server_end),
            config,
            pong_acceptor(),
        ));
        raw_client.send(raw_setup().to_bytes()).await.unwrap();
        let server = server_task.await.unwrap().unwrap();

        raw_client
            .send(
                Frame::Payload(PayloadFrame::new(
                    99,
                    false,
                    false,
                    true,
                    Payload::from("stray"),
                ))
                .to_bytes(),
            )
            .await
            .unwrap();

        // the connection stays healthy: a request still round-trips
        raw_client
            .send(
                Frame::RequestResponse(RequestResponseFrame::new(
                    1,
                    false,
                    Payload::from("ping"),
                ))
                .to_bytes(),
            )
            .await
            .unwrap();
        match recv_frame(&mut raw_client).await {
            Frame::Payload(frame) => {
                assert_eq!(frame.stream_id(), 1);
                assert!(frame.is_next());
                assert!(frame.is_complete());
                assert_eq!(frame.data().unwrap(), "pong".as_bytes());
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(ignored.load(Ordering::SeqCst), 1);
        assert_eq!(server.status(), ConnectionStatus::Established);
    }

    #[tokio::test]
    async fn channel_clean_mutual_complete() {
        let acceptor: Acceptor = Box::new(|_setup, _requester| {
            let responder = Responder::builder()
                .request_channel(|inbound| {
                    Box::pin(inbound.map(|item| {
                        item.map(|payload| {
                            Payload::from(format!(
                                "ack:{}",
                                payload.data_utf8().unwrap_or("")
                            ))
                        })
                    }))
                })
                .build();
            Ok(Box::new(responder) as Box<dyn RSocket>)
        });
        let (client, server) =
            connected_pair(fast_config(), fast_config(), acceptor).await;

        let outbound: Flux<Result<Payload>> = Box::pin(tokio_stream::iter(
            vec![Ok(Payload::from("one")), Ok(Payload::from("two"))],
        ));
        let mut inbound = client.request_channel(outbound);
        let mut received = Vec::new();
        while let Some(item) = inbound.next().await {
            received.push(item.unwrap().data_utf8().unwrap().to_owned());
        }
        assert_eq!(received, vec!["ack:one", "ack:two"]);

        wait_for(|| {
            client.live_stream_count() == 0 && server.live_stream_count() == 0
        })
        .await;
    }

    #[tokio::test]
    async fn dropping_a_requester_stream_cancels_it() {
        let acceptor: Acceptor = Box::new(|_setup, _requester| {
            let responder = Responder::builder()
                .request_stream(|_payload| {
                    Box::pin(tokio_stream::iter(std::iter::repeat_with(
                        || Ok(Payload::from("tick")),
                    )))
                })
                .build();
            Ok(Box::new(responder) as Box<dyn RSocket>)
        });
        let (client, server) =
            connected_pair(fast_config(), fast_config(), acceptor).await;

        let mut stream = client.request_stream(Payload::from("sub"));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.data_utf8(), Some("tick"));
        drop(stream);

        wait_for(|| {
            client.live_stream_count() == 0 && server.live_stream_count() == 0
        })
        .await;
        assert_eq!(server.status(), ConnectionStatus::Established);
    }

    #[tokio::test]
    async fn server_rejects_unsupported_version() {
        let (mut raw_client, server_end) = local_pair();
        let server_task = runtime::spawn(RSocketMachine::server(
            Box::new(server_end),
            fast_config(),
            pong_acceptor(),
        ));
        let setup = SetupFrame::builder()
            .set_version(2, 0)
            .set_keepalive_interval(500)
            .set_keepalive_timeout(2000)
            .build();
        raw_client.send(Frame::Setup(setup).to_bytes()).await.unwrap();

        let err = server_task.await.unwrap().unwrap_err();
        assert!(err.is_unsupported_setup());
        match recv_frame(&mut raw_client).await {
            Frame::Error(frame) => {
                assert_eq!(frame.stream_id(), 0);
                assert_eq!(frame.code(), ErrorFrame::UNSUPPORTED_SETUP);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn acceptor_rejection_answers_rejected_setup() {
        let (mut raw_client, server_end) = local_pair();
        let acceptor: Acceptor = Box::new(|_setup, _requester| {
            Err(Error::rejected("not welcome here"))
        });
        let server_task = runtime::spawn(RSocketMachine::server(
            Box::new(server_end),
            fast_config(),
            acceptor,
        ));
        raw_client.send(raw_setup().to_bytes()).await.unwrap();

        let err = server_task.await.unwrap().unwrap_err();
        assert!(err.is_rejected());
        match recv_frame(&mut raw_client).await {
            Frame::Error(frame) => {
                assert_eq!(frame.stream_id(), 0);
                assert_eq!(frame.code(), ErrorFrame::REJECTED_SETUP);
                assert_eq!(frame.data_utf8(), Some("not welcome here"));
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn lease_blocks_requests_until_granted() {
        let (client_end, mut raw_server) = local_pair();
        let config = fast_config().set_lease_enabled(true);
        let client = RSocketMachine::client(
            Box::new(client_end),
            config,
            Box::new(Responder::default()),
        )
        .await
        .unwrap();

        // the SETUP frame announces the lease flag
        let bytes = raw_server.receive().await.unwrap().unwrap();
        let mut buf = bytes;
        match Frame::decode(&mut buf).unwrap() {
            Frame::Setup(setup) => assert!(setup.is_lease()),
            other => panic!("unexpected frame {:?}", other),
        }

        let err =
            client.fire_and_forget(Payload::from("too early")).unwrap_err();
        assert!(err.is_rejected());

        raw_server
            .send(Frame::Lease(LeaseFrame::new(30_000, 5, None)).to_bytes())
            .await
            .unwrap();
        let mut granted = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if client.fire_and_forget(Payload::from("ping")).is_ok() {
                granted = true;
                break;
            }
        }
        assert!(granted);
    }

    #[tokio::test]
    async fn foreign_frame_mid_chain_is_a_connection_error() {
        let (mut raw_client, server_end) = local_pair();
        let server_task = runtime::spawn(RSocketMachine::server(
            Box::new(server_end),
            fast_config(),
            pong_acceptor(),
        ));
        raw_client.send(raw_setup().to_bytes()).await.unwrap();
        let server = server_task.await.unwrap().unwrap();

        raw_client
            .send(
                Frame::RequestResponse(RequestResponseFrame::new(
                    1,
                    true,
                    Payload::from("frag"),
                ))
                .to_bytes(),
            )
            .await
            .unwrap();
        raw_client
            .send(Frame::RequestN(RequestNFrame::new(1, 5)).to_bytes())
            .await
            .unwrap();

        match recv_frame(&mut raw_client).await {
            Frame::Error(frame) => {
                assert_eq!(frame.stream_id(), 0);
                assert_eq!(frame.code(), ErrorFrame::CONNECTION_ERROR);
            }
            other => panic!("unexpected frame {:?}", other),
        }
        let mut status = server.status_watch();
        while !status.borrow().is_closing() {
            status.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn peer_connection_error_terminates_live_streams() {
        let (client_end, mut raw_server) = local_pair();
        let client = RSocketMachine::client(
            Box::new(client_end),
            fast_config(),
            Box::new(Responder::default()),
        )
        .await
        .unwrap();
        // consume SETUP
        let _ = raw_server.receive().await.unwrap().unwrap();

        let pending = client.request_response(Payload::from("ping"));
        let pending = runtime::spawn(pending);
        // wait for the request frame before failing the connection
        loop {
            let bytes = raw_server.receive().await.unwrap().unwrap();
            let mut buf = bytes;
            if let Ok(Frame::RequestResponse(_)) = Frame::decode(&mut buf) {
                break;
            }
        }
        raw_server
            .send(
                Frame::Error(ErrorFrame::new(
                    0,
                    ErrorFrame::CONNECTION_ERROR,
                    Some(Bytes::from("server on fire")),
                ))
                .to_bytes(),
            )
            .await
            .unwrap();

        let err = pending.await.unwrap().unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(client.live_stream_count(), 0);

        let mut status = client.status_watch();
        while *status.borrow() != ConnectionStatus::Closed {
            status.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn zero_request_n_terminates_only_its_stream() {
        use crate::frame::FrameType;
        use bytes::{BufMut, BytesMut};

        let (mut raw_client, server_end) = local_pair();
        let acceptor: Acceptor = Box::new(|_setup, _requester| {
            let responder = Responder::builder()
                .request_response(|_payload| {
                    Box::pin(async { Ok(Payload::from("pong")) })
                })
                .request_stream(|_payload| {
                    Box::pin(tokio_stream::iter(std::iter::repeat_with(
                        || Ok(Payload::from("tick")),
                    )))
                })
                .build();
            Ok(Box::new(responder) as Box<dyn RSocket>)
        });
        let server_task = runtime::spawn(RSocketMachine::server(
            Box::new(server_end),
            fast_config(),
            acceptor,
        ));
        raw_client.send(raw_setup().to_bytes()).await.unwrap();
        let server = server_task.await.unwrap().unwrap();

        raw_client
            .send(
                Frame::RequestStream(RequestStreamFrame::new(
                    1,
                    false,
                    1,
                    Payload::from("sub"),
                ))
                .to_bytes(),
            )
            .await
            .unwrap();
        match recv_frame(&mut raw_client).await {
            Frame::Payload(frame) => {
                assert_eq!(frame.data().unwrap(), "tick".as_bytes())
            }
            other => panic!("unexpected frame {:?}", other),
        }

        // the constructors refuse a zero count, so craft the frame by hand
        let mut bytes = BytesMut::new();
        bytes.put_u32(1);
        bytes.put_u16(FrameType::REQUEST_N.bits());
        bytes.put_u32(0);
        raw_client.send(bytes.freeze()).await.unwrap();

        match recv_frame(&mut raw_client).await {
            Frame::Error(frame) => {
                assert_eq!(frame.stream_id(), 1);
                assert_eq!(frame.code(), ErrorFrame::INVALID);
                assert_eq!(frame.data_utf8(), Some("request-n of zero"));
            }
            other => panic!("unexpected frame {:?}", other),
        }
        wait_for(|| server.live_stream_count() == 0).await;

        // only stream 1 died: the connection still serves requests
        raw_client
            .send(
                Frame::RequestResponse(RequestResponseFrame::new(
                    3,
                    false,
                    Payload::from("ping"),
                ))
                .to_bytes(),
            )
            .await
            .unwrap();
        match recv_frame(&mut raw_client).await {
            Frame::Payload(frame) => {
                assert_eq!(frame.stream_id(), 3);
                assert_eq!(frame.data().unwrap(), "pong".as_bytes());
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(server.status(), ConnectionStatus::Established);
        assert!(server.close_reason().is_none());
    }

    #[tokio::test]
    async fn zero_initial_request_n_is_answered_with_invalid() {
        use crate::frame::FrameType;
        use bytes::{BufMut, BytesMut};

        let (mut raw_client, server_end) = local_pair();
        let server_task = runtime::spawn(RSocketMachine::server(
            Box::new(server_end),
            fast_config(),
            pong_acceptor(),
        ));
        raw_client.send(raw_setup().to_bytes()).await.unwrap();
        let server = server_task.await.unwrap().unwrap();

        let mut bytes = BytesMut::new();
        bytes.put_u32(5);
        bytes.put_u16(FrameType::REQUEST_STREAM.bits());
        bytes.put_u32(0);
        bytes.put_slice(b"sub");
        raw_client.send(bytes.freeze()).await.unwrap();

        match recv_frame(&mut raw_client).await {
            Frame::Error(frame) => {
                assert_eq!(frame.stream_id(), 5);
                assert_eq!(frame.code(), ErrorFrame::INVALID);
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(server.status(), ConnectionStatus::Established);
        assert_eq!(server.live_stream_count(), 0);
    }

    #[tokio::test]
    async fn close_notifies_peer_and_terminates() {
        let (client, server) =
            connected_pair(fast_config(), fast_config(), pong_acceptor()).await;
        client.close();

        let mut client_status = client.status_watch();
        while *client_status.borrow() != ConnectionStatus::Closed {
            client_status.changed().await.unwrap();
        }
        let mut server_status = server.status_watch();
        while !server_status.borrow().is_closing() {
            server_status.changed().await.unwrap();
        }
        let (code, _) = server.close_reason().unwrap();
        assert_eq!(code, ErrorFrame::CONNECTION_CLOSE);
    }
}
