use crate::Result;

use async_trait::async_trait;
use bytes::Bytes;

/// A duplex channel carrying whole RSocket frames between two peers.
///
/// Implementations adapt a concrete transport: TCP prefixes each frame with a 24-bit big-endian
/// length, WebSocket maps one frame to one binary message, in-memory pipes pass frames through
/// unchanged. The engine hands fully encoded frames to [`send`] and expects [`receive`] to
/// yield exactly one encoded frame per call.
///
/// [`send`]: DuplexConnection::send
/// [`receive`]: DuplexConnection::receive
#[async_trait]
pub trait DuplexConnection: Send {
    /// Sends one encoded frame to the remote peer.
    async fn send(&mut self, frame: Bytes) -> Result<()>;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `None` once the peer has closed its half of the connection.
    async fn receive(&mut self) -> Option<Result<Bytes>>;

    /// Closes the underlying connection.
    async fn close(&mut self);
}

/// Describes the lifecycle phase of an RSocket connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// The transport is attached but SETUP has not been exchanged yet.
    Connecting,
    /// Server side: waiting for the client's SETUP frame.
    AwaitingSetup,
    /// SETUP has been exchanged; streams can be opened.
    Established,
    /// The connection is shutting down; live streams are being terminated.
    Closing,
    /// The connection is fully closed.
    Closed,
}

impl ConnectionStatus {
    /// Returns true once the connection has begun (or finished) shutting down.
    pub fn is_closing(&self) -> bool {
        matches!(self, ConnectionStatus::Closing | ConnectionStatus::Closed)
    }
}
