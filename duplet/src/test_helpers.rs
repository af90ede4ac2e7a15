//! Shared test doubles.
use crate::connection::DuplexConnection;
use crate::{Error, Result};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// One end of an in-memory duplex frame channel.
///
/// Frames travel whole, with no length prefix, mirroring how a local transport hands packets
/// to the engine.
pub(crate) struct LocalConnection {
    tx: mpsc::Sender<Bytes>,
    rx: mpsc::Receiver<Bytes>,
}

/// Builds two connected [`LocalConnection`] ends.
pub(crate) fn local_pair() -> (LocalConnection, LocalConnection) {
    let (left_tx, right_rx) = mpsc::channel(256);
    let (right_tx, left_rx) = mpsc::channel(256);
    (
        LocalConnection { tx: left_tx, rx: left_rx },
        LocalConnection { tx: right_tx, rx: right_rx },
    )
}

#[async_trait]
impl DuplexConnection for LocalConnection {
    async fn send(&mut self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| Error::connection_close("peer connection dropped"))
    }

    async fn receive(&mut self) -> Option<Result<Bytes>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}
