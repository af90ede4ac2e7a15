use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks when the last frame arrived from the peer.
///
/// Any inbound frame proves the peer alive, so the ingress loop touches the tracker on every
/// received frame; the lifetime watcher closes the connection once the tracker goes stale for
/// longer than the negotiated max lifetime.
#[derive(Debug)]
pub(crate) struct KeepaliveTracker {
    last_received: Mutex<Instant>,
}

impl KeepaliveTracker {
    pub(crate) fn new() -> KeepaliveTracker {
        KeepaliveTracker { last_received: Mutex::new(Instant::now()) }
    }

    /// Records that a frame just arrived.
    pub(crate) fn touch(&self) {
        *self.last_received.lock().unwrap() = Instant::now();
    }

    /// Returns true once nothing has arrived for at least `max_lifetime`.
    pub(crate) fn expired(&self, max_lifetime: Duration) -> bool {
        self.last_received.lock().unwrap().elapsed() >= max_lifetime
    }
}
