use crate::connection::registry::StreamRegistry;

use std::sync::atomic::{AtomicU32, Ordering};

const STREAM_ID_MASK: u32 = 0x7FFF_FFFF;

/// Thread safe stream ID provider.
///
/// Clients allocate odd IDs, servers allocate even IDs; ID 0 is reserved for the connection.
/// The counter wraps at 2^31 and skips IDs still live in the registry.
#[derive(Debug)]
pub struct StreamIdProvider(AtomicU32);

impl StreamIdProvider {
    /// Create a client-side `StreamIdProvider`.
    pub fn new_for_client() -> StreamIdProvider {
        StreamIdProvider(AtomicU32::new(1))
    }

    /// Create a server-side `StreamIdProvider`.
    pub fn new_for_server() -> StreamIdProvider {
        StreamIdProvider(AtomicU32::new(2))
    }

    /// Returns the next available stream ID.
    pub(crate) fn next_stream_id(&self, registry: &StreamRegistry) -> u32 {
        loop {
            let sid = self.0.fetch_add(2, Ordering::Relaxed) & STREAM_ID_MASK;
            if sid != 0 && !registry.contains(sid) {
                return sid;
            }
        }
    }

    // for testing only
    #[cfg(test)]
    fn seeded(init: u32) -> StreamIdProvider {
        StreamIdProvider(AtomicU32::new(init))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn assert_send_sync() {
        assert_send::<StreamIdProvider>();
        assert_sync::<StreamIdProvider>();
    }

    #[test]
    fn first_client_stream_ids_are_odd() {
        let registry = StreamRegistry::new();
        let ids = StreamIdProvider::new_for_client();
        assert_eq!(ids.next_stream_id(&registry), 1);
        assert_eq!(ids.next_stream_id(&registry), 3);
    }

    #[test]
    fn first_server_stream_ids_are_even() {
        let registry = StreamRegistry::new();
        let ids = StreamIdProvider::new_for_server();
        assert_eq!(ids.next_stream_id(&registry), 2);
        assert_eq!(ids.next_stream_id(&registry), 4);
    }

    #[test]
    fn skips_live_ids() {
        let registry = StreamRegistry::new();
        registry.insert(3, crate::connection::streams::StreamSlot::for_test());
        let ids = StreamIdProvider::new_for_client();
        assert_eq!(ids.next_stream_id(&registry), 1);
        assert_eq!(ids.next_stream_id(&registry), 5);
    }

    #[test]
    fn wraps_around_on_overflow() {
        let registry = StreamRegistry::new();
        let ids = StreamIdProvider::seeded(STREAM_ID_MASK);
        assert_eq!(ids.next_stream_id(&registry), STREAM_ID_MASK);
        assert_eq!(ids.next_stream_id(&registry), 1);

        let registry = StreamRegistry::new();
        let ids = StreamIdProvider::seeded(STREAM_ID_MASK - 1);
        assert_eq!(ids.next_stream_id(&registry), STREAM_ID_MASK - 1);
        // the even counter lands on the reserved ID 0 after wrapping and skips it
        assert_eq!(ids.next_stream_id(&registry), 2);
    }
}
