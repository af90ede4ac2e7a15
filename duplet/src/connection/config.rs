use crate::consts::{
    DEFAULT_FRAGMENT_MTU, DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_KEEPALIVE_TIMEOUT,
    DEFAULT_MIMETYPE, DEFAULT_REQUEST_N, MIN_FRAGMENT_MTU,
};
use crate::frame::{Payload, MAX_U31};

use bytes::Bytes;
use std::fmt;
use std::time::Duration;

use super::socket::{IgnoredFrameConsumer, ResumeStore};

/// Configuration for one RSocket connection.
///
/// # Examples
///
/// ```
/// use duplet::connection::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::default()
///     .set_keepalive_interval(Duration::from_millis(500))
///     .set_keepalive_timeout(Duration::from_secs(2))
///     .set_initial_request_n(16);
/// ```
pub struct ConnectionConfig {
    pub(crate) keepalive_interval: Duration,
    pub(crate) keepalive_timeout: Duration,
    pub(crate) fragment_mtu: usize,
    pub(crate) metadata_mimetype: String,
    pub(crate) data_mimetype: String,
    pub(crate) setup_payload: Payload,
    pub(crate) lease_enabled: bool,
    pub(crate) resume_token: Option<Bytes>,
    pub(crate) initial_request_n: u32,
    pub(crate) ignored_frame_consumer: Option<IgnoredFrameConsumer>,
    pub(crate) resume_store: Option<Box<dyn ResumeStore>>,
}

impl Default for ConnectionConfig {
    fn default() -> ConnectionConfig {
        ConnectionConfig {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            fragment_mtu: DEFAULT_FRAGMENT_MTU,
            metadata_mimetype: DEFAULT_MIMETYPE.to_owned(),
            data_mimetype: DEFAULT_MIMETYPE.to_owned(),
            setup_payload: Payload::default(),
            lease_enabled: false,
            resume_token: None,
            initial_request_n: DEFAULT_REQUEST_N,
            ignored_frame_consumer: None,
            resume_store: None,
        }
    }
}

impl ConnectionConfig {
    /// Sets the period between outbound KEEPALIVE frames.
    pub fn set_keepalive_interval(mut self, interval: Duration) -> Self {
        debug_assert!(!interval.is_zero());
        self.keepalive_interval = interval;
        self
    }

    /// Sets the deadline without inbound traffic after which the connection is closed.
    pub fn set_keepalive_timeout(mut self, timeout: Duration) -> Self {
        debug_assert!(!timeout.is_zero());
        self.keepalive_timeout = timeout;
        self
    }

    /// Sets the maximum encoded frame size. Zero disables fragmentation.
    pub fn set_fragment_mtu(mut self, mtu: usize) -> Self {
        debug_assert!(mtu == 0 || mtu >= MIN_FRAGMENT_MTU);
        self.fragment_mtu = mtu;
        self
    }

    /// Sets the metadata mimetype declared in SETUP. Opaque to the engine.
    pub fn set_metadata_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.metadata_mimetype = mimetype.into();
        self
    }

    /// Sets the data mimetype declared in SETUP. Opaque to the engine.
    pub fn set_data_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.data_mimetype = mimetype.into();
        self
    }

    /// Sets the opaque payload sent with SETUP.
    pub fn set_setup_payload(mut self, payload: Payload) -> Self {
        self.setup_payload = payload;
        self
    }

    /// Requests lease semantics in SETUP and enables local lease enforcement.
    pub fn set_lease_enabled(mut self, enabled: bool) -> Self {
        self.lease_enabled = enabled;
        self
    }

    /// Sets the resume identification token sent with SETUP.
    pub fn set_resume_token(mut self, token: Bytes) -> Self {
        assert!(token.len() <= 65_535);
        self.resume_token = Some(token);
        self
    }

    /// Sets the default initial credit requested when opening streams and channels.
    pub fn set_initial_request_n(mut self, n: u32) -> Self {
        debug_assert!(n > 0 && n <= MAX_U31);
        self.initial_request_n = n;
        self
    }

    /// Sets the callback invoked with frames that were legally ignored.
    ///
    /// The callback must not block. The default logs at trace level and drops the frame.
    pub fn set_ignored_frame_consumer(
        mut self,
        consumer: IgnoredFrameConsumer,
    ) -> Self {
        self.ignored_frame_consumer = Some(consumer);
        self
    }

    /// Sets the store collaborator that persists resume positions.
    pub fn set_resume_store(mut self, store: Box<dyn ResumeStore>) -> Self {
        self.resume_store = Some(store);
        self
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("keepalive_interval", &self.keepalive_interval)
            .field("keepalive_timeout", &self.keepalive_timeout)
            .field("fragment_mtu", &self.fragment_mtu)
            .field("metadata_mimetype", &self.metadata_mimetype)
            .field("data_mimetype", &self.data_mimetype)
            .field("lease_enabled", &self.lease_enabled)
            .field("resume_token", &self.resume_token.is_some())
            .field("initial_request_n", &self.initial_request_n)
            .finish_non_exhaustive()
    }
}
