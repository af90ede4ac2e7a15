use std::time::Duration;

/// Default value of the time between KEEPALIVE frames that the client will send.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default value of the time that a client will allow a server to not respond to
/// a KEEPALIVE before it is assumed to be dead.
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default mimetype for encoding metadata and data.
pub const DEFAULT_MIMETYPE: &str = "application/binary";

/// Default initial credit requested when opening a stream or channel.
pub const DEFAULT_REQUEST_N: u32 = 64;

/// Default fragmentation MTU. Zero disables fragmentation.
pub const DEFAULT_FRAGMENT_MTU: usize = 0;

/// The smallest MTU fragmentation can be configured with; anything lower cannot fit a frame
/// header plus a metadata length prefix.
pub const MIN_FRAGMENT_MTU: usize = 64;
