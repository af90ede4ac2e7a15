//! RSocket session between client and server.
mod config;
mod conn;
mod credits;
mod keepalive;
mod lease;
mod registry;
mod socket;
mod stream_id;
mod streams;

pub use self::config::ConnectionConfig;
pub use self::conn::{ConnectionStatus, DuplexConnection};
pub use self::credits::Credits;
pub use self::socket::{
    Acceptor, ConnectionSetup, IgnoredFrameConsumer, RSocketMachine,
    ResumeStore, Role,
};
pub use self::stream_id::StreamIdProvider;
