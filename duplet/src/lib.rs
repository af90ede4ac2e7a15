//! Implementation of the RSocket protocol.
#![warn(
    rust_2018_idioms,
    missing_docs,
    missing_debug_implementations,
    rustdoc::broken_intra_doc_links
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate bitflags;

#[cfg(test)]
pub(crate) mod test_helpers;

mod consts;
mod error;
mod fragment;
mod rsocket;
mod runtime;

pub mod connection;
pub mod frame;
pub mod prelude;

pub use self::error::{Code, Error, Result};
pub use self::frame::{Data, Metadata, Payload, PayloadBuilder};
pub use self::rsocket::{Flux, Mono, RSocket, Responder, ResponderBuilder};
