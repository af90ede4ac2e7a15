//! The RSocket prelude.
pub use crate::frame::{
    Data, Metadata, Payload, PayloadBuilder, PayloadChunks,
};
pub use crate::rsocket::{Flux, Mono, RSocket};
pub use crate::{Error, Result};

#[doc(inline)]
pub use crate::consts::DEFAULT_MIMETYPE;
