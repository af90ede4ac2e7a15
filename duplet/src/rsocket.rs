use crate::frame::Payload;
use crate::{Error, Result};

use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tokio_stream::Stream;

/// A future that resolves to a value exactly once.
pub type Mono<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A stream of values produced asynchronously.
pub type Flux<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// A trait that represents a Reactive Socket.
pub trait RSocket: Send + Sync {
    /// Request-Response interaction model of RSocket.
    fn request_response(&self, payload: Payload) -> Mono<Result<Payload>>;

    /// Request-Stream interaction model of RSocket.
    fn request_stream(&self, payload: Payload) -> Flux<Result<Payload>>;

    /// Request-Channel interaction model of RSocket.
    fn request_channel(
        &self,
        payloads: Flux<Result<Payload>>,
    ) -> Flux<Result<Payload>>;

    /// Fire-and-Forget interaction model of RSocket.
    fn fire_and_forget(&self, payload: Payload) -> Result<()>;

    /// Metadata-Push interaction model of RSocket.
    fn metadata_push(&self, metadata: Bytes) -> Mono<Result<()>>;
}

fn reject_mono<T>() -> Mono<Result<T>>
where
    T: Send + 'static,
{
    Box::pin(async { Err(Error::rejected("no handler registered")) })
}

fn reject_flux<T>() -> Flux<Result<T>>
where
    T: Send + 'static,
{
    Box::pin(tokio_stream::once(Err(Error::rejected(
        "no handler registered",
    ))))
}

type RequestResponseFn =
    dyn Fn(Payload) -> Mono<Result<Payload>> + Send + Sync;
type RequestStreamFn = dyn Fn(Payload) -> Flux<Result<Payload>> + Send + Sync;
type RequestChannelFn =
    dyn Fn(Flux<Result<Payload>>) -> Flux<Result<Payload>> + Send + Sync;
type FireAndForgetFn = dyn Fn(Payload) -> Result<()> + Send + Sync;
type MetadataPushFn = dyn Fn(Bytes) -> Mono<Result<()>> + Send + Sync;

/// An [`RSocket`] responder assembled from optional per-interaction handlers.
///
/// Interactions without a handler reject requests with `REJECTED`.
///
/// # Examples
///
/// ```
/// use duplet::prelude::*;
/// use duplet::Responder;
///
/// let responder = Responder::builder()
///     .request_response(|payload| {
///         Box::pin(async move { Ok(payload) })
///     })
///     .build();
/// ```
#[derive(Default)]
pub struct Responder {
    request_response: Option<Box<RequestResponseFn>>,
    request_stream: Option<Box<RequestStreamFn>>,
    request_channel: Option<Box<RequestChannelFn>>,
    fire_and_forget: Option<Box<FireAndForgetFn>>,
    metadata_push: Option<Box<MetadataPushFn>>,
}

impl Responder {
    /// Returns a [`ResponderBuilder`].
    pub fn builder() -> ResponderBuilder {
        ResponderBuilder(Responder::default())
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("request_response", &self.request_response.is_some())
            .field("request_stream", &self.request_stream.is_some())
            .field("request_channel", &self.request_channel.is_some())
            .field("fire_and_forget", &self.fire_and_forget.is_some())
            .field("metadata_push", &self.metadata_push.is_some())
            .finish()
    }
}

impl RSocket for Responder {
    fn request_response(&self, payload: Payload) -> Mono<Result<Payload>> {
        match &self.request_response {
            Some(handler) => handler(payload),
            None => reject_mono(),
        }
    }

    fn request_stream(&self, payload: Payload) -> Flux<Result<Payload>> {
        match &self.request_stream {
            Some(handler) => handler(payload),
            None => reject_flux(),
        }
    }

    fn request_channel(
        &self,
        payloads: Flux<Result<Payload>>,
    ) -> Flux<Result<Payload>> {
        match &self.request_channel {
            Some(handler) => handler(payloads),
            None => reject_flux(),
        }
    }

    fn fire_and_forget(&self, payload: Payload) -> Result<()> {
        match &self.fire_and_forget {
            Some(handler) => handler(payload),
            None => Err(Error::rejected("no handler registered")),
        }
    }

    fn metadata_push(&self, metadata: Bytes) -> Mono<Result<()>> {
        match &self.metadata_push {
            Some(handler) => handler(metadata),
            None => reject_mono(),
        }
    }
}

/// A builder for [`Responder`].
#[derive(Debug)]
pub struct ResponderBuilder(Responder);

impl ResponderBuilder {
    /// Sets the request-response handler.
    pub fn request_response<F>(mut self, handler: F) -> Self
    where
        F: Fn(Payload) -> Mono<Result<Payload>> + Send + Sync + 'static,
    {
        self.0.request_response = Some(Box::new(handler));
        self
    }

    /// Sets the request-stream handler.
    pub fn request_stream<F>(mut self, handler: F) -> Self
    where
        F: Fn(Payload) -> Flux<Result<Payload>> + Send + Sync + 'static,
    {
        self.0.request_stream = Some(Box::new(handler));
        self
    }

    /// Sets the request-channel handler.
    pub fn request_channel<F>(mut self, handler: F) -> Self
    where
        F: Fn(Flux<Result<Payload>>) -> Flux<Result<Payload>>
            + Send
            + Sync
            + 'static,
    {
        self.0.request_channel = Some(Box::new(handler));
        self
    }

    /// Sets the fire-and-forget handler.
    pub fn fire_and_forget<F>(mut self, handler: F) -> Self
    where
        F: Fn(Payload) -> Result<()> + Send + Sync + 'static,
    {
        self.0.fire_and_forget = Some(Box::new(handler));
        self
    }

    /// Sets the metadata-push handler.
    pub fn metadata_push<F>(mut self, handler: F) -> Self
    where
        F: Fn(Bytes) -> Mono<Result<()>> + Send + Sync + 'static,
    {
        self.0.metadata_push = Some(Box::new(handler));
        self
    }

    /// Returns the configured [`Responder`].
    pub fn build(self) -> Responder {
        self.0
    }
}
