//! RSocket error and result types.
use crate::frame::codec::ErrorFrame;
use crate::frame::DecodeError;
use bytes::Bytes;
use std::error::Error as StdError;
use std::fmt;
use std::io;

/// A Result type aliased for [`Result`]<T, [`Error`]>.
///
/// [`Result`]: std::result::Result
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when handling RSocket streams.
pub struct Error {
    inner: Box<ErrorImpl>,
}

type Source = Box<dyn Send + Sync + StdError>;

struct ErrorImpl {
    kind: Kind,
    source: Option<Source>,
}

#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub(crate) enum Kind {
    // Decode errors
    Decode(DecodeError),

    // Protocol errors
    InvalidSetup,
    UnsupportedSetup,
    RejectedSetup,
    RejectedResume,
    ConnectionError,
    ConnectionClose,
    ApplicationError,
    Rejected,
    Canceled,
    Invalid,

    // IO errors
    Io,
}

/// A list of valid RSocket protocol error codes.
///
/// See [`here`] for more information about RSocket error codes.
///
/// [`here`]: https://github.com/rsocket/rsocket/blob/master/Protocol.md#error-codes
#[non_exhaustive]
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// The Setup frame is invalid for the server
    /// (it could be that the client is too recent for the old server).
    InvalidSetup       = 0x00000001,
    /// Some (or all) of the parameters specified by the client are unsupported by the server.
    UnsupportedSetup   = 0x00000002,
    /// The server rejected the setup, it can specify the reason in the payload.
    RejectedSetup      = 0x00000003,
    /// The server rejected the resume, it can specify the reason in the payload.
    RejectedResume     = 0x00000004,
    /// The connection is being terminated. Sender or Receiver of this frame MAY close the
    /// connection immediately without waiting for outstanding streams to terminate.
    ConnectionError    = 0x00000101,
    /// The connection is being terminated. Sender or Receiver of this frame MUST wait for
    /// outstanding streams to terminate before closing the connection. New requests MAY not be
    /// accepted.
    ConnectionClose    = 0x00000102,
    /// Application layer logic generating a Reactive Streams onError event.
    ApplicationError   = 0x00000201,
    /// Despite being a valid request, the Responder decided to reject it.
    /// The Responder guarantees that it didn't process the request.
    Rejected           = 0x00000202,
    /// The Responder canceled the request but may have started processing it
    /// (similar to REJECTED but doesn't guarantee lack of side-effects).
    Canceled           = 0x00000203,
    /// The request is invalid.
    Invalid            = 0x00000204,
}

impl Code {
    /// Converts a wire-level error code into a `Code`, if it is one of the registered codes.
    pub fn from_u32(code: u32) -> Option<Code> {
        match code {
            0x00000001 => Some(Code::InvalidSetup),
            0x00000002 => Some(Code::UnsupportedSetup),
            0x00000003 => Some(Code::RejectedSetup),
            0x00000004 => Some(Code::RejectedResume),
            0x00000101 => Some(Code::ConnectionError),
            0x00000102 => Some(Code::ConnectionClose),
            0x00000201 => Some(Code::ApplicationError),
            0x00000202 => Some(Code::Rejected),
            0x00000203 => Some(Code::Canceled),
            0x00000204 => Some(Code::Invalid),
            _ => None,
        }
    }
}

/// Marker for a missed keepalive deadline; used as the source of the connection error raised
/// when the peer goes quiet for longer than the negotiated max lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Timeout;

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("keepalive timeout")
    }
}

impl StdError for Timeout {}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<Source>,
    {
        Error {
            inner: Box::new(ErrorImpl {
                kind,
                source: source.map(Into::into),
            }),
        }
    }

    pub(crate) fn with_message(kind: Kind, message: impl Into<String>) -> Error {
        Error::new(kind, Some(message.into()))
    }

    /// Error raised when a request is rejected before processing.
    pub(crate) fn rejected(message: impl Into<String>) -> Error {
        Error::with_message(Kind::Rejected, message)
    }

    /// Error raised when a request is canceled.
    pub(crate) fn canceled(message: impl Into<String>) -> Error {
        Error::with_message(Kind::Canceled, message)
    }

    /// Error raised by application handlers.
    pub(crate) fn application(message: impl Into<String>) -> Error {
        Error::with_message(Kind::ApplicationError, message)
    }

    /// Connection-fatal error with a diagnostic message.
    pub(crate) fn connection_error(message: impl Into<String>) -> Error {
        Error::with_message(Kind::ConnectionError, message)
    }

    /// Orderly connection shutdown.
    pub(crate) fn connection_close(message: impl Into<String>) -> Error {
        Error::with_message(Kind::ConnectionClose, message)
    }

    /// Builds an `Error` from a wire-level ERROR frame code and data.
    ///
    /// Codes in the application-defined range (and any other code outside the registry) map to
    /// `APPLICATION_ERROR`; the original code is preserved in the diagnostic message.
    pub(crate) fn from_wire(code: u32, data: Option<&Bytes>) -> Error {
        let message = data
            .and_then(|d| std::str::from_utf8(d).ok())
            .unwrap_or_default()
            .to_owned();
        let kind = match Code::from_u32(code) {
            Some(Code::InvalidSetup) => Kind::InvalidSetup,
            Some(Code::UnsupportedSetup) => Kind::UnsupportedSetup,
            Some(Code::RejectedSetup) => Kind::RejectedSetup,
            Some(Code::RejectedResume) => Kind::RejectedResume,
            Some(Code::ConnectionError) => Kind::ConnectionError,
            Some(Code::ConnectionClose) => Kind::ConnectionClose,
            Some(Code::ApplicationError) => Kind::ApplicationError,
            Some(Code::Rejected) => Kind::Rejected,
            Some(Code::Canceled) => Kind::Canceled,
            Some(Code::Invalid) => Kind::Invalid,
            None => {
                let message = format!("custom error {:#010x}: {}", code, message);
                return Error::with_message(Kind::ApplicationError, message);
            }
        };
        if message.is_empty() {
            Error::new(kind, None::<Source>)
        } else {
            Error::with_message(kind, message)
        }
    }

    /// Returns the wire-level error code this error maps onto.
    pub(crate) fn wire_code(&self) -> u32 {
        use Kind::*;
        match self.inner.kind {
            InvalidSetup => ErrorFrame::INVALID_SETUP,
            UnsupportedSetup => ErrorFrame::UNSUPPORTED_SETUP,
            RejectedSetup => ErrorFrame::REJECTED_SETUP,
            RejectedResume => ErrorFrame::REJECTED_RESUME,
            ConnectionError | Decode(_) | Io => ErrorFrame::CONNECTION_ERROR,
            ConnectionClose => ErrorFrame::CONNECTION_CLOSE,
            ApplicationError => ErrorFrame::APPLICATION_ERROR,
            Rejected => ErrorFrame::REJECTED,
            Canceled => ErrorFrame::CANCELED,
            Invalid => ErrorFrame::INVALID,
        }
    }

    /// Returns the diagnostic message of this error, if any.
    pub fn message(&self) -> Option<String> {
        self.inner.source.as_ref().map(|s| s.to_string())
    }

    /// Returns true if this error is related to decoding `Bytes`.
    pub fn is_decode(&self) -> bool {
        matches!(self.inner.kind, Kind::Decode(_))
    }

    /// Returns true if this error is an RSocket protocol error.
    pub fn is_protocol(&self) -> bool {
        use Kind::*;
        matches!(
            self.inner.kind,
            InvalidSetup
                | UnsupportedSetup
                | RejectedSetup
                | RejectedResume
                | ConnectionError
                | ConnectionClose
                | ApplicationError
                | Rejected
                | Canceled
                | Invalid
        )
    }

    /// Returns true if this error is related to connection setup.
    pub fn is_setup(&self) -> bool {
        matches!(
            self.inner.kind,
            Kind::InvalidSetup | Kind::UnsupportedSetup | Kind::RejectedSetup
        )
    }

    /// Returns true if this is protocol error `INVALID_SETUP`.
    pub fn is_invalid_setup(&self) -> bool {
        matches!(self.inner.kind, Kind::InvalidSetup)
    }

    /// Returns true if this is protocol error `UNSUPPORTED_SETUP`.
    pub fn is_unsupported_setup(&self) -> bool {
        matches!(self.inner.kind, Kind::UnsupportedSetup)
    }

    /// Returns true if this is protocol error `REJECTED_SETUP`.
    pub fn is_rejected_setup(&self) -> bool {
        matches!(self.inner.kind, Kind::RejectedSetup)
    }

    /// Returns true if this is protocol error `REJECTED_RESUME`.
    pub fn is_rejected_resume(&self) -> bool {
        matches!(self.inner.kind, Kind::RejectedResume)
    }

    /// Returns true if this is protocol error `CONNECTION_ERROR`.
    pub fn is_connection_error(&self) -> bool {
        matches!(self.inner.kind, Kind::ConnectionError)
    }

    /// Returns true if this is protocol error `CONNECTION_CLOSE`.
    pub fn is_connection_close(&self) -> bool {
        matches!(self.inner.kind, Kind::ConnectionClose)
    }

    /// Returns true if this is protocol error `APPLICATION_ERROR`.
    pub fn is_application_error(&self) -> bool {
        matches!(self.inner.kind, Kind::ApplicationError)
    }

    /// Returns true if this is protocol error `REJECTED`.
    pub fn is_rejected(&self) -> bool {
        matches!(self.inner.kind, Kind::Rejected)
    }

    /// Returns true if this is protocol error `CANCELED`.
    pub fn is_canceled(&self) -> bool {
        matches!(self.inner.kind, Kind::Canceled)
    }

    /// Returns true if this is protocol error `INVALID`.
    pub fn is_invalid(&self) -> bool {
        matches!(self.inner.kind, Kind::Invalid)
    }

    fn description(&self) -> &str {
        use Kind::*;
        match &self.inner.kind {
            InvalidSetup => "INVALID_SETUP (0x00000001)",
            UnsupportedSetup => "UNSUPPORTED_SETUP (0x00000002)",
            RejectedSetup => "REJECTED_SETUP (0x00000003)",
            RejectedResume => "REJECTED_RESUME (0x00000004)",
            ConnectionError => "CONNECTION_ERROR (0x00000101)",
            ConnectionClose => "CONNECTION_CLOSE (0x00000102)",
            ApplicationError => "APPLICATION_ERROR (0x00000201)",
            Rejected => "REJECTED (0x00000202)",
            Canceled => "CANCELED (0x00000203)",
            Invalid => "INVALID (0x00000204)",
            Decode(_) => "error decoding frame",
            Io => "I/O error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref source) = self.inner.source {
            write!(f, "{}: {}", self.description(), source)
        } else {
            f.write_str(self.description())
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("duplet::Error");
        f.field(&self.inner.kind);
        if let Some(ref source) = self.inner.source {
            f.field(source);
        }
        f.finish()
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Error {
        let source = e.to_string();
        Error::new(Kind::Decode(e), Some(source))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::new(Kind::Io, Some(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn size_of() {
        assert_eq!(mem::size_of::<Error>(), mem::size_of::<usize>());
    }

    #[test]
    fn assert_send_sync() {
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn from_decode_error() {
        let decode = DecodeError::InComplete;
        let actual: Error = decode.clone().into();
        match actual.inner.kind {
            Kind::Decode(e) => assert_eq!(e, decode),
            _ => panic!("{:?}", actual),
        }
        assert!(actual.inner.source.is_some());
    }

    #[test]
    fn code_round_trip() {
        for code in [
            Code::InvalidSetup,
            Code::UnsupportedSetup,
            Code::RejectedSetup,
            Code::RejectedResume,
            Code::ConnectionError,
            Code::ConnectionClose,
            Code::ApplicationError,
            Code::Rejected,
            Code::Canceled,
            Code::Invalid,
        ] {
            assert_eq!(Code::from_u32(code as u32), Some(code));
        }
        assert_eq!(Code::from_u32(0xDEAD_BEEF), None);
    }

    #[test]
    fn wire_round_trip() {
        let err =
            Error::from_wire(0x00000202, Some(&Bytes::from("not today")));
        assert!(err.is_rejected());
        assert_eq!(err.wire_code(), 0x00000202);
        assert_eq!(err.message().unwrap(), "not today");
    }

    #[test]
    fn custom_code_maps_to_application_error(){
        let err = Error::from_wire(0x00000400, None);
        assert!(err.is_application_error());
    }

    #[test]
    fn keepalive_timeout_is_connection_error() {
        let err = Error::new(Kind::ConnectionError, Some(Timeout));
        assert!(err.is_connection_error());
        assert_eq!(err.message().unwrap(), "keepalive timeout");
    }
}
