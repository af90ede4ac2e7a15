use super::Flags;
use bytes::Buf;
use std::error::Error as StdError;
use std::fmt;

/// A trait for decoding bytes into a frame.
pub trait Decode {
    /// The value decoded into.
    type Value;

    /// Decodes the given bytes into a frame.
    ///
    /// The caller is expected to have consumed the 6-byte frame header already and to pass the
    /// parsed `stream_id` and `flags` in.
    fn decode<B: Buf>(
        bytes: &mut B,
        stream_id: u32,
        flags: Flags,
    ) -> Result<Self::Value, DecodeError>;
}

/// Errors that can occur when decoding bytes into a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// Not enough data is available to parse a frame.
    InComplete,
    /// The reserved high bit of the stream ID field is set.
    ReservedBitSet,
    /// The decoded frame type is unrecognized. `ignorable` mirrors the IGNORE flag of the
    /// offending frame, which decides whether the receiver may drop it silently.
    UnrecognizedFrameType {
        /// raw 6-bit frame type value
        value: u16,
        /// whether the frame carried the IGNORE flag
        ignorable: bool,
    },
    /// The decoded stream ID is invalid for the frame type.
    InvalidStreamId {
        /// expected stream ID
        expected: &'static str,
        /// found stream ID
        found: u32,
    },
    /// The declared metadata length exceeds the remaining frame body.
    InvalidMetadataLength {
        /// stream the frame belongs to
        stream_id: u32,
        /// declared metadata length
        declared: usize,
        /// bytes actually remaining in the frame body
        available: usize,
    },
    /// A REQUEST_N or initial-request-n field of zero.
    ZeroRequestN {
        /// stream the frame belongs to
        stream_id: u32,
    },
    /// A PAYLOAD frame with none of FOLLOWS, COMPLETE or NEXT set.
    BlankPayloadFlags {
        /// stream the frame belongs to
        stream_id: u32,
    },
    /// An ERROR frame whose error code is outside the ranges its stream ID allows.
    InvalidErrorCode {
        /// stream the frame belongs to
        stream_id: u32,
        /// offending error code
        code: u32,
    },
}

impl DecodeError {
    /// Returns the stream ID the error pertains to (0 for connection-level errors).
    pub fn stream_id(&self) -> u32 {
        match self {
            DecodeError::InvalidMetadataLength { stream_id, .. }
            | DecodeError::ZeroRequestN { stream_id }
            | DecodeError::BlankPayloadFlags { stream_id }
            | DecodeError::InvalidErrorCode { stream_id, .. } => *stream_id,
            DecodeError::InvalidStreamId { found, .. } => *found,
            _ => 0,
        }
    }

    /// Returns true if the offending frame carried the IGNORE flag and may be dropped without
    /// terminating the connection.
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            DecodeError::UnrecognizedFrameType { ignorable: true, .. }
        )
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DecodeError::*;
        match self {
            InComplete => write!(f, "incomplete frame"),
            ReservedBitSet => write!(f, "reserved stream ID bit is set"),
            UnrecognizedFrameType { value, .. } => {
                write!(f, "unrecognized frame type {:#x}", value)
            }
            InvalidStreamId { expected, found } => write!(
                f,
                "invalid stream ID (expected {}, found {})",
                expected, found
            ),
            InvalidMetadataLength { declared, available, .. } => write!(
                f,
                "metadata length {} exceeds remaining frame body {}",
                declared, available
            ),
            ZeroRequestN { stream_id } => {
                write!(f, "request-n of zero on stream {}", stream_id)
            }
            BlankPayloadFlags { stream_id } => write!(
                f,
                "payload frame without FOLLOWS, COMPLETE or NEXT on stream {}",
                stream_id
            ),
            InvalidErrorCode { stream_id, code } => write!(
                f,
                "error code {:#010x} not allowed on stream {}",
                code, stream_id
            ),
        }
    }
}

impl StdError for DecodeError {}
