//! Provides the [`Frame`] type that represents an RSocket protocol frame, and utilities for
//! encoding/decoding frames into/from byte arrays.
pub mod codec;

mod decode;
mod encode;
mod flags;
mod payload;
mod u24;
mod version;
mod visit;

pub use self::decode::{Decode, DecodeError};
pub use self::encode::Encode;
pub use self::flags::{Flags, FrameType};
pub use self::payload::{
    Data, Metadata, Payload, PayloadBuilder, PayloadChunks,
};
pub use self::u24::U24;
pub use self::version::Version;

use bytes::{Buf, BytesMut};
use codec::*;
use visit::*;

/// The maximum value a 31-bit unsigned integer can hold.
pub const MAX_U31: u32 = 0x7FFF_FFFF;

/// The maximum value a 63-bit unsigned integer can hold.
pub const MAX_U63: u64 = 0x7FFF_FFFF_FFFF_FFFF;

/// Length (in bytes) of the frame header: stream ID plus frame type and flags.
pub const FRAME_HEADER_LEN: usize = 6;

/// A frame in the RSocket protocol.
///
/// A frame is a single message in the RSocket protocol, which can be a request, response or
/// protocol processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The SETUP frame.
    Setup(SetupFrame),
    /// The ERROR frame.
    Error(ErrorFrame),
    /// The LEASE frame.
    Lease(LeaseFrame),
    /// The KEEPALIVE frame.
    Keepalive(KeepaliveFrame),
    /// The REQUEST_RESPONSE frame.
    RequestResponse(RequestResponseFrame),
    /// The REQUEST_FNF frame.
    RequestFnf(RequestFnfFrame),
    /// The REQUEST_STREAM frame.
    RequestStream(RequestStreamFrame),
    /// The REQUEST_CHANNEL frame.
    RequestChannel(RequestChannelFrame),
    /// The REQUEST_N frame.
    RequestN(RequestNFrame),
    /// The CANCEL frame.
    Cancel(CancelFrame),
    /// The PAYLOAD frame.
    Payload(PayloadFrame),
    /// The METADATA_PUSH frame.
    MetadataPush(MetadataPushFrame),
    /// The RESUME frame.
    Resume(ResumeFrame),
    /// The RESUME_OK frame.
    ResumeOk(ResumeOkFrame),
    /// The EXT frame.
    Ext(ExtFrame),
}

impl Frame {
    /// Returns the type of this frame.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Setup(_) => FrameType::SETUP,
            Frame::Error(_) => FrameType::ERROR,
            Frame::Lease(_) => FrameType::LEASE,
            Frame::Keepalive(_) => FrameType::KEEPALIVE,
            Frame::RequestResponse(_) => FrameType::REQUEST_RESPONSE,
            Frame::RequestFnf(_) => FrameType::REQUEST_FNF,
            Frame::RequestStream(_) => FrameType::REQUEST_STREAM,
            Frame::RequestChannel(_) => FrameType::REQUEST_CHANNEL,
            Frame::RequestN(_) => FrameType::REQUEST_N,
            Frame::Cancel(_) => FrameType::CANCEL,
            Frame::Payload(_) => FrameType::PAYLOAD,
            Frame::MetadataPush(_) => FrameType::METADATA_PUSH,
            Frame::Resume(_) => FrameType::RESUME,
            Frame::ResumeOk(_) => FrameType::RESUME_OK,
            Frame::Ext(_) => FrameType::EXT,
        }
    }

    /// Returns the stream ID this frame belongs to (0 for connection-level frames).
    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::Setup(_)
            | Frame::Lease(_)
            | Frame::Keepalive(_)
            | Frame::MetadataPush(_)
            | Frame::Resume(_)
            | Frame::ResumeOk(_) => 0,
            Frame::Error(v) => v.stream_id(),
            Frame::RequestResponse(v) => v.stream_id(),
            Frame::RequestFnf(v) => v.stream_id(),
            Frame::RequestStream(v) => v.stream_id(),
            Frame::RequestChannel(v) => v.stream_id(),
            Frame::RequestN(v) => v.stream_id(),
            Frame::Cancel(v) => v.stream_id(),
            Frame::Payload(v) => v.stream_id(),
            Frame::Ext(v) => v.stream_id(),
        }
    }

    /// Decode the given bytes into a frame.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < FRAME_HEADER_LEN {
            return Err(DecodeError::InComplete);
        }
        let stream_id = eat_stream_id(buf)?;
        let (frame_type, flags) = eat_flags(buf)?;

        if frame_type.is_connection_scoped() && stream_id != 0 {
            return Err(DecodeError::InvalidStreamId {
                expected: "0",
                found: stream_id,
            });
        }
        if frame_type.is_stream_scoped() && stream_id == 0 {
            return Err(DecodeError::InvalidStreamId {
                expected: "> 0",
                found: stream_id,
            });
        }

        Ok(match frame_type {
            FrameType::SETUP => {
                Frame::Setup(SetupFrame::decode(buf, stream_id, flags)?)
            }
            FrameType::ERROR => {
                Frame::Error(ErrorFrame::decode(buf, stream_id, flags)?)
            }
            FrameType::LEASE => {
                Frame::Lease(LeaseFrame::decode(buf, stream_id, flags)?)
            }
            FrameType::KEEPALIVE => Frame::Keepalive(KeepaliveFrame::decode(
                buf, stream_id, flags,
            )?),
            FrameType::REQUEST_RESPONSE => Frame::RequestResponse(
                RequestResponseFrame::decode(buf, stream_id, flags)?,
            ),
            FrameType::REQUEST_FNF => Frame::RequestFnf(
                RequestFnfFrame::decode(buf, stream_id, flags)?,
            ),
            FrameType::REQUEST_STREAM => Frame::RequestStream(
                RequestStreamFrame::decode(buf, stream_id, flags)?,
            ),
            FrameType::REQUEST_CHANNEL => Frame::RequestChannel(
                RequestChannelFrame::decode(buf, stream_id, flags)?,
            ),
            FrameType::REQUEST_N => {
                Frame::RequestN(RequestNFrame::decode(buf, stream_id, flags)?)
            }
            FrameType::CANCEL => {
                Frame::Cancel(CancelFrame::decode(buf, stream_id, flags)?)
            }
            FrameType::PAYLOAD => {
                Frame::Payload(PayloadFrame::decode(buf, stream_id, flags)?)
            }
            FrameType::METADATA_PUSH => Frame::MetadataPush(
                MetadataPushFrame::decode(buf, stream_id, flags)?,
            ),
            FrameType::RESUME => {
                Frame::Resume(ResumeFrame::decode(buf, stream_id, flags)?)
            }
            FrameType::RESUME_OK => {
                Frame::ResumeOk(ResumeOkFrame::decode(buf, stream_id, flags)?)
            }
            FrameType::EXT => {
                Frame::Ext(ExtFrame::decode(buf, stream_id, flags)?)
            }
        })
    }
}

impl Encode for Frame {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Frame::Setup(v) => v.encode(buf),
            Frame::Error(v) => v.encode(buf),
            Frame::Lease(v) => v.encode(buf),
            Frame::Keepalive(v) => v.encode(buf),
            Frame::RequestResponse(v) => v.encode(buf),
            Frame::RequestFnf(v) => v.encode(buf),
            Frame::RequestStream(v) => v.encode(buf),
            Frame::RequestChannel(v) => v.encode(buf),
            Frame::RequestN(v) => v.encode(buf),
            Frame::Cancel(v) => v.encode(buf),
            Frame::Payload(v) => v.encode(buf),
            Frame::MetadataPush(v) => v.encode(buf),
            Frame::Resume(v) => v.encode(buf),
            Frame::ResumeOk(v) => v.encode(buf),
            Frame::Ext(v) => v.encode(buf),
        }
    }

    fn len(&self) -> usize {
        match self {
            Frame::Setup(v) => v.len(),
            Frame::Error(v) => v.len(),
            Frame::Lease(v) => v.len(),
            Frame::Keepalive(v) => v.len(),
            Frame::RequestResponse(v) => v.len(),
            Frame::RequestFnf(v) => v.len(),
            Frame::RequestStream(v) => v.len(),
            Frame::RequestChannel(v) => v.len(),
            Frame::RequestN(v) => v.len(),
            Frame::Cancel(v) => v.len(),
            Frame::Payload(v) => v.len(),
            Frame::MetadataPush(v) => v.len(),
            Frame::Resume(v) => v.len(),
            Frame::ResumeOk(v) => v.len(),
            Frame::Ext(v) => v.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, Bytes};

    fn round_trip(frame: Frame) {
        let mut bytes = frame.to_bytes();
        assert_eq!(bytes.len(), frame.len());
        let decoded = Frame::decode(&mut bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_max_u31() {
        assert_eq!(MAX_U31, u32::MAX >> 1);
    }

    #[test]
    fn test_max_u63() {
        assert_eq!(MAX_U63, u64::MAX >> 1);
    }

    #[test]
    fn round_trips_every_frame_kind() {
        let payload = Payload::builder()
            .set_metadata(Bytes::from("metadata"))
            .set_data(Bytes::from("data"))
            .build();

        round_trip(Frame::Setup(
            SetupFrame::builder()
                .set_keepalive_interval(500)
                .set_keepalive_timeout(2000)
                .set_data(Bytes::from("setup"))
                .build(),
        ));
        round_trip(Frame::Error(ErrorFrame::new(
            1,
            ErrorFrame::APPLICATION_ERROR,
            Some(Bytes::from("oops")),
        )));
        round_trip(Frame::Lease(LeaseFrame::new(1000, 10, None)));
        round_trip(Frame::Keepalive(KeepaliveFrame::new(true, 17, None)));
        round_trip(Frame::RequestResponse(RequestResponseFrame::new(
            1,
            false,
            payload.clone(),
        )));
        round_trip(Frame::RequestFnf(RequestFnfFrame::new(
            3,
            false,
            payload.clone(),
        )));
        round_trip(Frame::RequestStream(RequestStreamFrame::new(
            5,
            false,
            16,
            payload.clone(),
        )));
        round_trip(Frame::RequestChannel(RequestChannelFrame::new(
            7,
            false,
            false,
            16,
            payload.clone(),
        )));
        round_trip(Frame::RequestN(RequestNFrame::new(5, 4)));
        round_trip(Frame::Cancel(CancelFrame::new(5)));
        round_trip(Frame::Payload(PayloadFrame::new(
            5, false, true, true, payload,
        )));
        round_trip(Frame::MetadataPush(MetadataPushFrame::new(Bytes::from(
            "event",
        ))));
        round_trip(Frame::Resume(ResumeFrame::new(
            Version::V1,
            Bytes::from("token"),
            9,
            3,
        )));
        round_trip(Frame::ResumeOk(ResumeOkFrame::new(9)));
        round_trip(Frame::Ext(ExtFrame::new(
            0,
            true,
            0x42,
            Payload::from("ext"),
        )));
    }

    #[test]
    fn rejects_stream_frame_on_stream_zero() {
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        buf.put_u16(FrameType::CANCEL.bits());
        let mut buf = buf.freeze();
        assert_eq!(
            Frame::decode(&mut buf),
            Err(DecodeError::InvalidStreamId { expected: "> 0", found: 0 })
        );
    }

    #[test]
    fn rejects_connection_frame_on_nonzero_stream() {
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.put_u16(FrameType::KEEPALIVE.bits());
        buf.put_u64(0);
        let mut buf = buf.freeze();
        assert_eq!(
            Frame::decode(&mut buf),
            Err(DecodeError::InvalidStreamId { expected: "0", found: 2 })
        );
    }

    #[test]
    fn truncated_header() {
        let mut buf = Bytes::from_static(&[0, 0, 0]);
        assert_eq!(Frame::decode(&mut buf), Err(DecodeError::InComplete));
    }
}
