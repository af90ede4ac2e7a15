use super::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// The request_channel frame.
///
/// # Frame Contents
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Stream ID                           |
/// +-----------+-+-+-+-+-----------+-------------------------------+
/// |Frame Type |0|M|F|C|  Flags    |
/// +-------------------------------+-------------------------------+
/// |0|                    Initial Request N                        |
/// +---------------------------------------------------------------+
///                       Metadata & Request Data
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestChannelFrame {
    stream_id: u32,
    flags: Flags,
    initial_request_n: u32,
    payload: Payload,
}

impl RequestChannelFrame {
    /// Type of this frame.
    pub const TYPE: FrameType = FrameType::REQUEST_CHANNEL;

    /// Create a new `RequestChannel` frame.
    ///
    /// - `stream_id` MUST be <= [`MAX_U31`].
    /// - flag `follows` means more fragments follow this fragment.
    /// - flag `complete` means the requester half-closes its direction with this frame.
    /// - `initial_request_n` MUST be > 0 and <= [`MAX_U31`].
    pub fn new(
        stream_id: u32,
        follows: bool,
        complete: bool,
        initial_request_n: u32,
        payload: Payload,
    ) -> Self {
        debug_assert_max_u31!(stream_id, initial_request_n);
        debug_assert_non_zero!(initial_request_n);
        let mut flags = Flags::empty();
        if follows {
            flags |= Flags::FOLLOWS;
        }
        if complete {
            flags |= Flags::COMPLETE;
        }
        if payload.has_metadata() {
            flags |= Flags::METADATA;
        }
        RequestChannelFrame {
            stream_id: stream_id & MAX_U31,
            flags,
            initial_request_n: initial_request_n & MAX_U31,
            payload,
        }
    }

    /// Returns the stream ID of this frame.
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Returns true if this frame has the FOLLOWS flag set.
    pub fn is_follows(&self) -> bool {
        self.flags.is_follows()
    }

    /// Returns true if this frame has the COMPLETE flag set.
    pub fn is_complete(&self) -> bool {
        self.flags.is_complete()
    }

    /// Returns the initial number of items to request.
    pub fn initial_request_n(&self) -> u32 {
        self.initial_request_n
    }

    /// Returns the metadata attached to this frame, if any.
    pub fn metadata(&self) -> Option<&Bytes> {
        self.payload.metadata()
    }

    /// Returns the data attached to this frame, if any.
    pub fn data(&self) -> Option<&Bytes> {
        self.payload.data()
    }

    /// Returns the payload attached to this frame.
    pub fn payload(self) -> Payload {
        self.payload
    }
}

impl Encode for RequestChannelFrame {
    fn encode(&self, buf: &mut BytesMut) {
        put_header(buf, self.stream_id, RequestChannelFrame::TYPE, self.flags);
        buf.put_u32(self.initial_request_n);
        put_payload(buf, &self.payload);
    }

    fn len(&self) -> usize {
        // header(6) + initial_request_n(4)
        10 + payload_wire_len(&self.payload)
    }
}

impl Decode for RequestChannelFrame {
    type Value = Self;

    fn decode<B: Buf>(
        buf: &mut B,
        stream_id: u32,
        flags: Flags,
    ) -> Result<Self::Value> {
        let initial_request_n = eat_u31(buf)?;
        if initial_request_n == 0 {
            return Err(DecodeError::ZeroRequestN { stream_id });
        }
        let payload = eat_payload(buf, stream_id, flags)?;
        Ok(RequestChannelFrame { stream_id, flags, initial_request_n, payload })
    }
}
