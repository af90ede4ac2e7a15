use super::*;
use bytes::{Buf, BufMut, BytesMut};

/// The request_n frame.
///
/// # Frame Contents
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Stream ID                           |
/// +-----------+-+-+---------------+-------------------------------+
/// |Frame Type |0|0|     Flags     |
/// +-------------------------------+-------------------------------+
/// |0|                         Request N                           |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestNFrame {
    stream_id: u32,
    request_n: u32,
}

impl RequestNFrame {
    /// Type of this frame.
    pub const TYPE: FrameType = FrameType::REQUEST_N;

    /// Create a new `RequestN` frame.
    ///
    /// - `stream_id` MUST be <= [`MAX_U31`].
    /// - `request_n` is the number of items to request. Value MUST be > 0 and <= [`MAX_U31`].
    pub fn new(stream_id: u32, request_n: u32) -> Self {
        debug_assert_max_u31!(stream_id, request_n);
        debug_assert_non_zero!(request_n);
        RequestNFrame {
            stream_id: stream_id & MAX_U31,
            request_n: request_n & MAX_U31,
        }
    }

    /// Returns the stream ID of this frame.
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Returns the number of items to request.
    pub fn request_n(&self) -> u32 {
        self.request_n
    }
}

impl Encode for RequestNFrame {
    fn encode(&self, buf: &mut BytesMut) {
        put_header(buf, self.stream_id, RequestNFrame::TYPE, Flags::empty());
        buf.put_u32(self.request_n);
    }

    fn len(&self) -> usize {
        // header(6) + request_n(4)
        10
    }
}

impl Decode for RequestNFrame {
    type Value = Self;

    fn decode<B: Buf>(
        buf: &mut B,
        stream_id: u32,
        _flags: Flags,
    ) -> Result<Self::Value> {
        let request_n = eat_u31(buf)?;
        if request_n == 0 {
            return Err(DecodeError::ZeroRequestN { stream_id });
        }
        Ok(RequestNFrame { stream_id, request_n })
    }
}
