use super::*;
use bytes::{Buf, BytesMut};

/// The cancel frame.
///
/// # Frame Contents
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Stream ID                           |
/// +-----------+-+-+---------------+-------------------------------+
/// |Frame Type |0|0|    Flags      |
/// +-----------+-+-+---------------+-------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelFrame {
    stream_id: u32,
}

impl CancelFrame {
    /// Type of this frame.
    pub const TYPE: FrameType = FrameType::CANCEL;

    /// Create a new `Cancel` frame.
    ///
    /// - `stream_id` MUST be <= [`MAX_U31`].
    pub fn new(stream_id: u32) -> Self {
        debug_assert_max_u31!(stream_id);
        CancelFrame { stream_id: stream_id & MAX_U31 }
    }

    /// Returns the stream ID of this frame.
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }
}

impl Encode for CancelFrame {
    fn encode(&self, buf: &mut BytesMut) {
        put_header(buf, self.stream_id, CancelFrame::TYPE, Flags::empty());
    }

    fn len(&self) -> usize {
        6
    }
}

impl Decode for CancelFrame {
    type Value = Self;

    fn decode<B: Buf>(
        _buf: &mut B,
        stream_id: u32,
        _flags: Flags,
    ) -> Result<Self::Value> {
        Ok(CancelFrame { stream_id })
    }
}
