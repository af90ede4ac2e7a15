use super::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// The ext (extension) frame.
///
/// EXT frames carry an extended type outside the standard frame-type registry. A receiver that
/// does not understand the extended type MUST terminate the connection unless the IGNORE flag
/// is set.
///
/// # Frame Contents
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Stream ID                           |
/// +-----------+-+-+---------------+-------------------------------+
/// |Frame Type |I|M|    Flags      |
/// +-------------------------------+-------------------------------+
/// |0|                      Extended Type                          |
/// +---------------------------------------------------------------+
///                       Depends on Extended Type
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtFrame {
    stream_id: u32,
    flags: Flags,
    extended_type: u32,
    payload: Payload,
}

impl ExtFrame {
    /// Type of this frame.
    pub const TYPE: FrameType = FrameType::EXT;

    /// Create a new `Ext` frame.
    ///
    /// - `stream_id` and `extended_type` MUST be <= [`MAX_U31`].
    /// - flag `ignorable` permits receivers to drop the frame when the extended type is not
    ///   understood.
    pub fn new(
        stream_id: u32,
        ignorable: bool,
        extended_type: u32,
        payload: Payload,
    ) -> Self {
        debug_assert_max_u31!(stream_id, extended_type);
        let mut flags = Flags::empty();
        if ignorable {
            flags |= Flags::IGNORE;
        }
        if payload.has_metadata() {
            flags |= Flags::METADATA;
        }
        ExtFrame {
            stream_id: stream_id & MAX_U31,
            flags,
            extended_type: extended_type & MAX_U31,
            payload,
        }
    }

    /// Returns the stream ID of this frame.
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Returns true if this frame has the IGNORE flag set.
    pub fn is_ignorable(&self) -> bool {
        self.flags.is_ignore()
    }

    /// Returns the extended type of this frame.
    pub fn extended_type(&self) -> u32 {
        self.extended_type
    }

    /// Returns the payload attached to this frame.
    pub fn payload(self) -> Payload {
        self.payload
    }
}

impl Encode for ExtFrame {
    fn encode(&self, buf: &mut BytesMut) {
        put_header(buf, self.stream_id, ExtFrame::TYPE, self.flags);
        buf.put_u32(self.extended_type);
        put_payload(buf, &self.payload);
    }

    fn len(&self) -> usize {
        // header(6) + extended_type(4)
        10 + payload_wire_len(&self.payload)
    }
}

impl Decode for ExtFrame {
    type Value = Self;

    fn decode<B: Buf>(
        buf: &mut B,
        stream_id: u32,
        flags: Flags,
    ) -> Result<Self::Value> {
        let extended_type = eat_u31(buf)?;
        let payload = eat_payload(buf, stream_id, flags)?;
        Ok(ExtFrame { stream_id, flags, extended_type, payload })
    }
}
