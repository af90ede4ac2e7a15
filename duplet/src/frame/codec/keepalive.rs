use super::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// The keepalive frame.
///
/// # Frame Contents
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Stream ID = 0                         |
/// +-----------+-+-+-+-------------+-------------------------------+
/// |Frame Type |0|0|R|    Flags    |
/// +-----------+-+-+-+-------------+-------------------------------+
/// |0|                  Last Received Position                     |
/// +                                                               +
/// |                                                               |
/// +---------------------------------------------------------------+
///                              Data
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveFrame {
    respond: bool,
    last_received_position: u64,
    data: Option<Bytes>,
}

impl KeepaliveFrame {
    /// KEEPALIVE frames MUST always use Stream ID 0 as they pertain to the connection.
    pub const STREAM_ID: u32 = 0;

    /// Type of this frame.
    pub const TYPE: FrameType = FrameType::KEEPALIVE;

    /// Create a new `Keepalive` frame.
    ///
    /// - flag `respond` asks the receiver to reply with a KEEPALIVE of its own.
    /// - `last_received_position` MUST be <= [`MAX_U63`].
    /// - `data` is echoed verbatim by the receiver when replying.
    pub fn new(
        respond: bool,
        last_received_position: u64,
        data: Option<Bytes>,
    ) -> Self {
        debug_assert_max_u63!(last_received_position);
        KeepaliveFrame {
            respond,
            last_received_position: last_received_position & MAX_U63,
            data,
        }
    }

    /// Returns true if this frame has the RESPOND flag set.
    pub fn is_respond(&self) -> bool {
        self.respond
    }

    /// Returns the last received position of this frame.
    pub fn last_received_position(&self) -> u64 {
        self.last_received_position
    }

    /// Returns the data attached to this frame, if any.
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Consumes the frame, returning its data.
    pub fn into_data(self) -> Option<Bytes> {
        self.data
    }
}

impl Encode for KeepaliveFrame {
    fn encode(&self, buf: &mut BytesMut) {
        let flags =
            if self.respond { Flags::RESPOND } else { Flags::empty() };
        put_header(buf, KeepaliveFrame::STREAM_ID, KeepaliveFrame::TYPE, flags);
        buf.put_u64(self.last_received_position);
        if let Some(data) = &self.data {
            buf.put_slice(data);
        }
    }

    fn len(&self) -> usize {
        // header(6) + last_received_position(8)
        14 + self.data.as_ref().map(|d| d.len()).unwrap_or(0)
    }
}

impl Decode for KeepaliveFrame {
    type Value = Self;

    fn decode<B: Buf>(
        buf: &mut B,
        _stream_id: u32,
        flags: Flags,
    ) -> Result<Self::Value> {
        let respond = flags.is_respond();
        let last_received_position = eat_u63(buf)?;
        let data = match buf.remaining() {
            0 => None,
            len => Some(eat_bytes(buf, len)?),
        };
        Ok(KeepaliveFrame { respond, last_received_position, data })
    }
}
