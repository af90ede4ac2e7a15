use super::*;
use bytes::{Buf, BufMut, BytesMut};

/// The resume_ok frame.
///
/// # Frame Contents
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Stream ID = 0                         |
/// +-----------+-+-+---------------+-------------------------------+
/// |Frame Type |0|0|    Flags      |
/// +-------------------------------+-------------------------------+
/// |0|                                                             |
/// +             Last Received Client Position                     +
/// |                                                               |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeOkFrame {
    last_received_client_position: u64,
}

impl ResumeOkFrame {
    /// RESUME_OK frames MUST always use Stream ID 0 as they pertain to the connection.
    pub const STREAM_ID: u32 = 0;

    /// Type of this frame.
    pub const TYPE: FrameType = FrameType::RESUME_OK;

    /// Create a new `ResumeOk` frame.
    ///
    /// - `last_received_client_position` MUST be <= [`MAX_U63`].
    pub fn new(last_received_client_position: u64) -> Self {
        debug_assert_max_u63!(last_received_client_position);
        ResumeOkFrame {
            last_received_client_position: last_received_client_position
                & MAX_U63,
        }
    }

    /// Returns the last implied position the server received from the client.
    pub fn last_received_client_position(&self) -> u64 {
        self.last_received_client_position
    }
}

impl Encode for ResumeOkFrame {
    fn encode(&self, buf: &mut BytesMut) {
        put_header(
            buf,
            ResumeOkFrame::STREAM_ID,
            ResumeOkFrame::TYPE,
            Flags::empty(),
        );
        buf.put_u64(self.last_received_client_position);
    }

    fn len(&self) -> usize {
        // header(6) + position(8)
        14
    }
}

impl Decode for ResumeOkFrame {
    type Value = Self;

    fn decode<B: Buf>(
        buf: &mut B,
        _stream_id: u32,
        _flags: Flags,
    ) -> Result<Self::Value> {
        let last_received_client_position = eat_u63(buf)?;
        Ok(ResumeOkFrame { last_received_client_position })
    }
}
