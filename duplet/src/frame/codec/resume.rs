use super::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// The resume frame.
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
/// |        Major Version          |         Minor Version         |
/// +-------------------------------+-------------------------------+
/// |         Token Length          | Resume Identification Token  ...
/// +---------------------------------------------------------------+
/// |0|                                                             |
/// +                 Last Received Server Position                 +
/// |                                                               |
/// +---------------------------------------------------------------+
/// |0|                                                             |
/// +                First Available Client Position                +
/// |                                                               |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeFrame {
    version: Version,
    resume_token: Bytes,
    last_received_server_position: u64,
    first_available_client_position: u64,
}

impl ResumeFrame {
    /// RESUME frames MUST always use Stream ID 0 as they pertain to the connection.
    pub const STREAM_ID: u32 = 0;

    /// Type of this frame.
    pub const TYPE: FrameType = FrameType::RESUME;

    /// Create a new `Resume` frame.
    ///
    /// - The length of `resume_token` MUST be <= `65,535` bytes.
    /// - Both positions MUST be <= [`MAX_U63`].
    pub fn new(
        version: Version,
        resume_token: Bytes,
        last_received_server_position: u64,
        first_available_client_position: u64,
    ) -> Self {
        assert!(resume_token.len() <= 65_535);
        debug_assert_max_u63!(
            last_received_server_position,
            first_available_client_position
        );
        ResumeFrame {
            version,
            resume_token,
            last_received_server_position: last_received_server_position
                & MAX_U63,
            first_available_client_position: first_available_client_position
                & MAX_U63,
        }
    }

    /// Returns the version field of this frame.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the resume identification token.
    pub fn resume_token(&self) -> &Bytes {
        &self.resume_token
    }

    /// Returns the last implied position the client received from the server.
    pub fn last_received_server_position(&self) -> u64 {
        self.last_received_server_position
    }

    /// Returns the earliest position the client can rewind back to prior to resending frames.
    pub fn first_available_client_position(&self) -> u64 {
        self.first_available_client_position
    }
}

impl Encode for ResumeFrame {
    fn encode(&self, buf: &mut BytesMut) {
        put_header(
            buf,
            ResumeFrame::STREAM_ID,
            ResumeFrame::TYPE,
            Flags::empty(),
        );
        self.version.encode(buf);
        buf.put_u16(self.resume_token.len() as u16);
        buf.put_slice(&self.resume_token);
        buf.put_u64(self.last_received_server_position);
        buf.put_u64(self.first_available_client_position);
    }

    fn len(&self) -> usize {
        // header(6) + version(4) + token_len(2) + positions(16)
        28 + self.resume_token.len()
    }
}

impl Decode for ResumeFrame {
    type Value = Self;

    fn decode<B: Buf>(
        buf: &mut B,
        _stream_id: u32,
        _flags: Flags,
    ) -> Result<Self::Value> {
        let version = eat_version(buf)?;
        let token_len = eat_u16(buf)?;
        let resume_token = eat_bytes(buf, token_len as usize)?;
        let last_received_server_position = eat_u63(buf)?;
        let first_available_client_position = eat_u63(buf)?;
        Ok(ResumeFrame {
            version,
            resume_token,
            last_received_server_position,
            first_available_client_position,
        })
    }
}
