use super::*;
use bytes::{Buf, Bytes, BytesMut};

/// The request_fnf (fire-and-forget) frame.
///
/// # Frame Contents
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Stream ID                           |
/// +-----------+-+-+-+-------------+-------------------------------+
/// |Frame Type |0|M|F|    Flags    |
/// +-------------------------------+-------------------------------+
///                      Metadata & Request Data
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFnfFrame {
    stream_id: u32,
    flags: Flags,
    payload: Payload,
}

impl RequestFnfFrame {
    /// Type of this frame.
    pub const TYPE: FrameType = FrameType::REQUEST_FNF;

    /// Create a new `RequestFnf` frame.
    ///
    /// - `stream_id` MUST be <= [`MAX_U31`].
    /// - flag `follows` means more fragments follow this fragment.
    pub fn new(stream_id: u32, follows: bool, payload: Payload) -> Self {
        debug_assert_max_u31!(stream_id);
        let mut flags = Flags::empty();
        if follows {
            flags |= Flags::FOLLOWS;
        }
        if payload.has_metadata() {
            flags |= Flags::METADATA;
        }
        RequestFnfFrame { stream_id: stream_id & MAX_U31, flags, payload }
    }

    /// Returns the stream ID of this frame.
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Returns true if this frame has the FOLLOWS flag set.
    pub fn is_follows(&self) -> bool {
        self.flags.is_follows()
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

impl Encode for RequestFnfFrame {
    fn encode(&self, buf: &mut BytesMut) {
        put_header(buf, self.stream_id, RequestFnfFrame::TYPE, self.flags);
        put_payload(buf, &self.payload);
    }

    fn len(&self) -> usize {
        6 + payload_wire_len(&self.payload)
    }
}

impl Decode for RequestFnfFrame {
    type Value = Self;

    fn decode<B: Buf>(
        buf: &mut B,
        stream_id: u32,
        flags: Flags,
    ) -> Result<Self::Value> {
        let payload = eat_payload(buf, stream_id, flags)?;
        Ok(RequestFnfFrame { stream_id, flags, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec() {
        let request = RequestFnfFrame::new(
            1,
            true,
            Payload::builder()
                .set_metadata(Bytes::from("metadata"))
                .set_data(Bytes::from("data"))
                .build(),
        );

        let mut buf = BytesMut::new();
        request.encode(&mut buf);
        let mut buf = buf.freeze();

        // header(6) + metadata_len(3) + metadata(8) + data(4)
        let buf_len = buf.len();
        assert_eq!(buf_len, 6 + 3 + 8 + 4);

        let stream_id = eat_stream_id(&mut buf).unwrap();
        let (frame_type, flags) = eat_flags(&mut buf).unwrap();
        assert_eq!(frame_type, FrameType::REQUEST_FNF);
        assert_eq!(flags, Flags::METADATA | Flags::FOLLOWS);

        let decoded =
            RequestFnfFrame::decode(&mut buf, stream_id, flags).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(request.len(), buf_len);
        assert_eq!(decoded.len(), buf_len);
    }
}
