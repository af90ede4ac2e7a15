use super::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// The metadata_push frame.
///
/// A METADATA_PUSH frame can be used to send asynchronous metadata notifications from a
/// Requester or Responder to its peer.
///
/// # Frame Contents
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Stream ID = 0                         |
/// +-----------+-+-+---------------+-------------------------------+
/// |Frame Type |0|1|     Flags     |
/// +-----------+-+-+---------------+-------------------------------+
///                               Metadata
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataPushFrame {
    metadata: Bytes,
}

impl MetadataPushFrame {
    /// METADATA_PUSH frames MUST always use Stream ID 0 as they pertain to the connection.
    pub const STREAM_ID: u32 = 0;

    /// Type of this frame.
    pub const TYPE: FrameType = FrameType::METADATA_PUSH;

    /// Create a new `MetadataPush` frame.
    pub fn new(metadata: Bytes) -> Self {
        MetadataPushFrame { metadata }
    }

    /// Returns the metadata attached to this frame.
    pub fn metadata(&self) -> &Bytes {
        &self.metadata
    }

    /// Consumes the frame, returning its metadata.
    pub fn into_metadata(self) -> Bytes {
        self.metadata
    }
}

impl Encode for MetadataPushFrame {
    fn encode(&self, buf: &mut BytesMut) {
        put_header(
            buf,
            MetadataPushFrame::STREAM_ID,
            MetadataPushFrame::TYPE,
            Flags::METADATA,
        );
        buf.put_slice(&self.metadata);
    }

    fn len(&self) -> usize {
        6 + self.metadata.len()
    }
}

impl Decode for MetadataPushFrame {
    type Value = Self;

    fn decode<B: Buf>(
        buf: &mut B,
        _stream_id: u32,
        _flags: Flags,
    ) -> Result<Self::Value> {
        let metadata = eat_bytes(buf, buf.remaining())?;
        Ok(MetadataPushFrame { metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec() {
        let push = MetadataPushFrame::new(Bytes::from("routing"));

        let mut buf = BytesMut::new();
        push.encode(&mut buf);
        let mut buf = buf.freeze();

        // header(6) + metadata(7)
        let buf_len = buf.len();
        assert_eq!(buf_len, 6 + 7);

        let stream_id = eat_stream_id(&mut buf).unwrap();
        let (frame_type, flags) = eat_flags(&mut buf).unwrap();
        assert_eq!(stream_id, 0);
        assert_eq!(frame_type, FrameType::METADATA_PUSH);
        assert!(flags.is_metadata());

        let decoded =
            MetadataPushFrame::decode(&mut buf, stream_id, flags).unwrap();
        assert_eq!(decoded, push);
        assert_eq!(push.len(), buf_len);
    }
}
