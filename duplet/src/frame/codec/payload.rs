use super::*;
use bytes::{Buf, Bytes, BytesMut};

/// The payload frame.
///
/// # Frame Contents
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Stream ID                           |
/// +-----------+-+-+-+-+-+---------+-------------------------------+
/// |Frame Type |0|M|F|C|N|  Flags  |
/// +-------------------------------+-------------------------------+
///                      Metadata & Data
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFrame {
    stream_id: u32,
    flags: Flags,
    payload: Payload,
}

impl PayloadFrame {
    /// Type of this frame.
    pub const TYPE: FrameType = FrameType::PAYLOAD;

    /// Create a new `Payload` frame.
    ///
    /// - `stream_id` MUST be <= [`MAX_U31`].
    /// - flag `follows` means more fragments follow this fragment.
    /// - flag `complete` indicates stream completion.
    /// - flag `next` indicates payload data and/or metadata present.
    ///
    /// A PAYLOAD frame MUST NOT have all of `follows`, `complete` and `next` unset.
    pub fn new(
        stream_id: u32,
        follows: bool,
        complete: bool,
        next: bool,
        payload: Payload,
    ) -> Self {
        debug_assert_max_u31!(stream_id);
        debug_assert!(follows || complete || next);
        let mut flags = Flags::empty();
        if follows {
            flags |= Flags::FOLLOWS;
        }
        if complete {
            flags |= Flags::COMPLETE;
        }
        if next {
            flags |= Flags::NEXT;
        }
        if payload.has_metadata() {
            flags |= Flags::METADATA;
        }
        PayloadFrame { stream_id: stream_id & MAX_U31, flags, payload }
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

    /// Returns true if this frame has the NEXT flag set.
    pub fn is_next(&self) -> bool {
        self.flags.is_next()
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

impl Encode for PayloadFrame {
    fn encode(&self, buf: &mut BytesMut) {
        put_header(buf, self.stream_id, PayloadFrame::TYPE, self.flags);
        put_payload(buf, &self.payload);
    }

    fn len(&self) -> usize {
        6 + payload_wire_len(&self.payload)
    }
}

impl Decode for PayloadFrame {
    type Value = Self;

    fn decode<B: Buf>(
        buf: &mut B,
        stream_id: u32,
        flags: Flags,
    ) -> Result<Self::Value> {
        if !flags.intersects(Flags::FOLLOWS | Flags::COMPLETE | Flags::NEXT) {
            return Err(DecodeError::BlankPayloadFlags { stream_id });
        }
        let payload = eat_payload(buf, stream_id, flags)?;
        Ok(PayloadFrame { stream_id, flags, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec() {
        let frame = PayloadFrame::new(
            1,
            true,
            false,
            true,
            Payload::builder()
                .set_metadata(Bytes::from("metadata"))
                .set_data(Bytes::from("data"))
                .build(),
        );

        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let mut buf = buf.freeze();

        // header(6) + metadata_len(3) + metadata(8) + data(4)
        let buf_len = buf.len();
        assert_eq!(buf_len, 6 + 3 + 8 + 4);

        let stream_id = eat_stream_id(&mut buf).unwrap();
        let (frame_type, flags) = eat_flags(&mut buf).unwrap();
        assert_eq!(frame_type, FrameType::PAYLOAD);
        assert_eq!(flags, Flags::METADATA | Flags::FOLLOWS | Flags::NEXT);

        let decoded = PayloadFrame::decode(&mut buf, stream_id, flags).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(frame.len(), buf_len);
        assert_eq!(decoded.len(), buf_len);
    }

    #[test]
    fn decode_rejects_blank_flags() {
        let mut buf = Bytes::from("data");
        assert_eq!(
            PayloadFrame::decode(&mut buf, 4, Flags::empty()),
            Err(DecodeError::BlankPayloadFlags { stream_id: 4 })
        );
    }
}
