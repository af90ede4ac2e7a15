use super::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// The error frame.
///
/// Error frames are used for errors on individual requests/streams as well as connection errors
/// and in response to SETUP frames.
///
/// # Frame Contents
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Stream ID                           |
/// +-----------+-+-+---------------+-------------------------------+
/// |Frame Type |0|0|      Flags    |
/// +-----------+-+-+---------------+-------------------------------+
/// |                          Error Code                           |
/// +---------------------------------------------------------------+
///                            Error Data
/// ```
///
/// A Stream ID of 0 means the error pertains to the connection, including connection
/// establishment. A Stream ID > 0 means the error pertains to a given stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorFrame {
    stream_id: u32,
    code: u32,
    data: Option<Bytes>,
}

impl ErrorFrame {
    /// The Setup frame is invalid for the server. Stream ID MUST be 0.
    pub const INVALID_SETUP: u32 = 0x00000001;

    /// Some (or all) of the parameters specified by the client are unsupported by the server.
    /// Stream ID MUST be 0.
    pub const UNSUPPORTED_SETUP: u32 = 0x00000002;

    /// The server rejected the setup, it can specify the reason in the payload.
    /// Stream ID MUST be 0.
    pub const REJECTED_SETUP: u32 = 0x00000003;

    /// The server rejected the resume, it can specify the reason in the payload.
    /// Stream ID MUST be 0.
    pub const REJECTED_RESUME: u32 = 0x00000004;

    /// The connection is being terminated. The receiver MAY close the connection immediately
    /// without waiting for outstanding streams to terminate. Stream ID MUST be 0.
    pub const CONNECTION_ERROR: u32 = 0x00000101;

    /// The connection is being terminated. The receiver MUST wait for outstanding streams to
    /// terminate before closing the connection. Stream ID MUST be 0.
    pub const CONNECTION_CLOSE: u32 = 0x00000102;

    /// Application layer logic generating a Reactive Streams onError event.
    /// Stream ID MUST be > 0.
    pub const APPLICATION_ERROR: u32 = 0x00000201;

    /// Despite being a valid request, the Responder decided to reject it and guarantees that it
    /// didn't process the request. Stream ID MUST be > 0.
    pub const REJECTED: u32 = 0x00000202;

    /// The Responder canceled the request but may have started processing it.
    /// Stream ID MUST be > 0.
    pub const CANCELED: u32 = 0x00000203;

    /// The request is invalid. Stream ID MUST be > 0.
    pub const INVALID: u32 = 0x00000204;

    /// The minimum error code usable as an application layer error.
    pub const MIN_APPLICATION_ERROR_CODE: u32 = 0x00000301;

    /// The maximum error code usable as an application layer error.
    pub const MAX_APPLICATION_ERROR_CODE: u32 = 0xFFFFFFFE;

    /// Type of this frame.
    pub const TYPE: FrameType = FrameType::ERROR;

    /// Create a new `ErrorFrame`.
    ///
    /// - `stream_id` MUST be <= [`MAX_U31`].
    /// - `data` SHOULD be a UTF-8 encoded string.
    pub fn new(stream_id: u32, code: u32, data: Option<Bytes>) -> Self {
        debug_assert_max_u31!(stream_id);
        ErrorFrame { stream_id: stream_id & MAX_U31, code, data }
    }

    /// Returns the stream ID of this frame.
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Returns the error code of this frame.
    pub fn code(&self) -> u32 {
        self.code
    }

    /// Returns the error data attached to this frame, if any.
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Returns the error data in UTF-8, if the data is valid UTF-8.
    pub fn data_utf8(&self) -> Option<&str> {
        self.data.as_deref().and_then(|d| std::str::from_utf8(d).ok())
    }

    /// Returns true if the error code is valid for the stream ID this frame carries.
    ///
    /// Setup and connection codes require stream ID 0; application codes require a stream
    /// ID > 0.
    pub fn is_code_in_range(&self) -> bool {
        match self.code {
            ErrorFrame::INVALID_SETUP
            | ErrorFrame::UNSUPPORTED_SETUP
            | ErrorFrame::REJECTED_SETUP
            | ErrorFrame::REJECTED_RESUME
            | ErrorFrame::CONNECTION_ERROR
            | ErrorFrame::CONNECTION_CLOSE => self.stream_id == 0,
            ErrorFrame::APPLICATION_ERROR
            | ErrorFrame::REJECTED
            | ErrorFrame::CANCELED
            | ErrorFrame::INVALID => self.stream_id > 0,
            code => {
                self.stream_id > 0
                    && (ErrorFrame::MIN_APPLICATION_ERROR_CODE
                        ..=ErrorFrame::MAX_APPLICATION_ERROR_CODE)
                        .contains(&code)
            }
        }
    }
}

impl Encode for ErrorFrame {
    fn encode(&self, buf: &mut BytesMut) {
        put_header(buf, self.stream_id, ErrorFrame::TYPE, Flags::empty());
        buf.put_u32(self.code);
        if let Some(data) = &self.data {
            buf.put_slice(data);
        }
    }

    fn len(&self) -> usize {
        // header(6) + code(4)
        10 + self.data.as_ref().map(|d| d.len()).unwrap_or(0)
    }
}

impl Decode for ErrorFrame {
    type Value = Self;

    fn decode<B: Buf>(
        buf: &mut B,
        stream_id: u32,
        _flags: Flags,
    ) -> Result<Self::Value> {
        let code = eat_u32(buf)?;
        let data = match buf.remaining() {
            0 => None,
            len => Some(eat_bytes(buf, len)?),
        };
        let frame = ErrorFrame { stream_id, code, data };
        if !frame.is_code_in_range() {
            return Err(DecodeError::InvalidErrorCode { stream_id, code });
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec() {
        let error = ErrorFrame::new(
            5,
            ErrorFrame::APPLICATION_ERROR,
            Some(Bytes::from("boom")),
        );

        let mut buf = BytesMut::new();
        error.encode(&mut buf);
        let mut buf = buf.freeze();

        // header(6) + code(4) + data(4)
        let buf_len = buf.len();
        assert_eq!(buf_len, 6 + 4 + 4);

        let stream_id = eat_stream_id(&mut buf).unwrap();
        let (frame_type, flags) = eat_flags(&mut buf).unwrap();
        assert_eq!(stream_id, 5);
        assert_eq!(frame_type, FrameType::ERROR);

        let decoded = ErrorFrame::decode(&mut buf, stream_id, flags).unwrap();
        assert_eq!(decoded, error);
        assert_eq!(decoded.data_utf8(), Some("boom"));
        assert_eq!(error.len(), buf_len);
    }

    #[test]
    fn code_range_per_stream_id() {
        let setup_err =
            ErrorFrame::new(0, ErrorFrame::REJECTED_SETUP, None);
        assert!(setup_err.is_code_in_range());

        let misplaced = ErrorFrame::new(1, ErrorFrame::REJECTED_SETUP, None);
        assert!(!misplaced.is_code_in_range());

        let misplaced = ErrorFrame::new(0, ErrorFrame::CANCELED, None);
        assert!(!misplaced.is_code_in_range());

        let custom = ErrorFrame::new(3, 0x00000400, None);
        assert!(custom.is_code_in_range());
    }

    #[test]
    fn decode_rejects_out_of_range_code() {
        let misplaced = ErrorFrame::new(1, ErrorFrame::CONNECTION_ERROR, None);
        let mut buf = BytesMut::new();
        misplaced.encode(&mut buf);
        let mut buf = buf.freeze();

        let stream_id = eat_stream_id(&mut buf).unwrap();
        let (_, flags) = eat_flags(&mut buf).unwrap();
        assert_eq!(
            ErrorFrame::decode(&mut buf, stream_id, flags),
            Err(DecodeError::InvalidErrorCode {
                stream_id: 1,
                code: ErrorFrame::CONNECTION_ERROR,
            })
        );
    }
}
