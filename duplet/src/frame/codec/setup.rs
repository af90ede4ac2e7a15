use super::*;
use crate::consts::{
    DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_KEEPALIVE_TIMEOUT, DEFAULT_MIMETYPE,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::Duration;

/// The setup frame.
///
/// The SETUP frame is sent by the client to inform the server of the parameters under which it
/// desires to operate.
///
/// # Frame Contents
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Stream ID = 0                         |
/// +-----------+-+-+-+-+-----------+-------------------------------+
/// |Frame Type |0|M|R|L|  Flags    |
/// +-----------+-+-+-+-+-----------+-------------------------------+
/// |         Major Version         |        Minor Version          |
/// +-------------------------------+-------------------------------+
/// |0|                 Time Between KEEPALIVE Frames               |
/// +---------------------------------------------------------------+
/// |0|                       Max Lifetime                          |
/// +---------------------------------------------------------------+
/// |         Token Length          | Resume Identification Token  ...
/// +---------------+-----------------------------------------------+
/// |  MIME Length  |   Metadata Encoding MIME Type                ...
/// +---------------+-----------------------------------------------+
/// |  MIME Length  |     Data Encoding MIME Type                  ...
/// +---------------+-----------------------------------------------+
///                     Metadata & Setup Payload
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupFrame {
    pub(crate) flags: Flags,
    pub(crate) version: Version,
    pub(crate) keepalive_interval: u32,
    pub(crate) keepalive_timeout: u32,
    pub(crate) resume_token: Option<Bytes>,
    pub(crate) metadata_mimetype: Bytes,
    pub(crate) data_mimetype: Bytes,
    pub(crate) payload: Payload,
}

impl SetupFrame {
    /// Setup frames MUST always use Stream ID 0 as they pertain to the connection.
    pub const STREAM_ID: u32 = 0;

    /// Type of this frame.
    pub const TYPE: FrameType = FrameType::SETUP;

    /// Returns a [`SetupFrameBuilder`].
    pub fn builder() -> SetupFrameBuilder {
        SetupFrameBuilder::default()
    }

    /// Returns true if the flags have the LEASE bit set.
    pub fn is_lease(&self) -> bool {
        self.flags.is_lease()
    }

    /// Returns true if the flags have the RESUME bit set.
    pub fn is_resume(&self) -> bool {
        self.flags.is_resume()
    }

    /// Returns the protocol version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the time between KEEPALIVE frames that the client will send.
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval as u64)
    }

    /// Returns the time that a client will allow a server to not respond to a KEEPALIVE before
    /// it is assumed to be dead.
    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_timeout as u64)
    }

    /// Returns the resume identification token (not present if the RESUME bit is not set).
    pub fn resume_token(&self) -> Option<&Bytes> {
        self.resume_token.as_ref()
    }

    /// Returns the MIME type for encoding the metadata, if it is an ASCII string.
    pub fn metadata_mimetype(&self) -> Option<&str> {
        ascii_str(&self.metadata_mimetype)
    }

    /// Returns the MIME type for encoding the data, if it is an ASCII string.
    pub fn data_mimetype(&self) -> Option<&str> {
        ascii_str(&self.data_mimetype)
    }

    /// Returns the metadata attached to this frame, if any.
    pub fn metadata(&self) -> Option<&Bytes> {
        self.payload.metadata()
    }

    /// Returns the data attached to this frame, if any.
    pub fn data(&self) -> Option<&Bytes> {
        self.payload.data()
    }

    /// Returns the payload of this setup frame.
    pub fn payload(self) -> Payload {
        self.payload
    }
}

fn ascii_str(bytes: &Bytes) -> Option<&str> {
    std::str::from_utf8(bytes).ok().filter(|s| s.is_ascii())
}

impl Encode for SetupFrame {
    fn encode(&self, buf: &mut BytesMut) {
        put_header(buf, SetupFrame::STREAM_ID, SetupFrame::TYPE, self.flags);
        self.version.encode(buf);
        buf.put_u32(self.keepalive_interval);
        buf.put_u32(self.keepalive_timeout);
        if let Some(token) = &self.resume_token {
            buf.put_u16(token.len() as u16);
            buf.put_slice(token);
        }
        buf.put_u8(self.metadata_mimetype.len() as u8);
        buf.put_slice(&self.metadata_mimetype);
        buf.put_u8(self.data_mimetype.len() as u8);
        buf.put_slice(&self.data_mimetype);
        put_payload(buf, &self.payload);
    }

    fn len(&self) -> usize {
        // header(6) + version(4) + keepalive(4) + lifetime(4)
        let mut len = 18;
        if let Some(token) = &self.resume_token {
            len += 2 + token.len();
        }
        len += 1 + self.metadata_mimetype.len() + 1 + self.data_mimetype.len();
        len + payload_wire_len(&self.payload)
    }
}

impl Decode for SetupFrame {
    type Value = Self;

    fn decode<B: Buf>(
        buf: &mut B,
        _stream_id: u32,
        flags: Flags,
    ) -> Result<Self::Value> {
        let version = eat_version(buf)?;
        let keepalive_interval = eat_u31(buf)?;
        let keepalive_timeout = eat_u31(buf)?;
        let resume_token = eat_resume_token(buf, flags)?;
        let metadata_mimetype_len = eat_u8(buf)?;
        let metadata_mimetype = eat_bytes(buf, metadata_mimetype_len as usize)?;
        let data_mimetype_len = eat_u8(buf)?;
        let data_mimetype = eat_bytes(buf, data_mimetype_len as usize)?;
        let payload = eat_payload(buf, SetupFrame::STREAM_ID, flags)?;
        Ok(SetupFrame {
            flags,
            version,
            keepalive_interval,
            keepalive_timeout,
            resume_token,
            metadata_mimetype,
            data_mimetype,
            payload,
        })
    }
}

/// A builder for configuring the setup frame.
#[derive(Debug)]
pub struct SetupFrameBuilder {
    flags: Flags,
    version: Version,
    keepalive_interval: u32,
    keepalive_timeout: u32,
    resume_token: Option<Bytes>,
    metadata_mimetype: Bytes,
    data_mimetype: Bytes,
    payload: Payload,
}

impl Default for SetupFrameBuilder {
    fn default() -> SetupFrameBuilder {
        SetupFrameBuilder {
            flags: Flags::empty(),
            version: Version::default(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL.as_millis() as u32,
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT.as_millis() as u32,
            resume_token: None,
            metadata_mimetype: Bytes::from(DEFAULT_MIMETYPE),
            data_mimetype: Bytes::from(DEFAULT_MIMETYPE),
            payload: Payload::default(),
        }
    }
}

impl SetupFrameBuilder {
    /// Sets the `Lease` flag.
    pub fn set_lease_flag(mut self) -> Self {
        self.flags |= Flags::LEASE;
        self
    }

    /// Sets the RSocket protocol version.
    pub fn set_version(mut self, major: u16, minor: u16) -> Self {
        self.version = Version::new(major, minor);
        self
    }

    /// Sets the interval (in milliseconds) between two KEEPALIVE frames that the client will
    /// send. This value MUST be > `0` and <= [`MAX_U31`].
    pub fn set_keepalive_interval(mut self, interval: u32) -> Self {
        debug_assert_max_u31!(interval);
        debug_assert_non_zero!(interval);
        self.keepalive_interval = interval & MAX_U31;
        self
    }

    /// Sets the time (in milliseconds) that a client will allow a server to not respond to a
    /// KEEPALIVE before it is assumed to be dead. This value MUST be > 0 and <= [`MAX_U31`].
    pub fn set_keepalive_timeout(mut self, timeout: u32) -> Self {
        debug_assert_max_u31!(timeout);
        debug_assert_non_zero!(timeout);
        self.keepalive_timeout = timeout & MAX_U31;
        self
    }

    /// Sets the resume identification token and the `Resume` flag.
    ///
    /// # Panics
    ///
    /// Panics if the length of the given token is greater than 65,535 bytes.
    pub fn set_resume_token(mut self, token: Bytes) -> Self {
        assert!(token.len() <= 65_535);
        self.resume_token = Some(token);
        self.flags |= Flags::RESUME;
        self
    }

    /// Sets the metadata mimetype, an ASCII [`Internet media type`] string.
    ///
    /// # Panics
    ///
    /// Panics if the length of the given `mimetype` is greater than `255` bytes.
    ///
    /// [`Internet media type`]: https://en.wikipedia.org/wiki/Internet_media_type
    pub fn set_metadata_mimetype<T>(mut self, mimetype: T) -> Self
    where
        T: Into<String>,
    {
        let mimetype: String = mimetype.into();
        assert!(mimetype.len() <= 255);
        self.metadata_mimetype = Bytes::from(mimetype);
        self
    }

    /// Sets the data mimetype, an ASCII [`Internet media type`] string.
    ///
    /// # Panics
    ///
    /// Panics if the length of the given `mimetype` is greater than `255` bytes.
    ///
    /// [`Internet media type`]: https://en.wikipedia.org/wiki/Internet_media_type
    pub fn set_data_mimetype<T>(mut self, mimetype: T) -> Self
    where
        T: Into<String>,
    {
        let mimetype: String = mimetype.into();
        assert!(mimetype.len() <= 255);
        self.data_mimetype = Bytes::from(mimetype);
        self
    }

    /// Sets the metadata of the setup payload.
    pub fn set_metadata(mut self, metadata: Bytes) -> Self {
        self.flags |= Flags::METADATA;
        self.payload.metadata = Some(metadata);
        self
    }

    /// Sets the data of the setup payload.
    pub fn set_data(mut self, data: Bytes) -> Self {
        self.payload.data = Some(data);
        self
    }

    /// Builds a [`SetupFrame`] from this builder.
    pub fn build(self) -> SetupFrame {
        SetupFrame {
            flags: self.flags,
            version: self.version,
            keepalive_interval: self.keepalive_interval,
            keepalive_timeout: self.keepalive_timeout,
            resume_token: self.resume_token,
            metadata_mimetype: self.metadata_mimetype,
            data_mimetype: self.data_mimetype,
            payload: self.payload,
        }
    }
}
