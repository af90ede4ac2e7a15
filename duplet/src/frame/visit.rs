//! Cursor helpers shared by the per-frame codecs.
//!
//! The `eat_*` functions consume from a [`Buf`] and fail with [`DecodeError::InComplete`] when
//! the buffer runs short; the `put_*` functions are the encoding counterparts.
use super::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub(super) type Result<T> = std::result::Result<T, DecodeError>;

macro_rules! incomplete_if_less_than {
    ($buf:ident, $len:expr) => {
        if $buf.remaining() < $len {
            return Err(DecodeError::InComplete);
        }
    };
}

pub(super) fn eat_stream_id<B: Buf>(buf: &mut B) -> Result<u32> {
    incomplete_if_less_than!(buf, 4);

    let stream_id = buf.get_u32();
    if stream_id & !MAX_U31 != 0 {
        return Err(DecodeError::ReservedBitSet);
    }
    Ok(stream_id)
}

pub(super) fn eat_flags<B: Buf>(buf: &mut B) -> Result<(FrameType, Flags)> {
    incomplete_if_less_than!(buf, 2);

    let bits = buf.get_u16();
    let frame_type = match FrameType::from_bits(bits) {
        Some(frame_type) => frame_type,
        None => {
            return Err(DecodeError::UnrecognizedFrameType {
                value: bits >> 10,
                ignorable: bits & Flags::IGNORE.bits() != 0,
            })
        }
    };
    Ok((frame_type, Flags::from_bits_truncate(bits)))
}

pub(super) fn eat_version<B: Buf>(buf: &mut B) -> Result<Version> {
    incomplete_if_less_than!(buf, 4);

    let major = buf.get_u16();
    let minor = buf.get_u16();
    Ok(Version::new(major, minor))
}

pub(super) fn eat_u8<B: Buf>(buf: &mut B) -> Result<u8> {
    incomplete_if_less_than!(buf, 1);

    Ok(buf.get_u8())
}

pub(super) fn eat_u16<B: Buf>(buf: &mut B) -> Result<u16> {
    incomplete_if_less_than!(buf, 2);

    Ok(buf.get_u16())
}

pub(super) fn eat_u24<B: Buf>(buf: &mut B) -> Result<U24> {
    incomplete_if_less_than!(buf, 3);

    Ok(U24::from_u32(buf.get_uint(3) as u32))
}

pub(super) fn eat_u31<B: Buf>(buf: &mut B) -> Result<u32> {
    incomplete_if_less_than!(buf, 4);

    Ok(buf.get_u32() & MAX_U31)
}

pub(super) fn eat_u32<B: Buf>(buf: &mut B) -> Result<u32> {
    incomplete_if_less_than!(buf, 4);

    Ok(buf.get_u32())
}

pub(super) fn eat_u63<B: Buf>(buf: &mut B) -> Result<u64> {
    incomplete_if_less_than!(buf, 8);

    Ok(buf.get_u64() & MAX_U63)
}

pub(super) fn eat_bytes<B: Buf>(buf: &mut B, len: usize) -> Result<Bytes> {
    incomplete_if_less_than!(buf, len);

    Ok(buf.copy_to_bytes(len))
}

/// Consumes the metadata block (when the METADATA flag is set) and the remaining data bytes.
pub(super) fn eat_payload<B: Buf>(
    buf: &mut B,
    stream_id: u32,
    flags: Flags,
) -> Result<Payload> {
    let metadata = if flags.is_metadata() {
        let declared = eat_u24(buf)?.into_usize();
        if declared > buf.remaining() {
            return Err(DecodeError::InvalidMetadataLength {
                stream_id,
                declared,
                available: buf.remaining(),
            });
        }
        Some(eat_bytes(buf, declared)?)
    } else {
        None
    };
    let data = match buf.remaining() {
        0 => None,
        len => Some(eat_bytes(buf, len)?),
    };
    Ok(Payload::new(metadata, data))
}

pub(super) fn eat_resume_token<B: Buf>(
    buf: &mut B,
    flags: Flags,
) -> Result<Option<Bytes>> {
    if flags.is_resume() {
        let token_len = eat_u16(buf)?;
        Ok(Some(eat_bytes(buf, token_len as usize)?))
    } else {
        Ok(None)
    }
}

/// Writes the 6-byte frame header: stream ID, then frame type and flags.
pub(super) fn put_header(
    buf: &mut BytesMut,
    stream_id: u32,
    frame_type: FrameType,
    flags: Flags,
) {
    buf.put_u32(stream_id & MAX_U31);
    buf.put_u16(frame_type.bits() | flags.bits());
}

/// Writes the payload body: a 24-bit length-prefixed metadata block when metadata is present,
/// then the data bytes.
pub(super) fn put_payload(buf: &mut BytesMut, payload: &Payload) {
    if let Some(metadata) = payload.metadata() {
        U24::from_usize(metadata.len()).encode(buf);
        buf.put_slice(metadata);
    }
    if let Some(data) = payload.data() {
        buf.put_slice(data);
    }
}

/// Returns the wire length of a payload body as written by [`put_payload`].
pub(super) fn payload_wire_len(payload: &Payload) -> usize {
    let meta = match payload.metadata() {
        Some(metadata) => 3 + metadata.len(),
        None => 0,
    };
    meta + payload.data().map(|d| d.len()).unwrap_or(0)
}
