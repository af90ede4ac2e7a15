use super::Encode;
use bytes::{BufMut, BytesMut};

/// The 24-bit unsigned integer type used for metadata length prefixes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct U24(u32);

impl U24 {
    /// The maximum value `U24` can hold.
    pub const MAX: u32 = (1 << 24) - 1;

    /// The minimum value `U24` can hold.
    pub const MIN: u32 = 0;

    /// Builds a `U24` from a `u32` value.
    ///
    /// # Panics
    ///
    /// Panics if the value given is greater than [`U24::MAX`] (16,777,215).
    pub fn from_u32(val: u32) -> Self {
        assert!(val <= U24::MAX);
        U24(val)
    }

    /// Builds a `U24` from a `usize` value.
    ///
    /// # Panics
    ///
    /// Panics if the value given is greater than [`U24::MAX`] (16,777,215).
    pub fn from_usize(val: usize) -> Self {
        assert!(val <= U24::MAX as usize);
        U24(val as u32)
    }

    /// Converts `Self` into `u32`.
    pub fn into_u32(self) -> u32 {
        self.0
    }

    /// Converts `Self` into `usize`.
    pub fn into_usize(self) -> usize {
        self.0 as usize
    }
}

impl Encode for U24 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_uint(self.0 as u64, 3);
    }

    fn len(&self) -> usize {
        3
    }
}
