use super::*;
use bytes::{BufMut, BytesMut};
use std::cmp::Ordering;
use std::fmt;

/// Version number of the RSocket protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    major: u16,
    minor: u16,
}

impl Version {
    /// Version 1.0, the protocol version this crate speaks.
    pub const V1: Version = Version { major: 1, minor: 0 };

    /// Builds the protocol version with the given `major` and `minor` number.
    pub fn new(major: u16, minor: u16) -> Self {
        Version { major, minor }
    }

    /// Returns the `major` number of this version.
    pub fn major(self) -> u16 {
        self.major
    }

    /// Returns the `minor` number of this version.
    pub fn minor(self) -> u16 {
        self.minor
    }
}

impl Encode for Version {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.major);
        buf.put_u16(self.minor);
    }

    fn len(&self) -> usize {
        4
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major.cmp(&other.major).then(self.minor.cmp(&other.minor))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Default for Version {
    fn default() -> Version {
        Version::V1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(Version::new(1, 0) < Version::new(1, 1));
        assert!(Version::new(1, 9) < Version::new(2, 0));
        assert_eq!(Version::default(), Version::V1);
    }
}
