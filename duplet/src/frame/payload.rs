//! Payload of frame.
//!
//! Payload can be distinguished into two types: `Data` and `Metadata`. The distinction between
//! the types in an application is left to the application.
use bytes::Bytes;

/// The data field of a `Payload`.
pub type Data = Bytes;

/// The metadata field of a `Payload`.
pub type Metadata = Bytes;

/// Payload of an RSocket frame.
///
/// # Examples
///
/// ```
/// use duplet::prelude::*;
///
/// let payload = Payload::builder().set_data("data").set_metadata("metadata").build();
/// assert_eq!(payload.data().unwrap(), "data");
/// assert_eq!(payload.metadata().unwrap(), "metadata");
/// ```
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct Payload {
    pub(crate) metadata: Option<Metadata>,
    pub(crate) data: Option<Data>,
}

impl Payload {
    /// Constructs a payload with the given `metadata` and `data`.
    pub(crate) fn new(metadata: Option<Metadata>, data: Option<Data>) -> Self {
        Payload { metadata, data }
    }

    /// Returns a payload builder.
    pub fn builder() -> PayloadBuilder {
        PayloadBuilder::new()
    }

    /// Returns the number of payload bytes (metadata plus data, without framing).
    pub fn len(&self) -> usize {
        self.metadata.as_ref().map(|m| m.len()).unwrap_or(0)
            + self.data.as_ref().map(|d| d.len()).unwrap_or(0)
    }

    /// Returns true if this payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the `data` part of this payload.
    pub fn data(&self) -> Option<&Data> {
        self.data.as_ref()
    }

    /// Returns the `metadata` part of this payload.
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Returns the `data` part of this payload in UTF-8, if the `data` is valid UTF-8.
    pub fn data_utf8(&self) -> Option<&str> {
        self.data.as_deref().and_then(|d| std::str::from_utf8(d).ok())
    }

    /// Returns the `metadata` part of this payload in UTF-8, if the `metadata` is valid UTF-8.
    pub fn metadata_utf8(&self) -> Option<&str> {
        self.metadata.as_deref().and_then(|m| std::str::from_utf8(m).ok())
    }

    /// Returns true if this payload contains `data`.
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Returns true if this payload contains `metadata`.
    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    /// Splits the payload into `Metadata` and `Data`.
    pub fn split(self) -> (Option<Metadata>, Option<Data>) {
        (self.metadata, self.data)
    }

    /// Returns a consuming iterator that yields at most `mtu` payload bytes at a time.
    ///
    /// Each chunk drains the remaining metadata first; data fills whatever room the chunk has
    /// left. If `mtu` does not divide the payload, the last chunk will be shorter than `mtu`.
    ///
    /// # Panics
    ///
    /// Panics if `mtu` is zero.
    pub fn chunks(self, mtu: usize) -> PayloadChunks {
        assert!(mtu > 0);
        let (metadata, data) = self.split();
        PayloadChunks { mtu, metadata, data }
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload { metadata: None, data: Some(data) }
    }
}

impl From<&'static str> for Payload {
    fn from(data: &'static str) -> Self {
        Payload::from(Bytes::from(data))
    }
}

impl From<String> for Payload {
    fn from(data: String) -> Self {
        Payload::from(Bytes::from(data))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::from(Bytes::from(data))
    }
}

/// Construct a [`Payload`] with optional [`Data`] and/or [`Metadata`].
///
/// # Examples
///
/// ```
/// use duplet::prelude::*;
///
/// let payload = PayloadBuilder::new().set_data("data").set_metadata("metadata").build();
/// assert_eq!(payload.data().unwrap(), "data");
/// assert_eq!(payload.metadata().unwrap(), "metadata");
/// ```
#[derive(Debug)]
pub struct PayloadBuilder(Payload);

impl PayloadBuilder {
    /// Create a new `PayloadBuilder`.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        PayloadBuilder(Payload::default())
    }

    /// Sets the data of the `Payload` to build.
    pub fn set_data<T>(mut self, data: T) -> Self
    where
        T: Into<Bytes>,
    {
        self.0.data = Some(data.into());
        self
    }

    /// Sets the metadata of the `Payload` to build.
    pub fn set_metadata<T>(mut self, metadata: T) -> Self
    where
        T: Into<Bytes>,
    {
        self.0.metadata = Some(metadata.into());
        self
    }

    /// Returns the configured `Payload`.
    pub fn build(self) -> Payload {
        self.0
    }
}

/// An iterator that yields chunked payload.
#[derive(Debug)]
pub struct PayloadChunks {
    mtu: usize,
    metadata: Option<Bytes>,
    data: Option<Bytes>,
}

impl Iterator for PayloadChunks {
    type Item = Payload;

    fn next(&mut self) -> Option<Self::Item> {
        if self.metadata.is_none() && self.data.is_none() {
            return None;
        }

        let mut budget = self.mtu;
        let mut metadata = None;
        let mut data = None;
        if let Some(bytes) = &mut self.metadata {
            let take = budget.min(bytes.len());
            metadata = Some(bytes.split_to(take));
            budget -= take;
            if bytes.is_empty() {
                self.metadata = None;
            }
        }
        if budget > 0 {
            if let Some(bytes) = &mut self.data {
                let take = budget.min(bytes.len());
                data = Some(bytes.split_to(take));
                if bytes.is_empty() {
                    self.data = None;
                }
            }
        }
        Some(Payload::new(metadata, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let payload = Payload::builder()
            .set_metadata("metadata")
            .set_data("data")
            .build();
        assert!(payload.has_metadata());
        assert!(payload.has_data());
        assert_eq!(payload.len(), 12);
        assert_eq!(payload.data_utf8(), Some("data"));
        assert_eq!(payload.metadata_utf8(), Some("metadata"));
    }

    #[test]
    fn from_bytes() {
        let payload = Payload::from("ping");
        assert_eq!(payload.data_utf8(), Some("ping"));
        assert!(!payload.has_metadata());
    }

    #[test]
    fn split() {
        let payload = Payload::builder().set_data("d").set_metadata("m").build();
        let (metadata, data) = payload.split();
        assert_eq!(metadata.unwrap(), "m");
        assert_eq!(data.unwrap(), "d");
    }

    #[test]
    fn empty() {
        assert!(Payload::default().is_empty());
        assert_eq!(Payload::default().len(), 0);
    }

    #[test]
    fn chunks_drain_metadata_before_data() {
        let payload = Payload::builder()
            .set_metadata("metadata")
            .set_data("data payload")
            .build();

        let mut iter = payload.chunks(4);
        assert_eq!(
            iter.next(),
            Some(Payload::builder().set_metadata("meta").build())
        );
        assert_eq!(
            iter.next(),
            Some(Payload::builder().set_metadata("data").build())
        );
        assert_eq!(
            iter.next(),
            Some(Payload::builder().set_data("data").build())
        );
        assert_eq!(
            iter.next(),
            Some(Payload::builder().set_data(" pay").build())
        );
        assert_eq!(
            iter.next(),
            Some(Payload::builder().set_data("load").build())
        );
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn chunks_never_exceed_the_cap() {
        let payload = Payload::builder()
            .set_metadata("metadata")
            .set_data("data payload")
            .build();

        let mut iter = payload.chunks(10);
        // metadata first, then data up to the shared cap
        assert_eq!(
            iter.next(),
            Some(
                Payload::builder()
                    .set_metadata("metadata")
                    .set_data("da")
                    .build()
            )
        );
        assert_eq!(
            iter.next(),
            Some(Payload::builder().set_data("ta payload").build())
        );
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn chunks_of_a_whole_payload() {
        let payload = Payload::builder().set_data("data").build();
        let mut iter = payload.clone().chunks(64);
        assert_eq!(iter.next(), Some(payload));
        assert_eq!(iter.next(), None);
    }

    #[test]
    #[should_panic]
    fn chunks_reject_zero_mtu() {
        Payload::from("data").chunks(0);
    }
}
