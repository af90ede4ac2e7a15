//! Fragmentation and reassembly of oversized payloads.
//!
//! A logical payload that does not fit into the configured MTU is split into a head request (or
//! PAYLOAD) frame plus a chain of PAYLOAD frames carrying the FOLLOWS flag. Metadata precedes
//! data within the chain; the COMPLETE and NEXT flags are only carried by the terminal
//! fragment.
use crate::consts::MIN_FRAGMENT_MTU;
use crate::frame::codec::*;
use crate::frame::{Frame, Payload, FRAME_HEADER_LEN};

use bytes::{Bytes, BytesMut};

const METADATA_LEN_PREFIX: usize = 3;
const REQUEST_N_LEN: usize = 4;

/// Interaction kind carried by the head frame of a request chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Response,
    FireAndForget,
    Stream,
    Channel,
}

impl RequestKind {
    fn head_field_len(self) -> usize {
        match self {
            RequestKind::Response | RequestKind::FireAndForget => 0,
            RequestKind::Stream | RequestKind::Channel => REQUEST_N_LEN,
        }
    }
}

/// Splits logical payloads into MTU-sized frame chains. An MTU of zero disables fragmentation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fragmenter {
    mtu: usize,
}

impl Fragmenter {
    pub(crate) fn new(mtu: usize) -> Fragmenter {
        debug_assert!(
            mtu == 0 || mtu >= MIN_FRAGMENT_MTU,
            "mtu MUST be 0 or >= MIN_FRAGMENT_MTU"
        );
        Fragmenter { mtu }
    }

    /// Emits the frame chain for a request head.
    ///
    /// `initial_request_n` is only written for stream and channel requests; `complete` is only
    /// meaningful for channel requests, where it half-closes the requester direction.
    pub(crate) fn fragment_request(
        &self,
        kind: RequestKind,
        stream_id: u32,
        initial_request_n: u32,
        payload: Payload,
        complete: bool,
    ) -> Vec<Frame> {
        let single_len =
            FRAME_HEADER_LEN + kind.head_field_len() + wire_len(&payload);
        if self.mtu == 0 || single_len <= self.mtu {
            return vec![make_head(
                kind,
                stream_id,
                initial_request_n,
                false,
                complete,
                payload,
            )];
        }

        // Terminal fragments of a request chain carry NEXT; COMPLETE marks the end of a
        // request-response chain or a half-closing channel request.
        let terminal_complete = match kind {
            RequestKind::Response => true,
            RequestKind::Channel => complete,
            RequestKind::FireAndForget | RequestKind::Stream => false,
        };

        let mut frames = Vec::new();
        let mut chunks = Splitter::new(self.mtu, payload);
        let (head_chunk, last) = chunks.next_chunk(kind.head_field_len());
        debug_assert!(!last);
        frames.push(make_head(
            kind,
            stream_id,
            initial_request_n,
            true,
            false,
            head_chunk,
        ));
        loop {
            let (chunk, last) = chunks.next_chunk(0);
            if last {
                frames.push(Frame::Payload(PayloadFrame::new(
                    stream_id,
                    false,
                    terminal_complete,
                    true,
                    chunk,
                )));
                return frames;
            }
            frames.push(Frame::Payload(PayloadFrame::new(
                stream_id, true, false, false, chunk,
            )));
        }
    }

    /// Emits the frame chain for a PAYLOAD emission with the given terminal flags.
    pub(crate) fn fragment_payload(
        &self,
        stream_id: u32,
        payload: Payload,
        next: bool,
        complete: bool,
    ) -> Vec<Frame> {
        let single_len = FRAME_HEADER_LEN + wire_len(&payload);
        if self.mtu == 0 || single_len <= self.mtu {
            return vec![Frame::Payload(PayloadFrame::new(
                stream_id, false, complete, next, payload,
            ))];
        }

        let mut frames = Vec::new();
        let mut chunks = Splitter::new(self.mtu, payload);
        loop {
            let (chunk, last) = chunks.next_chunk(0);
            if last {
                frames.push(Frame::Payload(PayloadFrame::new(
                    stream_id, false, complete, next, chunk,
                )));
                return frames;
            }
            frames.push(Frame::Payload(PayloadFrame::new(
                stream_id, true, false, false, chunk,
            )));
        }
    }
}

fn make_head(
    kind: RequestKind,
    stream_id: u32,
    initial_request_n: u32,
    follows: bool,
    complete: bool,
    payload: Payload,
) -> Frame {
    match kind {
        RequestKind::Response => Frame::RequestResponse(
            RequestResponseFrame::new(stream_id, follows, payload),
        ),
        RequestKind::FireAndForget => {
            Frame::RequestFnf(RequestFnfFrame::new(stream_id, follows, payload))
        }
        RequestKind::Stream => Frame::RequestStream(RequestStreamFrame::new(
            stream_id,
            follows,
            initial_request_n,
            payload,
        )),
        RequestKind::Channel => Frame::RequestChannel(RequestChannelFrame::new(
            stream_id,
            follows,
            complete,
            initial_request_n,
            payload,
        )),
    }
}

fn wire_len(payload: &Payload) -> usize {
    let meta = match payload.metadata() {
        Some(metadata) => METADATA_LEN_PREFIX + metadata.len(),
        None => 0,
    };
    meta + payload.data().map(|d| d.len()).unwrap_or(0)
}

/// Doles out successive payload chunks, each fitting an MTU-sized frame. Metadata is drained
/// first, then data fills whatever room remains.
struct Splitter {
    mtu: usize,
    metadata: Option<Bytes>,
    data: Option<Bytes>,
}

impl Splitter {
    fn new(mtu: usize, payload: Payload) -> Splitter {
        let (metadata, data) = payload.split();
        Splitter { mtu, metadata, data }
    }

    /// Returns the next chunk and whether the chunk is terminal. `head_field_len` reserves room
    /// for fields the head frame carries beyond the common header.
    fn next_chunk(&mut self, head_field_len: usize) -> (Payload, bool) {
        let mut budget =
            self.mtu.saturating_sub(FRAME_HEADER_LEN + head_field_len);
        let mut chunk_metadata = None;
        let mut chunk_data = None;

        if let Some(metadata) = &mut self.metadata {
            budget = budget.saturating_sub(METADATA_LEN_PREFIX);
            let take = budget.min(metadata.len());
            chunk_metadata = Some(metadata.split_to(take));
            budget -= take;
            if metadata.is_empty() {
                self.metadata = None;
            }
        }
        if budget > 0 {
            if let Some(data) = &mut self.data {
                let take = budget.min(data.len());
                chunk_data = Some(data.split_to(take));
                if data.is_empty() {
                    self.data = None;
                }
            }
        }

        let last = self.metadata.is_none() && self.data.is_none();
        (Payload::new(chunk_metadata, chunk_data), last)
    }
}

/// Joins a FOLLOWS chain back into one logical payload.
///
/// One reassembler exists per stream with an in-flight chain; fragments are appended in arrival
/// order and the chain is finished by the first frame without the FOLLOWS flag.
#[derive(Debug)]
pub(crate) struct Reassembler {
    kind: ChainKind,
    initial_request_n: u32,
    metadata: Option<BytesMut>,
    data: Option<BytesMut>,
}

/// What started a fragment chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChainKind {
    Request(RequestKind),
    Payload,
}

impl Reassembler {
    pub(crate) fn new(
        kind: ChainKind,
        initial_request_n: u32,
        head: Payload,
    ) -> Reassembler {
        let mut reassembler = Reassembler {
            kind,
            initial_request_n,
            metadata: None,
            data: None,
        };
        reassembler.push(head);
        reassembler
    }

    pub(crate) fn kind(&self) -> ChainKind {
        self.kind
    }

    pub(crate) fn initial_request_n(&self) -> u32 {
        self.initial_request_n
    }

    /// Appends one fragment's payload.
    pub(crate) fn push(&mut self, fragment: Payload) {
        let (metadata, data) = fragment.split();
        if let Some(metadata) = metadata {
            self.metadata
                .get_or_insert_with(BytesMut::new)
                .extend_from_slice(&metadata);
        }
        if let Some(data) = data {
            self.data
                .get_or_insert_with(BytesMut::new)
                .extend_from_slice(&data);
        }
    }

    /// Appends the terminal fragment and returns the joined logical payload.
    pub(crate) fn finish(mut self, terminal: Payload) -> Payload {
        self.push(terminal);
        Payload::new(
            self.metadata.map(BytesMut::freeze),
            self.data.map(BytesMut::freeze),
        )
    }
}
