//! Frame accumulator: turns arbitrary read chunks into complete 188-byte frames.
//!
//! Bytes are kept in a single `BytesMut`; each complete frame is split off the
//! front and frozen, so frames are handed out without copying. Whatever does
//! not fill a frame stays buffered for the next `ingest`.

use bytes::BytesMut;

use crate::frame::{Frame, FRAME_LEN};

/// Buffer that reassembles a byte stream into frames. One per stream session.
#[derive(Debug)]
pub struct FrameAccumulator {
    buffer: BytesMut,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(FRAME_LEN),
        }
    }

    /// Append `chunk` and return the frames it completes, in stream order.
    ///
    /// The returned iterator is lazy. Frames it has not yielded when dropped
    /// stay buffered and come out first on the next call, so no byte is ever lost.
    pub fn ingest<'a>(&'a mut self, chunk: &[u8]) -> Frames<'a> {
        if !chunk.is_empty() {
            self.buffer.extend_from_slice(chunk);
        }
        Frames {
            buffer: &mut self.buffer,
        }
    }

    /// Bytes collected toward the current frame, in `0..FRAME_LEN` once all
    /// complete frames have been taken.
    pub fn offset(&self) -> usize {
        self.buffer.len() % FRAME_LEN
    }

    /// Bytes still missing from the current frame. Blocking reads ask for at most this much.
    pub fn remaining(&self) -> usize {
        FRAME_LEN - self.offset()
    }

    /// Number of complete frames buffered but not yet taken.
    pub fn ready(&self) -> usize {
        self.buffer.len() / FRAME_LEN
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy sequence of frames produced by one `ingest`.
pub struct Frames<'a> {
    buffer: &'a mut BytesMut,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.buffer.len() < FRAME_LEN {
            return None;
        }
        let frame = self.buffer.split_to(FRAME_LEN).freeze();
        Some(Frame::from_complete(frame))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.buffer.len() / FRAME_LEN;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Frames<'_> {}
