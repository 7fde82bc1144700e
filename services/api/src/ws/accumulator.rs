//! Buffers the utterance currently being recorded.

use bytes::{Bytes, BytesMut};

/// Ordered raw audio chunks for the current utterance.
///
/// The accumulator itself imposes no size limit; the session loop enforces
/// the configured utterance bound using `len`.
#[derive(Debug, Default)]
pub struct AudioAccumulator {
    chunks: Vec<Bytes>,
    len: usize,
}

impl AudioAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: Bytes) {
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    /// Concatenates every chunk in arrival order and empties the buffer.
    /// Draining an empty buffer yields empty bytes.
    pub fn drain_and_reset(&mut self) -> Bytes {
        let mut utterance = BytesMut::with_capacity(self.len);
        for chunk in self.chunks.drain(..) {
            utterance.extend_from_slice(&chunk);
        }
        self.len = 0;
        utterance.freeze()
    }

    /// Total buffered bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0 && self.chunks.is_empty()
    }
}
