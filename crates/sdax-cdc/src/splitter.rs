//! Streaming body splitter.

use bytes::Bytes;

use crate::params::SPLIT_BITS;
use crate::Rollsum;

/// Streaming chunk splitter.
///
/// Feed bytes in one at a time; a completed chunk comes back whenever
/// the byte just consumed lands on a split point. State is per body:
/// create a fresh `Splitter` for each response.
///
/// Bytes after the last split point never form a chunk. The tail is
/// dropped when the splitter is, which loses trailing bytes from
/// ingestion; chunk accounting tolerates that loss and downstream
/// consumers must not assume full coverage of the input.
#[derive(Debug)]
pub struct Splitter {
    rollsum: Rollsum,
    buf: Vec<u8>,
    bits: u32,
}

impl Splitter {
    /// Creates a splitter at the default mask width.
    pub fn new() -> Self {
        Self::with_split_bits(SPLIT_BITS)
    }

    /// Creates a splitter with a custom mask width (chunk sizes average
    /// `2^bits` bytes).
    pub fn with_split_bits(bits: u32) -> Self {
        Self {
            rollsum: Rollsum::new(),
            buf: Vec::new(),
            bits,
        }
    }

    /// Consumes one byte; returns the finished chunk if this byte ends
    /// one.
    pub fn push(&mut self, byte: u8) -> Option<Bytes> {
        self.rollsum.roll(byte);
        self.buf.push(byte);
        if self.rollsum.on_split_with_bits(self.bits) {
            Some(Bytes::from(std::mem::take(&mut self.buf)))
        } else {
            None
        }
    }

    /// Consumes a slice, collecting every chunk completed within it.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Bytes> {
        let mut chunks = Vec::new();
        for &byte in data {
            if let Some(chunk) = self.push(byte) {
                chunks.push(chunk);
            }
        }
        chunks
    }

    /// Bytes buffered since the last boundary (the would-be tail).
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for Splitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits one whole body with a fresh splitter, discarding the tail.
pub fn split(data: &[u8]) -> Vec<Bytes> {
    Splitter::new().feed(data)
}
