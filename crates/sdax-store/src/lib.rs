//! Sdax Store - the frequency-counted chunk store.
//!
//! Maps a chunk's strong hash to `(content, count)` and answers two
//! ordered reads: the top-k hashes for the change detector and the full
//! content scan that defines a dictionary's byte sequence. Both reads
//! use one priority order: higher count first, ties broken by hash
//! descending.
//!
//! Backends:
//! - [`MemoryChunkStore`] - the default, in-process only
//! - [`RocksChunkStore`] - RocksDB-backed, for long-lived deployments

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod memory;
mod rocks;

pub use memory::MemoryChunkStore;
pub use rocks::RocksChunkStore;

use bytes::Bytes;
use sdax_core::ChunkHash;
use thiserror::Error;

/// Errors from chunk store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RocksDB error
    #[error("database error: {0}")]
    Database(String),

    /// Stored bytes failed to decode
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// A chunk emitted by the splitter, ready for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Strong hash of `content`
    pub hash: ChunkHash,
    /// The chunk bytes
    pub content: Bytes,
}

impl Chunk {
    /// Builds a chunk, hashing the content.
    pub fn new(content: Bytes) -> Self {
        Self {
            hash: ChunkHash::of(&content),
            content,
        }
    }
}

/// A chunk row as stored, with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    /// Strong hash of `content`
    pub hash: ChunkHash,
    /// The chunk bytes
    pub content: Bytes,
    /// Occurrences observed across all ingested bodies
    pub count: u64,
}

/// The chunk store capability.
///
/// Implementations must apply `ingest` atomically: either every chunk of
/// a body is recorded or none is. Reads observe committed state only.
pub trait ChunkStore: Send + Sync {
    /// Upserts every chunk of one body in order, as one transaction.
    /// An existing row's count is incremented; a new row starts at 1.
    fn ingest(&self, chunks: &[Chunk]) -> Result<(), StoreError>;

    /// The first `k` hashes in `(count DESC, hash DESC)` order.
    fn top_hashes(&self, k: usize) -> Result<Vec<ChunkHash>, StoreError>;

    /// All chunk contents in `(count DESC, hash DESC)` order. This
    /// sequence defines the dictionary content block and must be stable
    /// across equivalent store states.
    fn iter_dict_content(&self) -> Result<Vec<Bytes>, StoreError>;

    /// Number of distinct chunks stored.
    fn len(&self) -> Result<u64, StoreError>;

    /// True when no chunks have been stored.
    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Sorts rows into the store's priority order.
pub(crate) fn sort_rows(rows: &mut [StoredChunk]) {
    rows.sort_unstable_by(|a, b| b.count.cmp(&a.count).then_with(|| b.hash.cmp(&a.hash)));
}
