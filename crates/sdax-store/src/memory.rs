//! In-memory chunk store.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use sdax_core::ChunkHash;

use crate::{sort_rows, Chunk, ChunkStore, StoreError, StoredChunk};

#[derive(Debug, Clone)]
struct Row {
    content: Bytes,
    count: u64,
}

/// The default chunk store: a mutex-guarded map, in-process only.
///
/// Ordered reads materialize and sort the row set on each call; the
/// store is small relative to bodies flowing through, and reads happen
/// once per ingest, so this stays off the hot path.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    rows: Mutex<HashMap<ChunkHash, Row>>,
}

impl MemoryChunkStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_rows(&self) -> Vec<StoredChunk> {
        let rows = self.rows.lock();
        let mut all: Vec<StoredChunk> = rows
            .iter()
            .map(|(hash, row)| StoredChunk {
                hash: *hash,
                content: row.content.clone(),
                count: row.count,
            })
            .collect();
        drop(rows);
        sort_rows(&mut all);
        all
    }
}

impl ChunkStore for MemoryChunkStore {
    fn ingest(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        // One lock acquisition for the whole body gives the all-or-
        // nothing guarantee: no reader observes a partial batch.
        let mut rows = self.rows.lock();
        for chunk in chunks {
            rows.entry(chunk.hash)
                .and_modify(|row| row.count += 1)
                .or_insert_with(|| Row {
                    content: chunk.content.clone(),
                    count: 1,
                });
        }
        Ok(())
    }

    fn top_hashes(&self, k: usize) -> Result<Vec<ChunkHash>, StoreError> {
        Ok(self
            .sorted_rows()
            .into_iter()
            .take(k)
            .map(|row| row.hash)
            .collect())
    }

    fn iter_dict_content(&self) -> Result<Vec<Bytes>, StoreError> {
        Ok(self
            .sorted_rows()
            .into_iter()
            .map(|row| row.content)
            .collect())
    }

    fn len(&self) -> Result<u64, StoreError> {
        Ok(self.rows.lock().len() as u64)
    }
}
