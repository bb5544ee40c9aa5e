//! RocksDB-backed chunk store.
//!
//! Rows live in one column family keyed by the chunk hash; the value is
//! the occurrence count (8 bytes little-endian) followed by the content.
//! A body's upserts go through a single `WriteBatch` so the batch
//! commits or fails as a unit.

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use parking_lot::Mutex;
use rocksdb::{Options, WriteBatch, DB};
use sdax_core::ChunkHash;
use tracing::debug;

use crate::{sort_rows, Chunk, ChunkStore, StoreError, StoredChunk};

/// Column family name for chunk rows.
const CHUNKS_CF: &str = "chunks";

/// Persistent chunk store backed by RocksDB.
pub struct RocksChunkStore {
    db: DB,
    // Serializes read-modify-write ingest cycles; without it two
    // concurrent batches could both read count N and write N+1.
    write_lock: Mutex<()>,
}

impl RocksChunkStore {
    /// Opens or creates a store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, [CHUNKS_CF])
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(CHUNKS_CF)
            .ok_or_else(|| StoreError::Database("missing chunks column family".to_string()))
    }

    fn decode_row(key: &[u8], value: &[u8]) -> Result<StoredChunk, StoreError> {
        let hash: [u8; 20] = key
            .try_into()
            .map_err(|_| StoreError::InvalidData(format!("bad key length {}", key.len())))?;
        if value.len() < 8 {
            return Err(StoreError::InvalidData(format!(
                "row shorter than count prefix: {}",
                value.len()
            )));
        }
        let count = u64::from_le_bytes(
            value[..8]
                .try_into()
                .map_err(|_| StoreError::InvalidData("bad count prefix".to_string()))?,
        );
        Ok(StoredChunk {
            hash: ChunkHash(hash),
            content: Bytes::copy_from_slice(&value[8..]),
            count,
        })
    }

    fn encode_row(count: u64, content: &[u8]) -> Vec<u8> {
        let mut value = Vec::with_capacity(8 + content.len());
        value.extend_from_slice(&count.to_le_bytes());
        value.extend_from_slice(content);
        value
    }

    fn sorted_rows(&self) -> Result<Vec<StoredChunk>, StoreError> {
        let cf = self.cf()?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            rows.push(Self::decode_row(&key, &value)?);
        }
        sort_rows(&mut rows);
        Ok(rows)
    }
}

impl ChunkStore for RocksChunkStore {
    fn ingest(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        // Fold repeats within the body first so each key gets one write.
        let mut additions: HashMap<ChunkHash, (&Bytes, u64)> = HashMap::new();
        for chunk in chunks {
            additions
                .entry(chunk.hash)
                .and_modify(|(_, n)| *n += 1)
                .or_insert((&chunk.content, 1));
        }

        let _guard = self.write_lock.lock();
        let cf = self.cf()?;
        let mut batch = WriteBatch::default();
        for (hash, (content, added)) in &additions {
            let existing = self
                .db
                .get_cf(cf, hash.as_bytes())
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let count = match existing {
                Some(value) => Self::decode_row(hash.as_bytes(), &value)?.count + added,
                None => *added,
            };
            batch.put_cf(cf, hash.as_bytes(), Self::encode_row(count, content));
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        debug!(chunks = chunks.len(), distinct = additions.len(), "ingested batch");
        Ok(())
    }

    fn top_hashes(&self, k: usize) -> Result<Vec<ChunkHash>, StoreError> {
        Ok(self
            .sorted_rows()?
            .into_iter()
            .take(k)
            .map(|row| row.hash)
            .collect())
    }

    fn iter_dict_content(&self) -> Result<Vec<Bytes>, StoreError> {
        Ok(self
            .sorted_rows()?
            .into_iter()
            .map(|row| row.content)
            .collect())
    }

    fn len(&self) -> Result<u64, StoreError> {
        let cf = self.cf()?;
        let mut n = 0u64;
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            item.map_err(|e| StoreError::Database(e.to_string()))?;
            n += 1;
        }
        Ok(n)
    }
}
