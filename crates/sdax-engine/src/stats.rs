//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated across handler and worker contexts.
#[derive(Debug, Default)]
pub(crate) struct EngineStats {
    pub bodies_ingested: AtomicU64,
    pub chunks_recorded: AtomicU64,
    pub bytes_ingested: AtomicU64,
    pub ingest_failures: AtomicU64,
    pub dicts_published: AtomicU64,
    pub deltas_served: AtomicU64,
    pub delta_bytes_saved: AtomicU64,
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bodies_ingested: self.bodies_ingested.load(Ordering::Relaxed),
            chunks_recorded: self.chunks_recorded.load(Ordering::Relaxed),
            bytes_ingested: self.bytes_ingested.load(Ordering::Relaxed),
            ingest_failures: self.ingest_failures.load(Ordering::Relaxed),
            dicts_published: self.dicts_published.load(Ordering::Relaxed),
            deltas_served: self.deltas_served.load(Ordering::Relaxed),
            delta_bytes_saved: self.delta_bytes_saved.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Bodies fully ingested
    pub bodies_ingested: u64,
    /// Chunk occurrences recorded (including repeats)
    pub chunks_recorded: u64,
    /// Total body bytes ingested
    pub bytes_ingested: u64,
    /// Ingest attempts that failed and were dropped
    pub ingest_failures: u64,
    /// Dictionaries published since startup
    pub dicts_published: u64,
    /// Responses served delta-encoded
    pub deltas_served: u64,
    /// Bytes saved across all delta-encoded responses
    pub delta_bytes_saved: u64,
}
