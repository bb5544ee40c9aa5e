//! Fleet state: the currently advertised dictionary.
//!
//! One invariant ties the whole system together: the identifier
//! advertised to clients, the identifier in the dictionary file name,
//! and the identifier prepended to encoded payloads all derive from a
//! single hash. `CurrentDict` carries that hash; the engine swaps the
//! reference atomically when a synthesis publishes.

use std::sync::Arc;

use bytes::Bytes;
use sdax_core::{ChunkHash, DictHash};

/// The dictionary currently advertised to clients.
#[derive(Debug, Clone)]
pub struct CurrentDict {
    /// Identity hash; every wire identifier derives from it
    pub hash: DictHash,
    /// The header block bytes as written to the header directory
    pub header: Bytes,
}

impl CurrentDict {
    /// File/URL name of this dictionary.
    pub fn name(&self) -> String {
        self.hash.name()
    }
}

/// Mutable engine state guarded by one mutex.
///
/// Readers (the hot path) take the lock briefly; the synthesis writer
/// takes it only to swap the pointer, never during the synthesis work.
#[derive(Debug, Default)]
pub(crate) struct FleetState {
    /// Currently advertised dictionary, if any
    pub current: Option<Arc<CurrentDict>>,
    /// Anchor chunks cached by the change detector
    pub prev_top: Vec<ChunkHash>,
}
