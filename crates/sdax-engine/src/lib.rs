//! Sdax Engine - the adaptive dictionary engine.
//!
//! Ingests response bodies, accumulates content-defined chunks in a
//! frequency-counted store, decides when the frequency distribution has
//! shifted enough to mint a new shared dictionary, synthesizes and
//! publishes that dictionary, and couples it to response bodies through
//! an external VCDIFF codec.
//!
//! All mutable state lives in one owned [`Engine`] value; handlers hold
//! an `Arc` to it. Failure on the hot path always degrades to serving
//! the original bytes.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod codec;
pub mod delta;
pub mod detector;
pub mod dictstore;
mod engine;
pub mod fleet;
pub mod queue;
pub mod stats;

pub use codec::{Codec, CodecError, VcdiffCodec};
pub use delta::{DecodeOutcome, EncodedBody};
pub use dictstore::{DictEntry, DictStore, DictStoreError, DirDictStore, MemoryDictStore, StoredDict};
pub use engine::{Engine, EngineConfig, IngestReport, SynthOutcome};
pub use fleet::CurrentDict;
pub use queue::IngestQueue;
pub use stats::StatsSnapshot;

use thiserror::Error;

/// Errors from engine operations.
///
/// Handlers never surface these to clients; they log and fall back to
/// the unencoded body. Only `sdaxd` startup treats them as fatal.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Chunk store failure
    #[error("chunk store: {0}")]
    Store(#[from] sdax_store::StoreError),

    /// Dictionary store failure
    #[error("dictionary store: {0}")]
    Dict(#[from] DictStoreError),

    /// Codec failure
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    /// Identity derivation failure
    #[error("identity: {0}")]
    Identity(#[from] sdax_core::IdentityError),
}
