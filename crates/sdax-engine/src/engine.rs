//! The engine: one owned value tying splitter, store, detector,
//! synthesizer, fleet state, and codec together.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use sdax_core::{DictHash, DictHasher, DictHeader};
use sdax_store::{Chunk, ChunkStore};
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::delta::{self, EncodedBody};
use crate::detector::{self, TOP_N};
use crate::dictstore::DictStore;
use crate::fleet::{CurrentDict, FleetState};
use crate::stats::EngineStats;
use crate::{EngineError, StatsSnapshot};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Origin host the dictionaries apply to
    pub domain: String,
    /// Origin port, written into the dictionary header
    pub port: u16,
}

/// What an ingest pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Chunks the splitter emitted for this body
    pub chunks: usize,
    /// Whether the change detector requested a resynthesis
    pub changed: bool,
    /// Outcome of that resynthesis
    pub synth: SynthOutcome,
}

/// Outcome of a synthesis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthOutcome {
    /// The detector saw no change; synthesis was not attempted
    NotNeeded,
    /// Another synthesis was in flight; this request coalesced into it
    Coalesced,
    /// The store state hashed to the current dictionary; nothing written
    Unchanged,
    /// A new dictionary was published
    Published(DictHash),
}

/// The adaptive dictionary engine.
pub struct Engine {
    config: EngineConfig,
    chunks: Arc<dyn ChunkStore>,
    dicts: Arc<dyn DictStore>,
    codec: Arc<dyn Codec>,
    fleet: Mutex<FleetState>,
    synth_running: AtomicBool,
    stats: EngineStats,
}

impl Engine {
    /// Creates an engine over the given capabilities.
    pub fn new(
        config: EngineConfig,
        chunks: Arc<dyn ChunkStore>,
        dicts: Arc<dyn DictStore>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            config,
            chunks,
            dicts,
            codec,
            fleet: Mutex::new(FleetState::default()),
            synth_running: AtomicBool::new(false),
            stats: EngineStats::default(),
        }
    }

    /// The configured origin.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The currently advertised dictionary, if any.
    pub fn current(&self) -> Option<Arc<CurrentDict>> {
        self.fleet.lock().current.clone()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Splits a body into chunks, records them, and resynthesizes the
    /// dictionary when the frequency distribution shifted.
    ///
    /// Runs on worker tasks, never on the response path.
    pub fn ingest_body(&self, body: &[u8]) -> Result<IngestReport, EngineError> {
        let started = Instant::now();

        let chunks: Vec<Chunk> = sdax_cdc::split(body)
            .into_iter()
            .map(Chunk::new)
            .collect();
        if chunks.is_empty() {
            return Ok(IngestReport {
                chunks: 0,
                changed: false,
                synth: SynthOutcome::NotNeeded,
            });
        }

        if let Err(error) = self.chunks.ingest(&chunks) {
            self.stats.ingest_failures.fetch_add(1, Ordering::Relaxed);
            return Err(error.into());
        }
        self.stats.bodies_ingested.fetch_add(1, Ordering::Relaxed);
        self.stats.chunks_recorded.fetch_add(chunks.len() as u64, Ordering::Relaxed);
        self.stats.bytes_ingested.fetch_add(body.len() as u64, Ordering::Relaxed);

        let top = self.chunks.top_hashes(TOP_N)?;
        let changed = {
            let mut fleet = self.fleet.lock();
            if detector::dictionary_changed(&fleet.prev_top, &top) {
                if let Some(first) = top.first() {
                    fleet.prev_top = vec![*first];
                }
                true
            } else {
                false
            }
        };

        let synth = if changed {
            self.synthesize()?
        } else {
            SynthOutcome::NotNeeded
        };

        debug!(
            chunks = chunks.len(),
            changed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingested body"
        );
        Ok(IngestReport {
            chunks: chunks.len(),
            changed,
            synth,
        })
    }

    /// Synthesizes a dictionary from the current store state and
    /// publishes it as current.
    ///
    /// Single-writer: a request arriving while another synthesis runs
    /// coalesces into it and returns immediately.
    pub fn synthesize(&self) -> Result<SynthOutcome, EngineError> {
        if self
            .synth_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(SynthOutcome::Coalesced);
        }
        let result = self.synthesize_inner();
        self.synth_running.store(false, Ordering::Release);
        result
    }

    fn synthesize_inner(&self) -> Result<SynthOutcome, EngineError> {
        let started = Instant::now();

        let header = DictHeader::new(&self.config.domain, self.config.port).to_bytes();
        let mut hasher = DictHasher::new();
        hasher.update(&header);

        let contents = self.chunks.iter_dict_content()?;
        let mut content = Vec::with_capacity(contents.iter().map(Bytes::len).sum());
        for part in &contents {
            hasher.update(part);
            content.extend_from_slice(part);
        }
        let hash = hasher.finish();
        let name = hash.name();

        if self
            .fleet
            .lock()
            .current
            .as_ref()
            .is_some_and(|current| current.hash == hash)
        {
            debug!(%name, "synthesis produced the current dictionary, no change");
            return Ok(SynthOutcome::Unchanged);
        }

        // Publish the files first; only a fully written dictionary may
        // become current.
        self.dicts.put(&name, &header, &content)?;

        let new = Arc::new(CurrentDict {
            hash,
            header: header.clone(),
        });
        let previous = {
            let mut fleet = self.fleet.lock();
            fleet.current.replace(new)
        };

        if let Some(previous) = previous {
            if let Err(error) = self.dicts.delete(&previous.name()) {
                warn!(name = %previous.name(), %error, "failed to delete previous dictionary");
            }
        }

        self.stats.dicts_published.fetch_add(1, Ordering::Relaxed);
        info!(
            %name,
            content_bytes = content.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "published dictionary"
        );
        Ok(SynthOutcome::Published(hash))
    }

    /// Delta-encodes a body against the current dictionary.
    ///
    /// Returns `None` whenever the original must be served instead: no
    /// dictionary yet, codec failure, or an encoded form that is not
    /// strictly smaller. Never propagates an error to the caller.
    pub async fn encode_body(&self, body: &[u8]) -> Option<EncodedBody> {
        let current = self.current()?;
        let dict_path = self.dicts.content_path(&current.name());

        let framed =
            match delta::encode_framed(self.codec.as_ref(), &dict_path, &current.hash, body).await {
                Ok(framed) => framed,
                Err(error) => {
                    warn!(%error, "delta encode failed, serving original");
                    return None;
                }
            };

        if framed.len() >= body.len() {
            debug!(
                encoded = framed.len(),
                original = body.len(),
                "encoded form not smaller, serving original"
            );
            return None;
        }

        let saved = (body.len() - framed.len()) as u64;
        self.stats.deltas_served.fetch_add(1, Ordering::Relaxed);
        self.stats.delta_bytes_saved.fetch_add(saved, Ordering::Relaxed);
        let ratio = 100.0 * framed.len() as f64 / body.len() as f64;
        debug!(
            encoded = framed.len(),
            original = body.len(),
            ratio,
            "serving delta"
        );
        Some(EncodedBody {
            bytes: Bytes::from(framed),
            saved,
        })
    }

    /// True when the advertised client id names the current dictionary.
    pub fn matches_client_id(&self, advertised: &[u8; 6]) -> bool {
        self.current()
            .is_some_and(|current| current.hash.client_id_bytes() == *advertised)
    }

    /// The download path advertised via `Get-Dictionary`.
    pub fn get_dictionary_path(&self) -> Option<String> {
        let current = self.current()?;
        Some(format!(
            "/_dictionary/{}:{}/{}",
            self.config.domain,
            self.config.port,
            current.name()
        ))
    }

    /// The full download payload (`header || content`) for `name`, or
    /// `None` unless `name` is the current dictionary.
    pub fn dictionary_payload(&self, name: &str) -> Result<Option<Bytes>, EngineError> {
        let Some(current) = self.current() else {
            return Ok(None);
        };
        if current.name() != name {
            return Ok(None);
        }
        let Some(stored) = self.dicts.get(name)? else {
            warn!(name, "current dictionary missing from store");
            return Ok(None);
        };
        Ok(Some(stored.to_wire()))
    }

    /// The codec's dictionary path for the current dictionary.
    pub fn current_dict_path(&self) -> Option<PathBuf> {
        self.current()
            .map(|current| self.dicts.content_path(&current.name()))
    }

    /// Adopts the newest dictionary left on disk and removes the rest.
    ///
    /// Called once at startup. The anchor state starts empty and the
    /// chunk store starts empty regardless of what was adopted.
    pub fn bootstrap(&self) -> Result<Option<DictHash>, EngineError> {
        let mut entries = self.dicts.scan()?;
        if entries.is_empty() {
            return Ok(None);
        }
        entries.sort_by_key(|entry| entry.modified);
        let newest = entries.pop();

        for stale in entries {
            if let Err(error) = self.dicts.delete(&stale.name) {
                warn!(name = %stale.name, %error, "failed to delete stale dictionary");
            }
        }

        let Some(newest) = newest else {
            return Ok(None);
        };

        let Ok(hash) = DictHash::from_name(&newest.name) else {
            warn!(name = %newest.name, "unparseable dictionary name, removing");
            self.dicts.delete(&newest.name)?;
            return Ok(None);
        };

        let Some(stored) = self.dicts.get(&newest.name)? else {
            warn!(name = %newest.name, "dictionary lost its header file, removing");
            self.dicts.delete(&newest.name)?;
            return Ok(None);
        };

        let recomputed = DictHash::of_parts(&stored.header, &stored.content);
        if recomputed != hash {
            warn!(name = %newest.name, "dictionary identity mismatch, removing");
            self.dicts.delete(&newest.name)?;
            return Ok(None);
        }

        self.fleet.lock().current = Some(Arc::new(CurrentDict {
            hash,
            header: stored.header,
        }));
        info!(name = %newest.name, "adopted dictionary from disk");
        Ok(Some(hash))
    }
}
