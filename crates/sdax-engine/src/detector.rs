//! Dictionary change detection.
//!
//! A heuristic over the most frequent chunks: as long as any chunk that
//! anchored the last synthesis is still among the current top ten, the
//! frequency distribution is considered stable and the dictionary is
//! left alone. It can under- or over-trigger; its behavior is pinned by
//! the scenario tests, not by an information-theoretic property.

use sdax_core::ChunkHash;

/// How many of the most frequent chunks the detector inspects.
pub const TOP_N: usize = 10;

/// Decides whether the dictionary should be resynthesized.
///
/// `prev_top` holds the anchor chunk(s) cached when a change was last
/// reported; `new_top` is the current `(count DESC, hash DESC)` top-N.
pub fn dictionary_changed(prev_top: &[ChunkHash], new_top: &[ChunkHash]) -> bool {
    if prev_top.is_empty() {
        return !new_top.is_empty();
    }
    !prev_top.iter().any(|anchor| new_top.contains(anchor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> ChunkHash {
        ChunkHash([byte; 20])
    }

    #[test]
    fn first_chunks_trigger_change() {
        assert!(dictionary_changed(&[], &[h(1)]));
    }

    #[test]
    fn empty_store_stays_unchanged() {
        assert!(!dictionary_changed(&[], &[]));
    }

    #[test]
    fn stable_anchor_suppresses_resynthesis() {
        let prev = vec![h(3)];
        let new_top = vec![h(9), h(3), h(1)];
        assert!(!dictionary_changed(&prev, &new_top));
    }

    #[test]
    fn displaced_anchor_triggers_change() {
        let prev = vec![h(3)];
        let new_top: Vec<ChunkHash> = (10u8..20).map(h).collect();
        assert!(dictionary_changed(&prev, &new_top));
    }

    #[test]
    fn any_surviving_anchor_counts() {
        let prev = vec![h(1), h(2)];
        let new_top = vec![h(9), h(2)];
        assert!(!dictionary_changed(&prev, &new_top));
    }
}
