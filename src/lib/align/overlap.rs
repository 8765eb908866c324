//! Minimizer-seeded overlap detection between reads.
//!
//! Duplex pairing has to decide whether a candidate complement strand maps
//! onto a template strand, where the mapping lands on each read, and how
//! confident it is. A full aligner is far more than that needs: this module
//! seeds canonical k-mer minimizers, chains seed matches per diagonal, and
//! derives a mapping quality from the separation between the best and
//! second-best chains.
//!
//! Positions in an [`OverlapHit`] are always in each read's own forward
//! orientation, with inclusive end coordinates.

use ahash::{AHashMap, AHashSet, AHasher};
use std::hash::{Hash, Hasher};

/// Minimizer k-mer length.
pub const MINIMIZER_K: usize = 15;
/// One minimizer is kept per window of this many consecutive k-mers.
pub const MINIMIZER_W: usize = 10;

/// Width of a diagonal bin when chaining anchors.
const DIAGONAL_BIN: i64 = 256;
/// Chains with fewer anchors than this are treated as seed noise.
const MIN_CHAIN_ANCHORS: u32 = 4;
/// Seeds occurring more often than this in the target are skipped as repeats.
const MAX_SEED_OCCURRENCES: usize = 16;
const MAX_MAPQ: f64 = 60.0;

/// A chained overlap between a query and a target read.
///
/// `reverse` is set when the query matches the reverse complement of the
/// target, which is the expected orientation for a duplex complement strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapHit {
    /// First query position covered by the chain.
    pub query_start: usize,
    /// Last query position covered by the chain (inclusive).
    pub query_end: usize,
    /// First target position covered by the chain.
    pub target_start: usize,
    /// Last target position covered by the chain (inclusive).
    pub target_end: usize,
    /// Query maps to the reverse complement of the target.
    pub reverse: bool,
    /// Number of seed matches supporting the chain.
    pub anchors: u32,
    /// Confidence in [0, 60], from best/second-best chain separation.
    pub mapq: u8,
}

#[derive(Debug, Clone, Copy)]
struct Minimizer {
    hash: u64,
    pos: u32,
    /// Canonical form equals the forward-strand k-mer.
    forward: bool,
}

#[derive(Debug, Clone, Copy)]
struct Chain {
    anchors: u32,
    query_start: u32,
    query_end: u32,
    target_start: u32,
    target_end: u32,
}

impl Chain {
    fn seed(query_pos: u32, target_pos: u32) -> Self {
        Self {
            anchors: 1,
            query_start: query_pos,
            query_end: query_pos,
            target_start: target_pos,
            target_end: target_pos,
        }
    }

    fn extend(&mut self, query_pos: u32, target_pos: u32) {
        self.anchors += 1;
        self.query_start = self.query_start.min(query_pos);
        self.query_end = self.query_end.max(query_pos);
        self.target_start = self.target_start.min(target_pos);
        self.target_end = self.target_end.max(target_pos);
    }

    fn absorb(&mut self, other: &Chain) {
        self.anchors += other.anchors;
        self.query_start = self.query_start.min(other.query_start);
        self.query_end = self.query_end.max(other.query_end);
        self.target_start = self.target_start.min(other.target_start);
        self.target_end = self.target_end.max(other.target_end);
    }
}

/// Reusable buffers for overlap mapping.
///
/// Mapping allocates nothing beyond these buffers once they are warm, so each
/// worker thread owns one and reuses it across candidate pairs.
#[derive(Debug, Default)]
pub struct OverlapScratch {
    target_minimizers: Vec<Minimizer>,
    query_minimizers: Vec<Minimizer>,
    kmer_buffer: Vec<Minimizer>,
    seed_index: AHashMap<u64, Vec<(u32, bool)>>,
    chains: AHashMap<(bool, i64), Chain>,
}

impl OverlapScratch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn clear(&mut self) {
        self.target_minimizers.clear();
        self.query_minimizers.clear();
        self.seed_index.clear();
        self.chains.clear();
    }
}

#[inline]
const fn base_code(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

fn hash_kmer(kmer: u64) -> u64 {
    let mut hasher = AHasher::default();
    kmer.hash(&mut hasher);
    hasher.finish()
}

/// Collects window minimizers of `seq` into `out` using `buffer` for the raw
/// k-mer stream. K-mers containing a non-ACGT base are skipped, as are
/// palindromic k-mers, which have no defined strand.
fn minimizers(seq: &[u8], buffer: &mut Vec<Minimizer>, out: &mut Vec<Minimizer>) {
    out.clear();
    buffer.clear();
    if seq.len() < MINIMIZER_K {
        return;
    }

    let mask = (1u64 << (2 * MINIMIZER_K)) - 1;
    let shift = (2 * (MINIMIZER_K - 1)) as u32;
    let mut fwd = 0u64;
    let mut rev = 0u64;
    let mut valid = 0usize;
    for (i, &base) in seq.iter().enumerate() {
        let Some(code) = base_code(base) else {
            valid = 0;
            fwd = 0;
            rev = 0;
            continue;
        };
        fwd = ((fwd << 2) | code) & mask;
        rev = (rev >> 2) | ((3 - code) << shift);
        valid += 1;
        if valid < MINIMIZER_K || fwd == rev {
            continue;
        }
        let (canonical, forward) = if fwd < rev { (fwd, true) } else { (rev, false) };
        buffer.push(Minimizer {
            hash: hash_kmer(canonical),
            pos: (i + 1 - MINIMIZER_K) as u32,
            forward,
        });
    }
    if buffer.is_empty() {
        return;
    }

    let window = MINIMIZER_W.min(buffer.len());
    let mut last_pos = u32::MAX;
    for slice in buffer.windows(window) {
        if let Some(min) = slice.iter().min_by_key(|m| (m.hash, m.pos)) {
            if min.pos != last_pos {
                out.push(*min);
                last_pos = min.pos;
            }
        }
    }
}

/// Maps `query` against `target` and returns all credible overlap chains,
/// best first.
///
/// Anchors land in diagonal bins (anti-diagonal for opposite-strand matches)
/// and each bin merges with its right neighbor so a chain drifting across a
/// bin boundary still counts once. The caller decides what to do with
/// multiple hits; duplex pairing demands exactly one.
#[must_use]
pub fn map_overlaps(target: &[u8], query: &[u8], scratch: &mut OverlapScratch) -> Vec<OverlapHit> {
    scratch.clear();

    {
        let OverlapScratch { target_minimizers, query_minimizers, kmer_buffer, .. } = scratch;
        minimizers(target, kmer_buffer, target_minimizers);
        minimizers(query, kmer_buffer, query_minimizers);
    }
    if scratch.target_minimizers.is_empty() || scratch.query_minimizers.is_empty() {
        return Vec::new();
    }

    for minimizer in &scratch.target_minimizers {
        scratch
            .seed_index
            .entry(minimizer.hash)
            .or_default()
            .push((minimizer.pos, minimizer.forward));
    }

    for minimizer in &scratch.query_minimizers {
        let Some(entries) = scratch.seed_index.get(&minimizer.hash) else { continue };
        if entries.len() > MAX_SEED_OCCURRENCES {
            continue;
        }
        for &(target_pos, target_forward) in entries {
            let same_strand = minimizer.forward == target_forward;
            let diagonal = if same_strand {
                i64::from(target_pos) - i64::from(minimizer.pos)
            } else {
                i64::from(target_pos) + i64::from(minimizer.pos)
            };
            let key = (same_strand, diagonal.div_euclid(DIAGONAL_BIN));
            scratch
                .chains
                .entry(key)
                .and_modify(|chain| chain.extend(minimizer.pos, target_pos))
                .or_insert_with(|| Chain::seed(minimizer.pos, target_pos));
        }
    }

    // Merge each bin with its right neighbor, then greedily keep the best
    // non-overlapping candidates.
    let mut candidates: Vec<(bool, i64, Chain)> = Vec::with_capacity(scratch.chains.len());
    for (&(same_strand, diagonal), chain) in &scratch.chains {
        let mut merged = *chain;
        if let Some(next) = scratch.chains.get(&(same_strand, diagonal + 1)) {
            merged.absorb(next);
        }
        candidates.push((same_strand, diagonal, merged));
    }
    candidates.sort_by(|a, b| {
        b.2.anchors.cmp(&a.2.anchors).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1))
    });

    let mut consumed: AHashSet<(bool, i64)> = AHashSet::new();
    let mut accepted: Vec<(bool, Chain)> = Vec::new();
    for (same_strand, diagonal, chain) in candidates {
        if chain.anchors < MIN_CHAIN_ANCHORS {
            break;
        }
        if consumed.contains(&(same_strand, diagonal))
            || consumed.contains(&(same_strand, diagonal + 1))
        {
            continue;
        }
        consumed.insert((same_strand, diagonal));
        consumed.insert((same_strand, diagonal + 1));
        accepted.push((same_strand, chain));
    }

    accepted
        .iter()
        .enumerate()
        .map(|(i, &(same_strand, chain))| {
            let best = f64::from(chain.anchors);
            let runner_up = accepted
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, &(_, other))| other.anchors)
                .max()
                .unwrap_or(0);
            let mapq = (40.0
                * (1.0 - f64::from(runner_up) / best)
                * (best / 10.0).min(1.0)
                * best.ln())
            .clamp(0.0, MAX_MAPQ) as u8;
            OverlapHit {
                query_start: chain.query_start as usize,
                query_end: chain.query_end as usize + MINIMIZER_K - 1,
                target_start: chain.target_start as usize,
                target_end: chain.target_end as usize + MINIMIZER_K - 1,
                reverse: !same_strand,
                anchors: chain.anchors,
                mapq,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dna::reverse_complement;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_seq(rng: &mut StdRng, len: usize) -> Vec<u8> {
        (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
    }

    #[test]
    fn test_reverse_overlap_detected() {
        let mut rng = StdRng::seed_from_u64(7);
        let template = random_seq(&mut rng, 2000);
        let complement = reverse_complement(&template[600..]);

        let mut scratch = OverlapScratch::new();
        let hits = map_overlaps(&template, &complement, &mut scratch);
        assert_eq!(hits.len(), 1);
        let hit = hits[0];
        assert!(hit.reverse);
        assert!(hit.mapq >= 50, "mapq was {}", hit.mapq);
        // Seeding loses at most a window of resolution at each edge.
        assert!(hit.target_start >= 600 && hit.target_start <= 660);
        assert!(hit.target_end >= 1940 && hit.target_end < 2000);
        assert!(hit.query_start <= 60);
        assert!(hit.query_end >= complement.len() - 60);
    }

    #[test]
    fn test_same_strand_overlap() {
        let mut rng = StdRng::seed_from_u64(11);
        let target = random_seq(&mut rng, 2000);
        let query = target[500..1800].to_vec();

        let mut scratch = OverlapScratch::new();
        let hits = map_overlaps(&target, &query, &mut scratch);
        assert_eq!(hits.len(), 1);
        let hit = hits[0];
        assert!(!hit.reverse);
        assert!(hit.target_start >= 500 && hit.target_start <= 560);
        assert!(hit.target_end >= 1740 && hit.target_end < 1800);
    }

    #[test]
    fn test_unrelated_reads_have_no_hits() {
        let mut rng = StdRng::seed_from_u64(13);
        let a = random_seq(&mut rng, 1500);
        let b = random_seq(&mut rng, 1500);

        let mut scratch = OverlapScratch::new();
        assert!(map_overlaps(&a, &b, &mut scratch).is_empty());
    }

    #[test]
    fn test_repeat_produces_ambiguous_hits() {
        let mut rng = StdRng::seed_from_u64(17);
        let unit = random_seq(&mut rng, 800);
        let spacer = random_seq(&mut rng, 400);
        let mut target = unit.clone();
        target.extend_from_slice(&spacer);
        target.extend_from_slice(&unit);
        let query = reverse_complement(&unit);

        let mut scratch = OverlapScratch::new();
        let hits = map_overlaps(&target, &query, &mut scratch);
        assert_eq!(hits.len(), 2);
        // Two equally good placements cannot be trusted.
        assert!(hits.iter().all(|hit| hit.reverse && hit.mapq == 0));
    }

    #[test]
    fn test_short_sequences_yield_nothing() {
        let mut scratch = OverlapScratch::new();
        assert!(map_overlaps(b"ACGTACGTACGT", b"ACGTACGTACGT", &mut scratch).is_empty());
    }

    #[test]
    fn test_scratch_reuse_is_stable() {
        let mut rng = StdRng::seed_from_u64(19);
        let template = random_seq(&mut rng, 1600);
        let complement = reverse_complement(&template[200..1400]);

        let mut scratch = OverlapScratch::new();
        let first = map_overlaps(&template, &complement, &mut scratch);
        let second = map_overlaps(&template, &complement, &mut scratch);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }
}
