//! Pair acceptance rules: time and length gates plus overlap alignment.
//!
//! The cheap gates run first. A complement strand follows its template
//! through the pore almost immediately, so a wide or negative time gap rules
//! a pair out before any sequence work, and near-identical lengths right
//! after a small gap rule it in. Only the undecided middle ground pays for
//! an overlap alignment.

use log::trace;

use crate::align::{map_overlaps, OverlapScratch};
use crate::read::{PairOverlap, Read};

/// Gap between template end and complement start must stay under this.
const MAX_TIME_DELTA_MS: i64 = 1000;
/// Shorter-to-longer length ratio at or below this never pairs.
const MIN_SEQ_LEN_RATIO: f32 = 0.2;
/// Gaps at or under this qualify for early acceptance.
const EARLY_ACCEPT_TIME_DELTA_MS: i64 = 100;
/// Length ratio at or above this qualifies for early acceptance.
const EARLY_ACCEPT_SEQ_LEN_RATIO: f32 = 0.98;
/// Minimum mapping quality of the single overlap hit.
const MIN_MAPQ: u8 = 50;
/// The hit must cover at least this fraction of the better-covered read.
const MIN_OVERLAP_FRACTION: f32 = 0.8;
/// The complement must start aligning within this fraction of its 5' end.
const MAX_COMPLEMENT_START_FRACTION: f32 = 0.02;
/// The template must stay aligned beyond this fraction of its 3' end.
const MIN_TEMPLATE_END_FRACTION: f32 = 0.98;

/// Ratio of the shorter to the longer of two lengths.
fn length_ratio(a: usize, b: usize) -> f32 {
    a.min(b) as f32 / a.max(b) as f32
}

/// Tests whether `temp` and `comp` look like the two strands of one duplex
/// molecule. Returns the overlap coordinates when the pair is accepted.
pub fn check_pair(temp: &Read, comp: &Read, scratch: &mut OverlapScratch) -> Option<PairOverlap> {
    let delta = comp.start_time_ms as i64 - temp.end_time_ms() as i64;
    let ratio = length_ratio(temp.seq.len(), comp.seq.len());
    if delta < 0 || delta >= MAX_TIME_DELTA_MS || ratio <= MIN_SEQ_LEN_RATIO {
        return None;
    }
    if delta <= EARLY_ACCEPT_TIME_DELTA_MS && ratio >= EARLY_ACCEPT_SEQ_LEN_RATIO {
        trace!("{} + {}: early accept, gap {delta} ms, ratio {ratio:.3}", temp.id, comp.id);
        return Some(PairOverlap::full(temp.seq.len(), comp.seq.len()));
    }
    align_overlap(temp, comp, scratch)
}

/// Overlap for a pair named by an explicit id map. The time gates do not
/// apply: near-identical lengths take the full-length overlap, anything
/// else goes through alignment.
pub fn mapped_pair_overlap(
    temp: &Read,
    comp: &Read,
    scratch: &mut OverlapScratch,
) -> Option<PairOverlap> {
    if length_ratio(temp.seq.len(), comp.seq.len()) >= EARLY_ACCEPT_SEQ_LEN_RATIO {
        return Some(PairOverlap::full(temp.seq.len(), comp.seq.len()));
    }
    align_overlap(temp, comp, scratch)
}

/// Maps `comp` against `temp` and applies the hit-quality gates. Exactly one
/// hit is required: several chains mean the placement is ambiguous, and
/// ambiguity counts as no match.
fn align_overlap(temp: &Read, comp: &Read, scratch: &mut OverlapScratch) -> Option<PairOverlap> {
    let hits = map_overlaps(&temp.seq, &comp.seq, scratch);
    if hits.len() != 1 {
        return None;
    }
    let hit = hits[0];
    let temp_len = temp.seq.len() as f32;
    let comp_len = comp.seq.len() as f32;
    let overlap_frac = ((hit.target_end - hit.target_start + 1) as f32 / temp_len)
        .max((hit.query_end - hit.query_start + 1) as f32 / comp_len);
    let ends_anchored = (hit.query_start as f32) < comp_len * MAX_COMPLEMENT_START_FRACTION
        && ((hit.target_end + 1) as f32) > temp_len * MIN_TEMPLATE_END_FRACTION;
    if hit.reverse && hit.mapq >= MIN_MAPQ && overlap_frac >= MIN_OVERLAP_FRACTION && ends_anchored
    {
        Some(PairOverlap {
            template_start: hit.target_start,
            template_end: hit.target_end,
            complement_start: hit.query_start,
            complement_end: hit.query_end,
        })
    } else {
        trace!(
            "{} + {}: overlap rejected, reverse {}, mapq {}, covered {overlap_frac:.3}",
            temp.id,
            comp.id,
            hit.reverse,
            hit.mapq
        );
        None
    }
}
