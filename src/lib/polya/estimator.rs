//! PolyA/polyT tail length estimation from raw signal.
//!
//! Basecallers systematically compress homopolymers, so the tail length is
//! estimated in signal space instead of counting called bases. The estimator
//! first places the sequencing primers to find the strand orientation and a
//! signal-space anchor for the tail, then walks the signal around the anchor
//! in small windows: a polyA/polyT stretch holds the pore current flat, so
//! consecutive low-variance windows with a stable mean are collected into
//! intervals, the interval nearest the anchor is kept, and its sample span is
//! converted back to bases with a per-read samples-per-base estimate.

use std::cmp::Reverse;

use log::{debug, trace};

use crate::align::{edit_align, EditMode, Wildcards};
use crate::dna::{reverse_complement, trailing_base_count};
use crate::read::Read;

/// Strand-switching primer found at the 5' end of a forward cDNA read.
const SSP: &[u8] = b"TTTCTGTTGGTGCTGATATTGCTTT";
/// VN primer bounding the cDNA polyA tail on the 3' side.
const VNP: &[u8] = b"ACTTGCCTGTCGCTCTATCTTCAGAGGAGAGTCCGCCGCCCGCAAGTTTT";

/// Primer search window at each end of the read, in bases.
const PRIMER_WINDOW: usize = 150;
/// Upper bound on a callable tail length, in bases.
const MAX_TAIL_LENGTH: i32 = 750;
/// Reject the primer placement when the better orientation's combined edit
/// distance reaches this value.
const MAX_PRIMER_DIST: u32 = 30;
/// Require more than this much separation between the two orientations.
const MIN_ORIENTATION_GAP: u32 = 10;
/// Stddev ceiling for a signal window to count as part of the tail.
const MAX_WINDOW_STDEV: f32 = 0.35;
/// Step between successive signal windows, in samples.
const WINDOW_STRIDE: usize = 3;

/// Where to look for the tail in signal space, and in which direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SignalAnchor {
    /// Forward reads end their tail at the anchor; reverse reads start there.
    is_fwd_strand: bool,
    /// Sample index the tail search is anchored to.
    signal_anchor: usize,
    /// Tail bases contributed by the primer itself (the VN primer's trailing
    /// `T` run), subtracted from the final estimate.
    trailing_adapter_bases: usize,
}

/// Estimates the polyA/polyT tail length of `read` in bases.
///
/// Returns `None` when the read has no sequence or signal, the primers cannot
/// be placed confidently, the move table cannot anchor the tail in signal
/// space, or no quiet signal interval near the anchor survives filtering.
#[must_use]
pub fn estimate_tail_length(read: &Read, is_rna: bool) -> Option<i32> {
    if read.seq.is_empty() || read.signal.is_empty() {
        return None;
    }
    let anchor = find_signal_anchor(read, is_rna)?;
    let samples_per_base = estimate_samples_per_base(read, is_rna);
    let (start, end) = determine_signal_bounds(
        anchor.signal_anchor,
        anchor.is_fwd_strand,
        &read.signal,
        samples_per_base,
        is_rna,
    );

    let num_bases = ((end - start) as f32 / samples_per_base as f32).round() as i32
        - anchor.trailing_adapter_bases as i32;
    if num_bases > 0 && num_bases < MAX_TAIL_LENGTH {
        debug!(
            "{}: strand {}, tail {} bases, anchor {}, samples {}..{}, samples/base {}",
            read.id,
            if anchor.is_fwd_strand { '+' } else { '-' },
            num_bases,
            anchor.signal_anchor,
            start,
            end,
            samples_per_base
        );
        Some(num_bases)
    } else {
        debug!(
            "{}: tail estimate {} rejected, anchor {}, samples {}..{}, samples/base {}",
            read.id, num_bases, anchor.signal_anchor, start, end, samples_per_base
        );
        None
    }
}

/// Finds the signal-space anchor the tail search starts from.
///
/// RNA adapters are trimmed before basecalling and the tail is read first, so
/// the search simply starts at the front of the signal. cDNA reads anchor on
/// the VN primer, whichever strand it lands on.
fn find_signal_anchor(read: &Read, is_rna: bool) -> Option<SignalAnchor> {
    if is_rna {
        return Some(SignalAnchor {
            is_fwd_strand: false,
            signal_anchor: 0,
            trailing_adapter_bases: 0,
        });
    }
    find_cdna_anchor(read)
}

/// Places SSP/VNP in the end windows to orient the read and anchor the tail.
///
/// A forward read carries SSP at its head and the reverse complement of VNP at
/// its tail; a reverse read the converse. Both orientations are scored and the
/// placement is only trusted when one of them fits clearly better.
fn find_cdna_anchor(read: &Read) -> Option<SignalAnchor> {
    let ssp_rc = reverse_complement(SSP);
    let vnp_rc = reverse_complement(VNP);
    let trailing_ts = trailing_base_count(VNP, b'T');

    let top = &read.seq[..read.seq.len().min(PRIMER_WINDOW)];
    let bottom_start = read.seq.len().saturating_sub(PRIMER_WINDOW);
    let bottom = &read.seq[bottom_start..];
    let wildcards = Wildcards::none();

    let top_v1 = edit_align(SSP, top, EditMode::SemiGlobal, &wildcards);
    let bottom_v1 = edit_align(&vnp_rc, bottom, EditMode::SemiGlobal, &wildcards);
    let dist_v1 = top_v1.distance + bottom_v1.distance;

    let top_v2 = edit_align(VNP, top, EditMode::SemiGlobal, &wildcards);
    let bottom_v2 = edit_align(&ssp_rc, bottom, EditMode::SemiGlobal, &wildcards);
    let dist_v2 = top_v2.distance + bottom_v2.distance;
    trace!("{}: primer distance fwd {dist_v1}, rev {dist_v2}", read.id);

    if dist_v1.min(dist_v2) >= MAX_PRIMER_DIST || dist_v1.abs_diff(dist_v2) <= MIN_ORIENTATION_GAP {
        debug!("{}: primer placement too ambiguous ({})", read.id, dist_v1.min(dist_v2));
        return None;
    }

    let is_fwd_strand = dist_v1 < dist_v2;
    let base_anchor =
        if is_fwd_strand { bottom_start + bottom_v1.start } else { top_v2.end };
    let signal_anchor = read.sample_index_for_base(base_anchor)?;
    Some(SignalAnchor { is_fwd_strand, signal_anchor, trailing_adapter_bases: trailing_ts })
}

/// Estimates how many signal samples one base occupies.
///
/// RNA translocation speed drifts over a read, so long RNA reads measure the
/// last 100 bases through the move table instead of the whole-read average.
/// The result is rounded down in both paths; the raw ratio overestimates.
fn estimate_samples_per_base(read: &Read, is_rna: bool) -> usize {
    let num_bases = read.seq.len();
    if num_bases == 0 {
        return 0;
    }
    if is_rna && num_bases > 250 {
        if let Some(start) = read.sample_index_for_base(num_bases - 100) {
            return read.signal.len().saturating_sub(start) / 100;
        }
    }
    read.signal.len() / num_bases
}

/// Mean and population stddev of one signal window.
fn window_stats(window: &[f32]) -> (f32, f32) {
    let n = window.len() as f32;
    let avg = window.iter().sum::<f32>() / n;
    let var = window.iter().map(|&x| (x - avg) * (x - avg)).sum::<f32>() / n;
    (avg, var.sqrt())
}

/// Walks the signal around `signal_anchor` and returns the sample interval of
/// the tail, or `(0, 0)` when no plausible interval is found.
///
/// Windows whose stddev stays under [`MAX_WINDOW_STDEV`] are collected into
/// intervals: an overlapping window with a stable mean extends the current
/// interval, and when a new interval starts, the previous two are merged if
/// only a short noise burst separated them. Surviving intervals must be at
/// least five bases worth of samples and sit near the anchor on the side the
/// strand orientation predicts; the longest one wins, ties going to the
/// interval whose anchor-side edge is closest.
fn determine_signal_bounds(
    signal_anchor: usize,
    is_fwd_strand: bool,
    signal: &[f32],
    samples_per_base: usize,
    is_rna: bool,
) -> (usize, usize) {
    let spread = samples_per_base * MAX_TAIL_LENGTH as usize;
    let max_sample_gap = samples_per_base * WINDOW_STRIDE;
    let min_merge_size = samples_per_base * 10;
    let min_avg: f32 = if is_rna { 0.0 } else { -3.0 };

    // RNA tails start at the very front of the signal; searching backward
    // from the anchor is only meaningful for cDNA.
    let left_end = if is_rna {
        signal_anchor.saturating_sub(50)
    } else {
        signal_anchor.saturating_sub(spread)
    };
    let right_end = signal.len().min(signal_anchor + spread);

    let mut intervals: Vec<(usize, usize)> = Vec::new();
    let mut last_stats = (0.0f32, 0.0f32);
    let mut s = left_end;
    while s < right_end {
        let e = right_end.min(s + max_sample_gap);
        let (avg, stdev) = window_stats(&signal[s..e]);
        if stdev < MAX_WINDOW_STDEV {
            let extends = intervals.len() > 1 && {
                let last = intervals[intervals.len() - 1];
                last.1 >= s && (avg - last_stats.0).abs() < 0.2 && avg > min_avg
            };
            if extends {
                let idx = intervals.len() - 1;
                intervals[idx].1 = e;
            } else {
                // A short noise burst can split one tail into two long
                // intervals; stitch the previous two back together before
                // opening a new one.
                if intervals.len() > 2 {
                    let last = intervals[intervals.len() - 1];
                    let prev = intervals[intervals.len() - 2];
                    if (last.0 as i64) - (prev.1 as i64) < max_sample_gap as i64
                        && last.1 - last.0 > min_merge_size
                        && prev.1 - prev.0 > min_merge_size
                    {
                        intervals.pop();
                        let idx = intervals.len() - 1;
                        intervals[idx].1 = last.1;
                    }
                }
                intervals.push((s, e));
            }
            last_stats = (avg, stdev);
        }
        s += WINDOW_STRIDE;
    }
    trace!("anchor {signal_anchor}: quiet intervals {intervals:?}");

    let min_size = samples_per_base * 5;
    let filtered: Vec<(usize, usize)> = intervals
        .into_iter()
        .filter(|iv| {
            let size = iv.1 - iv.0;
            let edge = if is_fwd_strand { iv.1 } else { iv.0 };
            size >= min_size
                && (signal_anchor.abs_diff(edge) < size
                    || (iv.0 <= signal_anchor && signal_anchor <= iv.1))
        })
        .collect();

    match filtered.iter().copied().max_by_key(|iv| {
        let edge = if is_fwd_strand { iv.1 } else { iv.0 };
        (iv.1 - iv.0, Reverse(signal_anchor.abs_diff(edge)))
    }) {
        Some(best) => {
            trace!("anchor {signal_anchor}: tail interval {best:?} of {filtered:?}");
            best
        }
        None => {
            debug!("anchor {signal_anchor}: no quiet interval near the anchor");
            (0, 0)
        }
    }
}
