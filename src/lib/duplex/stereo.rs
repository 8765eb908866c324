//! Stereo encoding of an accepted template/complement pair.
//!
//! Both reads are cut down to their overlap, the complement slice is flipped
//! into template time (reverse-complemented bases, reversed qualities and
//! signal), and a global edit alignment of the two base strings drives a
//! merge walk: agreements keep the base and sum the qualities, disagreements
//! keep the higher-quality base scored by the difference, and indels take the
//! strand that has the base. The duplex signal is the template overlap slice
//! followed by the flipped complement slice, and the merged move table
//! anchors every merged base to the start sample of its source base within
//! that signal.

use crate::align::{edit_align, EditMode, EditOp, Wildcards};
use crate::dna::reverse_complement;
use crate::read::{DuplexRead, ReadPair};

/// Offset of the printable phred encoding.
const QUAL_OFFSET: u8 = b'!';
/// Cap applied to summed agreement qualities.
const MAX_MERGED_QUAL: u16 = 50;

/// Start sample of every base recorded in a move table.
fn base_start_samples(moves: &[u8], stride: usize) -> Vec<usize> {
    moves
        .iter()
        .enumerate()
        .filter(|&(_, &m)| m == 1)
        .map(|(i, _)| i * stride)
        .collect()
}

/// Signal range `[start, end)` covering bases `first..=last`.
///
/// The end is rounded down to a whole number of strides past `start`, so the
/// slice maps exactly onto move entries and the two strand slices cannot
/// share one.
fn strand_signal_range(
    starts: &[usize],
    first: usize,
    last: usize,
    signal_len: usize,
    stride: usize,
) -> Option<(usize, usize)> {
    if first > last || last >= starts.len() {
        return None;
    }
    let start = starts[first];
    let raw_end = starts.get(last + 1).copied().unwrap_or(signal_len).min(signal_len);
    let end = start + (raw_end.saturating_sub(start) / stride) * stride;
    if end <= starts[last] {
        return None;
    }
    Some((start, end))
}

/// Encodes an accepted pair into a duplex read.
///
/// Returns `None` when the pair cannot be encoded: zero or mismatched
/// strides, move tables inconsistent with the sequences, missing signal, or
/// overlap coordinates that fall outside either read. Callers treat that as
/// a soft failure and keep the simplex reads.
#[must_use]
pub fn stereo_encode(pair: &ReadPair) -> Option<DuplexRead> {
    let template = &pair.template;
    let complement = &pair.complement;
    let stride = template.model_stride;
    if stride == 0 || complement.model_stride != stride {
        return None;
    }
    let t_starts = base_start_samples(&template.moves, stride);
    let c_starts = base_start_samples(&complement.moves, stride);
    if t_starts.len() != template.seq.len()
        || c_starts.len() != complement.seq.len()
        || template.qstring.len() != template.seq.len()
        || complement.qstring.len() != complement.seq.len()
    {
        return None;
    }

    let (ts, te) = (pair.overlap.template_start, pair.overlap.template_end);
    let (cs, ce) = (pair.overlap.complement_start, pair.overlap.complement_end);
    let (t_sig_start, t_sig_end) =
        strand_signal_range(&t_starts, ts, te, template.signal.len(), stride)?;
    let (c_sig_start, c_sig_end) =
        strand_signal_range(&c_starts, cs, ce, complement.signal.len(), stride)?;

    // Template slice reads as called; the complement slice is flipped into
    // template time.
    let t_seq = &template.seq[ts..=te];
    let t_qual = &template.qstring[ts..=te];
    let c_seq = reverse_complement(&complement.seq[cs..=ce]);
    let mut c_qual = complement.qstring[cs..=ce].to_vec();
    c_qual.reverse();

    let t_samples = t_sig_end - t_sig_start;
    let c_samples = c_sig_end - c_sig_start;
    let mut signal = Vec::with_capacity(t_samples + c_samples);
    signal.extend_from_slice(&template.signal[t_sig_start..t_sig_end]);
    signal.extend(complement.signal[c_sig_start..c_sig_end].iter().rev().copied());

    // Start sample of a slice base within the duplex signal. Template bases
    // sit in the first half; a flipped complement base starts where its
    // source base ended, measured back from the complement slice end and
    // shifted past the template samples.
    let template_anchor = |ti: usize| t_starts[ts + ti] - t_sig_start;
    let complement_anchor = |ci: usize| {
        let base = ce - ci;
        let base_end = if base == ce { c_sig_end } else { c_starts[base + 1] };
        t_samples + (c_sig_end - base_end)
    };

    let alignment = edit_align(t_seq, &c_seq, EditMode::Global, &Wildcards::none());
    let mut seq = Vec::with_capacity(alignment.ops.len());
    let mut qstring = Vec::with_capacity(alignment.ops.len());
    let mut moves = vec![0u8; (t_samples + c_samples) / stride];
    let mut ti = 0usize;
    let mut ci = 0usize;
    for &op in &alignment.ops {
        let (base, qual, anchor) = match op {
            EditOp::Match | EditOp::Mismatch => {
                let qt = t_qual[ti].saturating_sub(QUAL_OFFSET);
                let qc = c_qual[ci].saturating_sub(QUAL_OFFSET);
                let (base, anchor) = if qt >= qc {
                    (t_seq[ti], template_anchor(ti))
                } else {
                    (c_seq[ci], complement_anchor(ci))
                };
                let qual = if op == EditOp::Match {
                    (u16::from(qt) + u16::from(qc)).min(MAX_MERGED_QUAL) as u8
                } else {
                    qt.abs_diff(qc)
                };
                ti += 1;
                ci += 1;
                (base, qual, anchor)
            }
            EditOp::Insert => {
                let step =
                    (t_seq[ti], t_qual[ti].saturating_sub(QUAL_OFFSET), template_anchor(ti));
                ti += 1;
                step
            }
            EditOp::Delete => {
                let step =
                    (c_seq[ci], c_qual[ci].saturating_sub(QUAL_OFFSET), complement_anchor(ci));
                ci += 1;
                step
            }
        };
        seq.push(base);
        qstring.push(QUAL_OFFSET + qual);
        if let Some(slot) = moves.get_mut(anchor / stride) {
            *slot = 1;
        }
    }

    Some(DuplexRead {
        seq,
        qstring,
        moves,
        model_stride: stride,
        signal,
        duplex_parent_ids: (template.id.clone(), complement.id.clone()),
    })
}
