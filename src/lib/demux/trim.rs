//! Trimming barcodes and adapters off reads and BAM records.
//!
//! Classification produces positions; this module turns them into a retained
//! interval `[start, end)` and rewrites the read (or BAM record) so every
//! derived array stays consistent: qualities and modified-base probabilities
//! are sliced with the sequence, the move table is re-sliced in signal
//! blocks, and the trimmed-samples accounting (`num_trimmed_samples` /
//! `ts` tag) absorbs the dropped signal blocks.

use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::{Value, value::Array};
use noodles::sam::alignment::record_buf::{QualityScores, RecordBuf, Sequence};

use crate::bam::{self, TAG_MODBASE_PROBS, TAG_MODBASE_STRING, TAG_TRIMMED_SAMPLES};
use crate::demux::adapter::AdapterScoreResult;
use crate::demux::classifier::{BarcodeScoreResult, UNCLASSIFIED};
use crate::errors::Result;
use crate::read::Read;

/// Flank confidence required before a barcode position is trusted for
/// trimming.
const FLANK_SCORE_THRESHOLD: f32 = 0.6;
/// Adapter score required before an adapter position is trusted for trimming.
const ADAPTER_SCORE_THRESHOLD: f32 = 0.7;

/// Computes the retained interval `[start, end)` after barcode trimming.
///
/// Positions are only trusted when the corresponding flank was found
/// confidently. When the front and rear windows of a very short read overlap
/// and invert the interval, the span of whichever window won classification
/// is retained instead; any other inverted interval keeps the whole read.
#[must_use]
pub fn barcode_trim_interval(
    double_ends: bool,
    res: &BarcodeScoreResult,
    seqlen: usize,
) -> (usize, usize) {
    let whole = (0, seqlen);
    if res.is_unclassified() {
        return whole;
    }

    let len = seqlen as i64;
    let clamp = |span: (i64, i64)| (span.0.clamp(0, len) as usize, span.1.clamp(0, len) as usize);

    let mut start = 0i64;
    let mut end = len;
    if double_ends {
        if res.top_flank_score > FLANK_SCORE_THRESHOLD {
            start = res.top_barcode_pos.1 + 1;
        }
        if res.bottom_flank_score > FLANK_SCORE_THRESHOLD {
            end = res.bottom_barcode_pos.0;
        }
        if end <= start {
            let span = if res.use_top {
                (res.top_barcode_pos.0, res.top_barcode_pos.1 + 1)
            } else {
                (res.bottom_barcode_pos.0, res.bottom_barcode_pos.1 + 1)
            };
            return clamp(span);
        }
    } else if res.top_flank_score > FLANK_SCORE_THRESHOLD {
        start = res.top_barcode_pos.1 + 1;
    }

    if end <= start {
        return whole;
    }
    clamp((start, end))
}

/// Computes the retained interval `[start, end)` after adapter trimming.
#[must_use]
pub fn adapter_trim_interval(res: &AdapterScoreResult, seqlen: usize) -> (usize, usize) {
    let whole = (0, seqlen);
    let len = seqlen as i64;

    let mut start = 0i64;
    let mut end = len;
    if res.front.name != UNCLASSIFIED && res.front.score >= ADAPTER_SCORE_THRESHOLD {
        start = res.front.position.1 + 1;
    }
    if res.rear.name != UNCLASSIFIED && res.rear.score >= ADAPTER_SCORE_THRESHOLD {
        end = res.rear.position.0;
    }

    if end <= start {
        return whole;
    }
    (start.clamp(0, len) as usize, end.clamp(0, len) as usize)
}

/// Re-slices a move table to the bases in `[start, end)`.
///
/// Returns the number of leading move entries dropped (each worth one model
/// stride of signal) and the trimmed table.
#[must_use]
pub fn trim_move_table(moves: &[u8], interval: (usize, usize)) -> (usize, Vec<u8>) {
    let start = interval.0 as i64;
    let end = interval.1 as i64;
    let mut bases_seen: i64 = -1;
    let mut positions_trimmed = 0usize;
    let mut trimmed = Vec::with_capacity(moves.len());
    for &m in moves {
        if m == 1 {
            bases_seen += 1;
        }
        if bases_seen < start {
            positions_trimmed += 1;
            continue;
        }
        if bases_seen >= end {
            break;
        }
        trimmed.push(m);
    }
    (positions_trimmed, trimmed)
}

/// Trims a read in place to the retained interval.
///
/// No-op when the interval covers the whole sequence. The raw signal is left
/// untouched; `num_trimmed_samples` accounts for the dropped leading blocks
/// so signal-space anchors stay valid.
pub fn trim_read(read: &mut Read, interval: (usize, usize)) {
    let (start, end) = interval;
    if end - start == read.seq.len() {
        return;
    }

    read.seq = read.seq[start..end].to_vec();
    read.qstring = read.qstring[start..end].to_vec();
    if !read.moves.is_empty() {
        let (positions_trimmed, trimmed) = trim_move_table(&read.moves, interval);
        read.moves = trimmed;
        read.num_trimmed_samples += (read.model_stride * positions_trimmed) as u64;
    }
    if let Some(info) = &mut read.mod_base_info {
        let channels = info.num_channels();
        info.probs = info.probs[start * channels..end * channels].to_vec();
    }
}

/// Trims a BAM record in place to the retained interval.
///
/// Rewrites the sequence and qualities, re-slices the `mv` move table,
/// advances the `ts` trimmed-samples tag, and rewrites the `MM`/`ML`
/// modified-base tags against the trimmed sequence. Alignment fields are
/// left alone; reads entering this pipeline are unmapped.
///
/// # Errors
///
/// Returns an error when the record's move table is malformed.
pub fn trim_record(record: &mut RecordBuf, interval: (usize, usize)) -> Result<()> {
    let (start, end) = interval;
    let seq: Vec<u8> = record.sequence().as_ref().to_vec();
    if end - start == seq.len() {
        return Ok(());
    }
    let quals: Vec<u8> = record.quality_scores().as_ref().to_vec();

    if let Some((stride, moves)) = bam::moves_from_record(record)? {
        let (positions_trimmed, trimmed) = trim_move_table(&moves, interval);
        bam::set_moves(record, stride, &trimmed);
        let ts = bam::aux_i64(record, TAG_TRIMMED_SAMPLES).unwrap_or(0)
            + (positions_trimmed * stride) as i64;
        record.data_mut().insert(
            Tag::from(TAG_TRIMMED_SAMPLES),
            Value::from(i32::try_from(ts).unwrap_or(i32::MAX)),
        );
    }

    if let Some(mm) = bam::aux_string(record, TAG_MODBASE_STRING) {
        let ml = match record.data().get(&TAG_MODBASE_PROBS) {
            Some(Value::Array(Array::UInt8(values))) => values.clone(),
            _ => Vec::new(),
        };
        let (new_mm, new_ml) = trim_modbase_info(&seq, &mm, &ml, interval);
        record.data_mut().insert(Tag::from(TAG_MODBASE_STRING), Value::from(new_mm));
        record
            .data_mut()
            .insert(Tag::from(TAG_MODBASE_PROBS), Value::Array(Array::UInt8(new_ml)));
    }

    *record.sequence_mut() = Sequence::from(seq[start..end].to_vec());
    *record.quality_scores_mut() = QualityScores::from(quals[start..end].to_vec());
    Ok(())
}

/// Rewrites an `MM` modified-base string (and its `ML` probabilities) for a
/// trimmed sequence.
///
/// Each `MM` block counts skipped canonical bases between modified ones;
/// trimming drops entries outside the interval and rebases the first kept
/// delta onto the trimmed sequence. Blocks left without entries are dropped
/// together with their probabilities.
fn trim_modbase_info(
    seq: &[u8],
    mm: &str,
    ml: &[u8],
    interval: (usize, usize),
) -> (String, Vec<u8>) {
    let (start, end) = interval;
    let mut out_mm = String::new();
    let mut out_ml: Vec<u8> = Vec::new();
    let mut ml_cursor = 0usize;

    for block in mm.split(';').filter(|b| !b.is_empty()) {
        let mut fields = block.split(',');
        let header = fields.next().unwrap_or_default();
        let deltas: Vec<usize> = fields.filter_map(|f| f.parse().ok()).collect();

        let canonical = header.as_bytes().first().copied().unwrap_or(b'N');
        // "C+hm?" carries one probability per mod code per position; a
        // numeric ChEBI code counts as a single modification.
        let codes = header.get(2..).unwrap_or("").trim_end_matches(['.', '?']);
        let mods_per_pos =
            if codes.chars().all(|c| c.is_ascii_digit()) { 1 } else { codes.len().max(1) };

        let occurrences: Vec<usize> = seq
            .iter()
            .enumerate()
            .filter(|&(_, &b)| canonical == b'N' || b == canonical)
            .map(|(i, _)| i)
            .collect();
        let before_start = occurrences.iter().take_while(|&&pos| pos < start).count() as i64;

        let mut kept_deltas: Vec<usize> = Vec::new();
        let mut kept_ml: Vec<u8> = Vec::new();
        let mut occ_idx: i64 = -1;
        let mut prev_kept: i64 = -1;
        for delta in deltas {
            occ_idx += delta as i64 + 1;
            let ml_at = ml_cursor;
            ml_cursor += mods_per_pos;
            let Some(&pos) = occurrences.get(occ_idx as usize) else {
                continue;
            };
            if pos < start || pos >= end {
                continue;
            }
            let occ_in_trim = occ_idx - before_start;
            kept_deltas.push((occ_in_trim - prev_kept - 1) as usize);
            prev_kept = occ_in_trim;
            if let Some(values) = ml.get(ml_at..ml_at + mods_per_pos) {
                kept_ml.extend_from_slice(values);
            }
        }

        if !kept_deltas.is_empty() {
            out_mm.push_str(header);
            for delta in &kept_deltas {
                out_mm.push(',');
                out_mm.push_str(&delta.to_string());
            }
            out_mm.push(';');
            out_ml.extend_from_slice(&kept_ml);
        }
    }
    (out_mm, out_ml)
}
