//! Stitching of overlapping called chunks into one basecall.

use crate::errors::{LampreyError, Result};
use crate::read::Chunk;

/// Joins overlapping called chunks into one sequence, quality string and
/// move table.
///
/// At each junction the cut sits at `next.input_offset + ceil(overlap / 2)`
/// samples: the current chunk keeps move entries strictly below the cut and
/// the next chunk takes over from there. Sequence and qualities follow the
/// kept move counts on each side.
///
/// # Errors
///
/// Returns [`LampreyError::InvalidPipeline`] when there are no chunks, when
/// neighboring chunks do not overlap, when an overlap is not a whole number
/// of move entries, or when a chunk's arrays disagree with its move table.
pub fn stitch_chunks(chunks: &[Chunk]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let Some(first) = chunks.first() else {
        return Err(LampreyError::InvalidPipeline { reason: "no chunks to stitch".to_string() });
    };
    if first.moves.is_empty() {
        return Err(LampreyError::InvalidPipeline {
            reason: "first chunk has an empty move table".to_string(),
        });
    }
    let stride = first.raw_chunk_size / first.moves.len();
    if stride == 0 {
        return Err(LampreyError::InvalidPipeline {
            reason: format!(
                "chunk of {} samples cannot hold {} move entries",
                first.raw_chunk_size,
                first.moves.len()
            ),
        });
    }

    let mut seq = Vec::new();
    let mut qstring = Vec::new();
    let mut moves = Vec::new();

    // Move entries trimmed off the front of the current chunk, decided at
    // the previous junction.
    let mut start_entry = 0usize;
    for (i, chunk) in chunks.iter().enumerate() {
        let overlap_entries = match chunks.get(i + 1) {
            Some(next) => {
                let chunk_end = chunk.input_offset + chunk.raw_chunk_size;
                if next.input_offset > chunk_end {
                    return Err(LampreyError::InvalidPipeline {
                        reason: format!("chunks {i} and {} do not overlap", i + 1),
                    });
                }
                let overlap = chunk_end - next.input_offset;
                if overlap % stride != 0 {
                    return Err(LampreyError::InvalidPipeline {
                        reason: format!(
                            "overlap of {overlap} samples between chunks {i} and {} is not a \
                             multiple of stride {stride}",
                            i + 1
                        ),
                    });
                }
                overlap / stride
            }
            None => 0,
        };
        let rear_trim = overlap_entries / 2;
        let end_entry = chunk.moves.len().checked_sub(rear_trim).filter(|&e| e >= start_entry);
        let Some(end_entry) = end_entry else {
            return Err(LampreyError::InvalidPipeline {
                reason: format!("chunk {i} is swallowed whole by its neighbors"),
            });
        };

        let bases_before: usize =
            chunk.moves[..start_entry].iter().map(|&m| usize::from(m)).sum();
        let bases_kept: usize =
            chunk.moves[start_entry..end_entry].iter().map(|&m| usize::from(m)).sum();
        let base_end = bases_before + bases_kept;
        if base_end > chunk.seq.len() || base_end > chunk.qstring.len() {
            return Err(LampreyError::InvalidPipeline {
                reason: format!(
                    "chunk {i} move table records more bases than its sequence holds"
                ),
            });
        }
        seq.extend_from_slice(&chunk.seq[bases_before..base_end]);
        qstring.extend_from_slice(&chunk.qstring[bases_before..base_end]);
        moves.extend_from_slice(&chunk.moves[start_entry..end_entry]);

        // The next chunk picks up the ceil half of the shared entries.
        start_entry = overlap_entries - rear_trim;
    }

    Ok((seq, qstring, moves))
}
