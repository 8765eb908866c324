//! Core data model for basecalled nanopore reads.
//!
//! A [`Read`] bundles the inferred base sequence with the raw signal it was
//! called from, the move table linking the two, modified-base probabilities,
//! and the acquisition metadata (channel, mux, run, timestamps) that the
//! pairing and demultiplexing stages key on. Reads are owned exclusively by
//! the pipeline stage currently holding them; ownership transfers on queue
//! push and is never shared mutably across threads.
//!
//! The remaining types are the derived shapes that flow between stages:
//! [`Chunk`] (overlapping basecall chunks before stitching), [`ReadPair`]
//! (template/complement candidates for duplex calling) and [`DuplexRead`]
//! (the stereo-encoded product).

use crate::errors::{LampreyError, Result};

/// Modified-base probabilities attached to a read.
///
/// Probabilities are stored flat, one byte per sequence base per modification
/// channel, laid out base-major: the probabilities for base `i` occupy
/// `probs[i * channels .. (i + 1) * channels]`. Trimming a read must slice
/// this array in lockstep with the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModBaseInfo {
    /// Modification channel names in storage order (e.g. `["5mC", "6mA"]`).
    pub alphabet: Vec<String>,
    /// Flat probability matrix, `seq_len * alphabet.len()` bytes.
    pub probs: Vec<u8>,
}

impl ModBaseInfo {
    /// Number of modification channels per base.
    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.alphabet.len()
    }
}

/// A basecalled nanopore read plus the signal and metadata it was called from.
///
/// # Fields
///
/// The move table `moves` has one entry per signal block of `model_stride`
/// samples; a `1` marks the block where a new base starts, so
/// `moves.iter().filter(|&&m| m == 1).count() == seq.len()` whenever both are
/// populated. `num_trimmed_samples` accumulates the signal samples removed
/// from the front of the read by trimming, used to keep downstream
/// signal-space anchors honest.
#[derive(Debug, Clone, Default)]
pub struct Read {
    /// Read id (UUID assigned by the basecaller).
    pub id: String,
    /// Basecalled sequence.
    pub seq: Vec<u8>,
    /// Per-base quality string (ASCII phred+33).
    pub qstring: Vec<u8>,
    /// Calibrated signal samples.
    pub signal: Vec<f32>,
    /// Move table: one flag per `model_stride` signal samples.
    pub moves: Vec<u8>,
    /// Signal samples per move-table entry.
    pub model_stride: usize,
    /// Modified-base probabilities, if the model emitted them.
    pub mod_base_info: Option<ModBaseInfo>,
    /// Flow cell channel the read was acquired on.
    pub channel: u32,
    /// Mux within the channel.
    pub mux: u8,
    /// Acquisition run id.
    pub run_id: String,
    /// Flow cell id.
    pub flowcell_id: String,
    /// Id of the acquisition client that produced the read.
    pub client_id: u32,
    /// Acquisition start time in milliseconds.
    pub start_time_ms: u64,
    /// Acquisition duration in milliseconds.
    pub duration_ms: u64,
    /// Signal samples trimmed from the front so far.
    pub num_trimmed_samples: u64,
    /// Whether the read is RNA (affects polyA search direction and adapters).
    pub is_rna: bool,
    /// Barcode classification, set by the demux node.
    pub barcode: Option<String>,
    /// Estimated polyA/polyT tail length in bases, set by the polyA node.
    pub polya_tail_length: Option<i32>,
}

impl Read {
    /// Creates a read with the given id, sequence and quality string.
    ///
    /// All other fields start at their defaults; callers fill in signal and
    /// metadata as they have it.
    #[must_use]
    pub fn new(id: impl Into<String>, seq: Vec<u8>, qstring: Vec<u8>) -> Self {
        Self { id: id.into(), seq, qstring, ..Self::default() }
    }

    /// Sequence length in bases.
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.seq.len()
    }

    /// Acquisition end time in milliseconds.
    #[must_use]
    pub fn end_time_ms(&self) -> u64 {
        self.start_time_ms + self.duration_ms
    }

    /// Number of bases recorded in the move table.
    #[must_use]
    pub fn move_base_count(&self) -> usize {
        self.moves.iter().filter(|&&m| m == 1).count()
    }

    /// Signal sample index where base `base` starts, from the move table.
    ///
    /// Returns `None` when the move table is empty or records fewer than
    /// `base + 1` bases.
    #[must_use]
    pub fn sample_index_for_base(&self, base: usize) -> Option<usize> {
        let mut seen = 0usize;
        for (i, &m) in self.moves.iter().enumerate() {
            if m == 1 {
                if seen == base {
                    return Some(i * self.model_stride);
                }
                seen += 1;
            }
        }
        None
    }

    /// Checks the mutual consistency of the read's arrays.
    ///
    /// # Errors
    ///
    /// Returns [`LampreyError::InconsistentRead`] when the quality string and
    /// sequence lengths differ, the move table records a different base count
    /// than the sequence, or the modified-base probabilities do not cover the
    /// sequence at the declared channel count.
    pub fn validate(&self) -> Result<()> {
        if self.qstring.len() != self.seq.len() {
            return Err(LampreyError::InconsistentRead {
                read_id: self.id.clone(),
                reason: format!(
                    "qstring length {} != seq length {}",
                    self.qstring.len(),
                    self.seq.len()
                ),
            });
        }
        if !self.moves.is_empty() {
            let bases = self.move_base_count();
            if bases != self.seq.len() {
                return Err(LampreyError::InconsistentRead {
                    read_id: self.id.clone(),
                    reason: format!(
                        "move table records {bases} bases but seq length is {}",
                        self.seq.len()
                    ),
                });
            }
        }
        if let Some(info) = &self.mod_base_info {
            let expected = self.seq.len() * info.num_channels();
            if info.probs.len() != expected {
                return Err(LampreyError::InconsistentRead {
                    read_id: self.id.clone(),
                    reason: format!(
                        "modbase probs length {} != seq length {} x {} channels",
                        info.probs.len(),
                        self.seq.len(),
                        info.num_channels()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// One chunk of a chunked basecall, prior to stitching.
///
/// Chunks overlap in signal space; `input_offset` is the chunk's start sample
/// in the raw signal and `raw_chunk_size` the number of samples it covers.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// Start sample of this chunk in the raw signal.
    pub input_offset: usize,
    /// Number of raw signal samples in the chunk.
    pub raw_chunk_size: usize,
    /// Bases called from this chunk.
    pub seq: Vec<u8>,
    /// Qualities called from this chunk.
    pub qstring: Vec<u8>,
    /// Move table for this chunk (one entry per model-stride block).
    pub moves: Vec<u8>,
}

impl Chunk {
    /// Creates a chunk covering `raw_chunk_size` samples at `input_offset`.
    #[must_use]
    pub fn new(
        input_offset: usize,
        raw_chunk_size: usize,
        seq: Vec<u8>,
        qstring: Vec<u8>,
        moves: Vec<u8>,
    ) -> Self {
        Self { input_offset, raw_chunk_size, seq, qstring, moves }
    }
}

/// Overlap coordinates for a template/complement pair, in base space.
///
/// Ends are inclusive. Template coordinates come from the target side of the
/// overlap alignment, complement coordinates from the query side; the fully
/// overlapping case (early acceptance) covers both reads end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairOverlap {
    /// First overlapping base on the template.
    pub template_start: usize,
    /// Last overlapping base on the template (inclusive).
    pub template_end: usize,
    /// First overlapping base on the complement.
    pub complement_start: usize,
    /// Last overlapping base on the complement (inclusive).
    pub complement_end: usize,
}

impl PairOverlap {
    /// Overlap covering both reads end to end, as produced by early
    /// acceptance of near-identical pairs.
    #[must_use]
    pub fn full(template_len: usize, complement_len: usize) -> Self {
        Self {
            template_start: 0,
            template_end: template_len.saturating_sub(1),
            complement_start: 0,
            complement_end: complement_len.saturating_sub(1),
        }
    }
}

/// A candidate duplex pair: template and complement reads plus their overlap.
#[derive(Debug, Clone)]
pub struct ReadPair {
    /// The template-strand read (acquired first).
    pub template: Read,
    /// The complement-strand read (acquired second).
    pub complement: Read,
    /// Overlap coordinates in base space.
    pub overlap: PairOverlap,
}

/// A stereo-encoded duplex read produced from a [`ReadPair`].
///
/// Carries the merged basecall over the overlap region and the concatenated
/// duplex signal (template overlap samples followed by the complement overlap
/// samples flipped into template time). Its id is
/// `<template_id>;<complement_id>`.
#[derive(Debug, Clone)]
pub struct DuplexRead {
    /// Merged basecall over the overlap.
    pub seq: Vec<u8>,
    /// Merged qualities over the overlap.
    pub qstring: Vec<u8>,
    /// Move table mapping merged bases to duplex signal positions.
    pub moves: Vec<u8>,
    /// Stride of the move table, inherited from the simplex call.
    pub model_stride: usize,
    /// Duplex signal: template overlap slice then flipped complement slice.
    pub signal: Vec<f32>,
    /// Ids of the reads the duplex read was built from (template, complement).
    pub duplex_parent_ids: (String, String),
}

impl DuplexRead {
    /// The duplex read's id, `<template_id>;<complement_id>`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{};{}", self.duplex_parent_ids.0, self.duplex_parent_ids.1)
    }

    /// Converts the duplex read into a plain [`Read`] for downstream nodes.
    ///
    /// Acquisition metadata is not meaningful for a synthetic read and is
    /// left at defaults apart from the id.
    #[must_use]
    pub fn into_read(self) -> Read {
        Read {
            id: self.id(),
            seq: self.seq,
            qstring: self.qstring,
            signal: self.signal,
            moves: self.moves,
            model_stride: self.model_stride,
            ..Read::default()
        }
    }
}
