//! Node counter snapshots and per-command summary metrics.
//!
//! Every pipeline node reports a [`NodeStats`] snapshot on demand: its name
//! plus an ordered list of named counters. Commands aggregate these into the
//! log summary and into per-command metric rows written as TSV through
//! `fgoxide`'s `DelimFile`.

use anyhow::{Context, Result};
use fgoxide::io::DelimFile;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A serializable metrics row with a stable name for error messages.
pub trait Metric: Serialize {
    /// Human-readable name used in logs and error messages.
    fn metric_name() -> &'static str;
}

/// Snapshot of one node's counters.
#[derive(Debug, Clone, Default)]
pub struct NodeStats {
    /// The node's name.
    pub name: String,
    /// Named counters in reporting order.
    pub counters: Vec<(String, u64)>,
}

impl NodeStats {
    /// Creates an empty snapshot for the named node.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), counters: Vec::new() }
    }

    /// Appends a named counter.
    #[must_use]
    pub fn counter(mut self, label: impl Into<String>, value: u64) -> Self {
        self.counters.push((label.into(), value));
        self
    }

    /// Looks up a counter by label.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<u64> {
        self.counters.iter().find(|(l, _)| l == label).map(|&(_, v)| v)
    }
}

/// Writes metric rows to a TSV file with consistent error handling.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_metrics<P: AsRef<Path>, T: Metric>(path: P, metrics: &[T]) -> Result<()> {
    let path_ref = path.as_ref();
    DelimFile::default().write_tsv(&path_ref, metrics).with_context(|| {
        format!("Failed to write {} metrics: {}", T::metric_name(), path_ref.display())
    })
}

/// Summary metrics for the `demux` command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemuxMetrics {
    /// Reads examined.
    pub reads: u64,
    /// Reads assigned a barcode.
    pub classified: u64,
    /// Reads left unclassified.
    pub unclassified: u64,
    /// Reads whose arrays were trimmed.
    pub trimmed: u64,
}

impl Metric for DemuxMetrics {
    fn metric_name() -> &'static str {
        "demux"
    }
}

/// Summary metrics for the `polya` command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolyAMetrics {
    /// Reads with an accepted tail-length estimate.
    pub reads_estimated: u64,
    /// Reads where no estimate passed the filters.
    pub reads_not_estimated: u64,
    /// Mean tail length over estimated reads.
    pub average_tail_length: f64,
}

impl Metric for PolyAMetrics {
    fn metric_name() -> &'static str {
        "polya"
    }
}

/// Summary metrics for the `pair` command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairingMetrics {
    /// Reads examined for pairing.
    pub reads: u64,
    /// Template/complement pairs emitted.
    pub pairs: u64,
    /// Reads flushed downstream unpaired.
    pub unpaired: u64,
}

impl Metric for PairingMetrics {
    fn metric_name() -> &'static str {
        "pairing"
    }
}

/// Summary metrics for the `duplex` command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplexMetrics {
    /// Simplex reads examined.
    pub reads: u64,
    /// Pairs found by the pairing stage.
    pub pairs: u64,
    /// Stereo-encoded duplex reads produced.
    pub duplex_reads: u64,
}

impl Metric for DuplexMetrics {
    fn metric_name() -> &'static str {
        "duplex"
    }
}
