//! Sequencing-adapter detection at read ends.
//!
//! Ligation-kit adapters sit immediately before the first template base and
//! after the last one, so each known adapter's front sequence is searched in
//! a short window at the read start and its rear sequence in a window at the
//! read end. Placement uses the same semi-global edit alignment as barcode
//! flank placement; thresholds are applied at trim time, not here.

use crate::align::{EditMode, Wildcards, edit_align};
use crate::demux::classifier::UNCLASSIFIED;

/// Bases searched at each read end.
const ADAPTER_WINDOW: usize = 75;

/// Known ligation adapters, front and rear sequence per kit generation.
pub(crate) const ADAPTERS: [(&str, &str, &str); 2] = [
    ("LSK109", "AATGTACTTCGTTCAGTTACGTATTGCT", "AGCAATACGTAACTGAACGAAGT"),
    ("LSK110", "CCTGTACTTCGTTCAGTTACGTATTGCT", "AGCAATACGTAACTGAACGAAGTAGGTTG"),
];

/// Best adapter hit at one read end.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleEndResult {
    /// Adapter name suffixed with the end it was found at, or `unclassified`.
    pub name: String,
    /// Normalized score, `1 - dist / adapter_len`.
    pub score: f32,
    /// Hit span in read coordinates, inclusive, (-1, -1) when unclassified.
    pub position: (i64, i64),
}

impl Default for SingleEndResult {
    fn default() -> Self {
        Self { name: UNCLASSIFIED.to_string(), score: -1.0, position: (-1, -1) }
    }
}

/// Adapter hits at both ends of a read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterScoreResult {
    pub front: SingleEndResult,
    pub rear: SingleEndResult,
}

/// Searches known adapter sequences at both read ends.
#[derive(Debug, Default)]
pub struct AdapterDetector;

impl AdapterDetector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Scores every known adapter against both read ends and keeps the best
    /// hit per end.
    #[must_use]
    pub fn detect(&self, seq: &[u8]) -> AdapterScoreResult {
        let front_window = &seq[..ADAPTER_WINDOW.min(seq.len())];
        let rear_start = seq.len().saturating_sub(ADAPTER_WINDOW);
        let rear_window = &seq[rear_start..];

        let mut result = AdapterScoreResult::default();
        for (name, front, rear) in ADAPTERS {
            if let Some(hit) = best_hit(front.as_bytes(), front_window, 0) {
                if hit.score > result.front.score {
                    result.front = SingleEndResult { name: format!("{name}_front"), ..hit };
                }
            }
            if let Some(hit) = best_hit(rear.as_bytes(), rear_window, rear_start as i64) {
                if hit.score > result.rear.score {
                    result.rear = SingleEndResult { name: format!("{name}_rear"), ..hit };
                }
            }
        }
        result
    }
}

fn best_hit(adapter: &[u8], window: &[u8], offset: i64) -> Option<SingleEndResult> {
    if window.is_empty() {
        return None;
    }
    let aln = edit_align(adapter, window, EditMode::SemiGlobal, &Wildcards::none());
    Some(SingleEndResult {
        name: String::new(),
        score: 1.0 - aln.distance as f32 / adapter.len() as f32,
        position: (aln.start as i64 + offset, aln.end as i64 + offset),
    })
}
