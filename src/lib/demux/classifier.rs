//! Barcode classification against a kit's arrangement.
//!
//! Classification is a two-stage alignment. First the kit's flank context
//! (front flank + an `N` mask standing in for the barcode + rear flank) is
//! placed inside a window at the read end with a semi-global alignment; an
//! op walk over the trace locates where the mask landed. Then every candidate
//! barcode, padded with a few flank bases on each side, is scored against the
//! located window with a global alignment; that edit distance is the
//! barcode's penalty. Double-ended kits score both read ends (the rear end
//! against reverse-complemented contexts) and kits with different barcodes
//! per end score both pairings of the two arrangements.

use log::trace;

use crate::align::{EditAlignment, EditMode, EditOp, Wildcards, edit_align, edit_distance};
use crate::dna::reverse_complement;
use crate::errors::{LampreyError, Result};
use crate::kits::{BarcodeScoringParams, KitInfo, KitRegistry};

/// Classification of reads that match no barcode.
pub const UNCLASSIFIED: &str = "unclassified";

/// Wildcard pairs honored when placing flank contexts: the `N` mask matches
/// any base and the 16S primers' `M` wobble matches A or C.
const FLANK_WILDCARD_PAIRS: [(u8, u8); 7] = [
    (b'N', b'A'),
    (b'N', b'T'),
    (b'N', b'C'),
    (b'N', b'G'),
    (b'N', b'U'),
    (b'M', b'A'),
    (b'M', b'C'),
];

/// Scores for one candidate barcode against one read.
///
/// Penalties are edit distances (lower is better, -1 = side not scored);
/// flank scores are normalized to [0, 1]. Positions are the flank
/// alignment's span in read coordinates, inclusive, (-1, -1) when the side
/// was not scored.
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeScoreResult {
    /// Barcode name (e.g. `BC03`), or `unclassified`.
    pub barcode_name: String,
    /// Kit family the barcode was scored under, or `unclassified`.
    pub kit: String,
    /// Penalty of the chosen end.
    pub penalty: i32,
    /// Penalty at the front of the read.
    pub top_penalty: i32,
    /// Penalty at the rear of the read.
    pub bottom_penalty: i32,
    /// Flank score of the chosen end.
    pub flank_score: f32,
    /// Flank score at the front of the read.
    pub top_flank_score: f32,
    /// Flank score at the rear of the read.
    pub bottom_flank_score: f32,
    /// Normalized barcode score of the chosen end, `1 - penalty / len`.
    pub barcode_score: f32,
    /// Whether the chosen end is the front of the read.
    pub use_top: bool,
    /// Flank span at the front of the read.
    pub top_barcode_pos: (i64, i64),
    /// Flank span at the rear of the read.
    pub bottom_barcode_pos: (i64, i64),
}

impl BarcodeScoreResult {
    /// The result recorded for reads that match no barcode.
    #[must_use]
    pub fn unclassified() -> Self {
        Self {
            barcode_name: UNCLASSIFIED.to_string(),
            kit: UNCLASSIFIED.to_string(),
            penalty: -1,
            top_penalty: -1,
            bottom_penalty: -1,
            flank_score: -1.0,
            top_flank_score: -1.0,
            bottom_flank_score: -1.0,
            barcode_score: -1.0,
            use_top: false,
            top_barcode_pos: (-1, -1),
            bottom_barcode_pos: (-1, -1),
        }
    }

    /// Whether this result is the unclassified sentinel.
    #[must_use]
    pub fn is_unclassified(&self) -> bool {
        self.barcode_name == UNCLASSIFIED
    }
}

impl Default for BarcodeScoreResult {
    fn default() -> Self {
        Self::unclassified()
    }
}

/// A flank context: the alignment query for one end/orientation, plus the
/// buffer bases used to pad candidate barcodes for penalty scoring.
struct FlankContext {
    /// Front flank (unless suppressed) + `N` mask + rear flank.
    text: Vec<u8>,
    /// Trailing bases of the context's front flank.
    left_buffer: Vec<u8>,
    /// Leading bases of the context's rear flank.
    right_buffer: Vec<u8>,
    /// Flank bases in the context (score denominator).
    flank_len: usize,
    /// Mask length = barcode length.
    barcode_len: usize,
}

impl FlankContext {
    fn new(front: &[u8], rear: &[u8], barcode_len: usize, include_front: bool, params: &BarcodeScoringParams) -> Self {
        let mut text = Vec::new();
        if include_front {
            text.extend_from_slice(front);
        }
        text.extend(std::iter::repeat(b'N').take(barcode_len));
        text.extend_from_slice(rear);

        let left_start = front.len().saturating_sub(params.flank_left_pad);
        let right_end = params.flank_right_pad.min(rear.len());
        Self {
            left_buffer: front[left_start..].to_vec(),
            right_buffer: rear[..right_end].to_vec(),
            flank_len: text.len() - barcode_len,
            barcode_len,
            text,
        }
    }

    /// Context for the rear of the read: both flanks reverse-complemented
    /// and swapped, so the rear flank leads.
    fn new_rev(front: &[u8], rear: &[u8], barcode_len: usize, params: &BarcodeScoringParams) -> Self {
        let front_rc = reverse_complement(rear);
        let rear_rc = reverse_complement(front);
        Self::new(&front_rc, &rear_rc, barcode_len, true, params)
    }

    fn padded(&self, barcode: &[u8]) -> Vec<u8> {
        let mut padded =
            Vec::with_capacity(self.left_buffer.len() + barcode.len() + self.right_buffer.len());
        padded.extend_from_slice(&self.left_buffer);
        padded.extend_from_slice(barcode);
        padded.extend_from_slice(&self.right_buffer);
        padded
    }
}

/// A placed flank context: alignment quality, location, and the extracted
/// window candidate barcodes are scored against.
struct FlankHit {
    distance: u32,
    score: f32,
    /// Flank span in window coordinates, inclusive.
    pos: (i64, i64),
    /// Window slice covering the barcode region plus the pad buffers.
    mask_window: Vec<u8>,
}

/// Walks the alignment trace to the first context position past the `N`
/// mask, returning the exclusive end of the barcode region in window
/// coordinates.
fn mask_end_location(aln: &EditAlignment, context: &[u8]) -> usize {
    let mut query_cursor = 0usize;
    let mut target_cursor = 0usize;
    let mut in_mask = false;
    for op in &aln.ops {
        if in_mask && context.get(query_cursor).copied() != Some(b'N') {
            break;
        }
        match op {
            EditOp::Match => {
                query_cursor += 1;
                target_cursor += 1;
                if context.get(query_cursor).copied() == Some(b'N') {
                    in_mask = true;
                }
            }
            EditOp::Mismatch => {
                query_cursor += 1;
                target_cursor += 1;
            }
            EditOp::Delete => {
                target_cursor += 1;
            }
            EditOp::Insert => {
                query_cursor += 1;
            }
        }
    }
    aln.start + target_cursor
}

fn place_flank(context: &FlankContext, window: &[u8]) -> FlankHit {
    let wildcards = Wildcards::new(&FLANK_WILDCARD_PAIRS);
    let aln = edit_align(&context.text, window, EditMode::SemiGlobal, &wildcards);
    let barcode_end = mask_end_location(&aln, &context.text);

    let start = barcode_end.saturating_sub(context.left_buffer.len() + context.barcode_len);
    let end = (barcode_end + context.right_buffer.len()).min(window.len());
    let mask_window = window[start.min(end)..end].to_vec();

    FlankHit {
        distance: aln.distance,
        score: 1.0 - aln.distance as f32 / context.flank_len as f32,
        pos: (aln.start as i64, aln.end as i64),
        mask_window,
    }
}

fn barcode_penalty(context: &FlankContext, barcode: &[u8], hit: &FlankHit) -> i32 {
    let padded = context.padded(barcode);
    edit_distance(&padded, &hit.mask_window, EditMode::Global, &Wildcards::none()) as i32
}

fn barcode_score(context: &FlankContext, barcode: &[u8], penalty: i32) -> f32 {
    let padded_len = context.left_buffer.len() + barcode.len() + context.right_buffer.len();
    1.0 - penalty as f32 / padded_len as f32
}

/// Chooses between the two ends of a double-ended kit: prefer the end that
/// wins on both penalty and flank score, then the end with the lower
/// penalty.
fn pick_top_or_bottom(top_pen: i32, bottom_pen: i32, top_flank: f32, bottom_flank: f32) -> bool {
    if top_pen <= bottom_pen && top_flank >= bottom_flank {
        true
    } else if bottom_pen <= top_pen && bottom_flank >= top_flank {
        false
    } else {
        top_pen <= bottom_pen
    }
}

/// One candidate barcode of the kit: the top-strand sequence and, for kits
/// with different barcodes per end, the bottom-strand sequence.
struct BarcodeCandidate {
    name: String,
    barcode1: Vec<u8>,
    barcode1_rev: Vec<u8>,
    barcode2: Vec<u8>,
    barcode2_rev: Vec<u8>,
}

/// Classifies read sequences against one barcode kit.
///
/// Construction resolves and validates every barcode of the kit up front, so
/// classification itself never fails; reads that match nothing come back as
/// [`BarcodeScoreResult::unclassified`].
pub struct BarcodeClassifier {
    kit_name: String,
    kit: KitInfo,
    barcode_both_ends: bool,
    candidates: Vec<BarcodeCandidate>,
    top_context: FlankContext,
    top_context_rev: FlankContext,
    bottom_context: Option<FlankContext>,
    bottom_context_rev: Option<FlankContext>,
}

impl BarcodeClassifier {
    /// Builds a classifier for `kit_name` out of the registry.
    ///
    /// # Errors
    ///
    /// Returns [`LampreyError::UnknownKit`]/[`LampreyError::UnknownBarcode`]
    /// for unresolved names and [`LampreyError::InvalidKit`] when the kit's
    /// barcode lists are empty, differ in count, or mix sequence lengths.
    pub fn new(registry: &KitRegistry, kit_name: &str, barcode_both_ends: bool) -> Result<Self> {
        let kit = registry.kit(kit_name)?.clone();
        if kit.barcodes.is_empty() {
            return Err(LampreyError::InvalidKit {
                kit_name: kit_name.to_string(),
                reason: "kit defines no barcodes".to_string(),
            });
        }
        if kit.ends_different && kit.barcodes2.len() != kit.barcodes.len() {
            return Err(LampreyError::InvalidKit {
                kit_name: kit_name.to_string(),
                reason: format!(
                    "barcode lists differ in length ({} vs {})",
                    kit.barcodes.len(),
                    kit.barcodes2.len()
                ),
            });
        }

        let mut candidates = Vec::with_capacity(kit.barcodes.len());
        let mut barcode_len = None;
        for (i, name) in kit.barcodes.iter().enumerate() {
            let barcode1 = registry.barcode_sequence(name)?.as_bytes().to_vec();
            let barcode2 = if kit.ends_different {
                registry.barcode_sequence(&kit.barcodes2[i])?.as_bytes().to_vec()
            } else {
                Vec::new()
            };
            for seq in [&barcode1, &barcode2] {
                if seq.is_empty() {
                    continue;
                }
                match barcode_len {
                    None => barcode_len = Some(seq.len()),
                    Some(len) if len != seq.len() => {
                        return Err(LampreyError::InvalidKit {
                            kit_name: kit_name.to_string(),
                            reason: format!(
                                "barcode {name} length {} differs from {len}",
                                seq.len()
                            ),
                        });
                    }
                    Some(_) => {}
                }
            }
            candidates.push(BarcodeCandidate {
                name: name.clone(),
                barcode1_rev: reverse_complement(&barcode1),
                barcode2_rev: reverse_complement(&barcode2),
                barcode1,
                barcode2,
            });
        }
        let barcode_len = barcode_len.expect("kit has at least one barcode");

        // Rapid 14 chemistry reads start right at the barcode, so the front
        // flank is left out of the placement context.
        let include_front = !kit_name.contains("SQK-RBK114");
        let params = &kit.scoring_params;
        let front = kit.top_front_flank.as_bytes();
        let rear = kit.top_rear_flank.as_bytes();
        let top_context = FlankContext::new(front, rear, barcode_len, include_front, params);
        let top_context_rev = FlankContext::new_rev(front, rear, barcode_len, params);
        let (bottom_context, bottom_context_rev) = if kit.ends_different {
            let bottom_front = kit.bottom_front_flank.as_bytes();
            let bottom_rear = kit.bottom_rear_flank.as_bytes();
            (
                Some(FlankContext::new(bottom_front, bottom_rear, barcode_len, true, params)),
                Some(FlankContext::new_rev(bottom_front, bottom_rear, barcode_len, params)),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            kit_name: kit_name.to_string(),
            kit,
            barcode_both_ends,
            candidates,
            top_context,
            top_context_rev,
            bottom_context,
            bottom_context_rev,
        })
    }

    /// The kit product name the classifier was built for.
    #[must_use]
    pub fn kit_name(&self) -> &str {
        &self.kit_name
    }

    /// The kit arrangement the classifier scores against.
    #[must_use]
    pub fn kit_info(&self) -> &KitInfo {
        &self.kit
    }

    fn windows<'a>(&self, seq: &'a [u8]) -> (&'a [u8], &'a [u8], usize) {
        let params = &self.kit.scoring_params;
        let top_end = params.front_barcode_window.min(seq.len());
        let bottom_start = seq.len().saturating_sub(params.rear_barcode_window);
        (&seq[..top_end], &seq[bottom_start..], bottom_start)
    }

    fn score_single_end(&self, seq: &[u8]) -> Vec<BarcodeScoreResult> {
        let (top_window, _, _) = self.windows(seq);
        let top_hit = place_flank(&self.top_context, top_window);

        self.candidates
            .iter()
            .map(|candidate| {
                let penalty = barcode_penalty(&self.top_context, &candidate.barcode1, &top_hit);
                BarcodeScoreResult {
                    barcode_name: candidate.name.clone(),
                    kit: self.kit.name.clone(),
                    penalty,
                    top_penalty: penalty,
                    bottom_penalty: -1,
                    flank_score: top_hit.score,
                    top_flank_score: top_hit.score,
                    bottom_flank_score: -1.0,
                    barcode_score: barcode_score(&self.top_context, &candidate.barcode1, penalty),
                    use_top: true,
                    top_barcode_pos: top_hit.pos,
                    bottom_barcode_pos: (-1, -1),
                }
            })
            .collect()
    }

    fn score_double_ends_same(&self, seq: &[u8]) -> Vec<BarcodeScoreResult> {
        let (top_window, bottom_window, bottom_start) = self.windows(seq);
        let top_hit = place_flank(&self.top_context, top_window);
        let bottom_hit = place_flank(&self.top_context_rev, bottom_window);
        let offset = bottom_start as i64;

        self.candidates
            .iter()
            .map(|candidate| {
                let top_penalty =
                    barcode_penalty(&self.top_context, &candidate.barcode1, &top_hit);
                let bottom_penalty =
                    barcode_penalty(&self.top_context_rev, &candidate.barcode1_rev, &bottom_hit);
                let use_top =
                    pick_top_or_bottom(top_penalty, bottom_penalty, top_hit.score, bottom_hit.score);
                let (penalty, flank, score) = if use_top {
                    let score = barcode_score(&self.top_context, &candidate.barcode1, top_penalty);
                    (top_penalty, top_hit.score, score)
                } else {
                    let score =
                        barcode_score(&self.top_context_rev, &candidate.barcode1_rev, bottom_penalty);
                    (bottom_penalty, bottom_hit.score, score)
                };
                BarcodeScoreResult {
                    barcode_name: candidate.name.clone(),
                    kit: self.kit.name.clone(),
                    penalty,
                    top_penalty,
                    bottom_penalty,
                    flank_score: flank,
                    top_flank_score: top_hit.score,
                    bottom_flank_score: bottom_hit.score,
                    barcode_score: score,
                    use_top,
                    top_barcode_pos: top_hit.pos,
                    bottom_barcode_pos: (bottom_hit.pos.0 + offset, bottom_hit.pos.1 + offset),
                }
            })
            .collect()
    }

    fn score_double_ends_different(&self, seq: &[u8]) -> Vec<BarcodeScoreResult> {
        let bottom_context = self.bottom_context.as_ref().expect("ends_different kit");
        let bottom_context_rev = self.bottom_context_rev.as_ref().expect("ends_different kit");
        let (top_window, bottom_window, bottom_start) = self.windows(seq);
        let offset = bottom_start as i64;

        // Variant 1 is the arrangement as listed; variant 2 is the same
        // arrangement read from the other strand, so the contexts swap ends.
        let v1_top_hit = place_flank(&self.top_context, top_window);
        let v1_bottom_hit = place_flank(bottom_context_rev, bottom_window);
        let v2_top_hit = place_flank(bottom_context, top_window);
        let v2_bottom_hit = place_flank(&self.top_context_rev, bottom_window);
        let total_v1 = v1_top_hit.distance + v1_bottom_hit.distance;
        let total_v2 = v2_top_hit.distance + v2_bottom_hit.distance;

        self.candidates
            .iter()
            .map(|candidate| {
                let v1_top = barcode_penalty(&self.top_context, &candidate.barcode1, &v1_top_hit);
                let v1_bottom =
                    barcode_penalty(bottom_context_rev, &candidate.barcode2_rev, &v1_bottom_hit);
                let v2_top = barcode_penalty(bottom_context, &candidate.barcode2, &v2_top_hit);
                let v2_bottom =
                    barcode_penalty(&self.top_context_rev, &candidate.barcode1_rev, &v2_bottom_hit);

                let v1_use_top =
                    pick_top_or_bottom(v1_top, v1_bottom, v1_top_hit.score, v1_bottom_hit.score);
                let v1_penalty = if v1_use_top { v1_top } else { v1_bottom };
                let v2_use_top =
                    pick_top_or_bottom(v2_top, v2_bottom, v2_top_hit.score, v2_bottom_hit.score);
                let v2_penalty = if v2_use_top { v2_top } else { v2_bottom };

                let use_v1 = if v1_penalty <= v2_penalty && total_v1 <= total_v2 {
                    true
                } else if v2_penalty <= v1_penalty && total_v2 <= total_v1 {
                    false
                } else {
                    v1_penalty <= v2_penalty
                };

                let (top_hit, bottom_hit, top_penalty, bottom_penalty, use_top) = if use_v1 {
                    (&v1_top_hit, &v1_bottom_hit, v1_top, v1_bottom, v1_use_top)
                } else {
                    (&v2_top_hit, &v2_bottom_hit, v2_top, v2_bottom, v2_use_top)
                };
                let penalty = if use_top { top_penalty } else { bottom_penalty };
                let flank = if use_top { top_hit.score } else { bottom_hit.score };
                // Both barcodes of a pair share one length, so either
                // context gives the same padded length for the score.
                let score = barcode_score(&self.top_context, &candidate.barcode1, penalty);

                BarcodeScoreResult {
                    barcode_name: candidate.name.clone(),
                    kit: self.kit.name.clone(),
                    penalty,
                    top_penalty,
                    bottom_penalty,
                    flank_score: flank,
                    top_flank_score: top_hit.score,
                    bottom_flank_score: bottom_hit.score,
                    barcode_score: score,
                    use_top,
                    top_barcode_pos: top_hit.pos,
                    bottom_barcode_pos: (bottom_hit.pos.0 + offset, bottom_hit.pos.1 + offset),
                }
            })
            .collect()
    }

    /// Scores every candidate barcode and applies the acceptance heuristics,
    /// returning the winning barcode or the unclassified sentinel.
    #[must_use]
    pub fn classify(&self, seq: &[u8]) -> BarcodeScoreResult {
        if seq.is_empty() {
            return BarcodeScoreResult::unclassified();
        }
        let params = &self.kit.scoring_params;

        let mut scores = if !self.kit.double_ends {
            self.score_single_end(seq)
        } else if self.kit.ends_different {
            self.score_double_ends_different(seq)
        } else {
            self.score_double_ends_same(seq)
        };

        // When the two ends each point confidently at a different barcode,
        // the read is likely chimeric; refuse to pick one.
        if self.kit.double_ends {
            let best_top = scores
                .iter()
                .min_by_key(|s| s.top_penalty)
                .expect("kit has at least one barcode");
            let best_bottom = scores
                .iter()
                .min_by_key(|s| s.bottom_penalty)
                .expect("kit has at least one barcode");
            if best_top.top_penalty.max(best_bottom.bottom_penalty) <= params.max_barcode_penalty
                && (best_top.top_penalty - best_bottom.bottom_penalty).abs()
                    <= params.min_barcode_penalty_dist
                && best_top.barcode_name != best_bottom.barcode_name
            {
                trace!(
                    "barcode disagreement between ends: {} vs {}",
                    best_top.barcode_name, best_bottom.barcode_name
                );
                return BarcodeScoreResult::unclassified();
            }
        }

        scores.sort_by_key(|s| s.penalty);
        let acceptable = |result: &BarcodeScoreResult| {
            result.penalty == 0
                || (result.penalty <= params.max_barcode_penalty
                    && result.flank_score >= params.min_flank_score)
        };

        let mut out = BarcodeScoreResult::unclassified();
        if scores.len() == 1 {
            if acceptable(&scores[0]) {
                out = scores.remove(0);
            }
        } else {
            let penalty_dist = scores[1].penalty - scores[0].penalty;
            let separated = (penalty_dist >= params.min_barcode_penalty_dist
                && acceptable(&scores[0]))
                || penalty_dist >= params.min_separation_only_dist;
            // The winning span must sit at a read end. Signed arithmetic:
            // reads shorter than the window pass through the rear check,
            // whose unspecified position is -1.
            let near_end = scores[0].top_barcode_pos.0 <= i64::from(params.barcode_end_proximity)
                || scores[0].bottom_barcode_pos.1
                    >= seq.len() as i64 - i64::from(params.barcode_end_proximity);
            if separated && near_end {
                out = scores.remove(0);
            }
        }

        if self.barcode_both_ends
            && self.kit.double_ends
            && !out.is_unclassified()
            && out.top_penalty.max(out.bottom_penalty) > params.max_barcode_penalty
        {
            trace!("{}: rear end fails both-ends stringency", out.barcode_name);
            return BarcodeScoreResult::unclassified();
        }

        if log::log_enabled!(log::Level::Trace) && !out.is_unclassified() {
            trace!(
                "classified {} penalty={} flank={:.3} use_top={}",
                out.barcode_name, out.penalty, out.flank_score, out.use_top
            );
        }
        out
    }
}
