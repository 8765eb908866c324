//! Edit-distance alignment with wildcards, op traces and locations.
//!
//! Unit-cost Levenshtein DP in two modes: [`EditMode::Global`] aligns the
//! whole query against the whole target, [`EditMode::SemiGlobal`] leaves both
//! ends of the target free so the query lands somewhere inside it. The
//! barcode and adapter classifiers drive both: semi-global placement of a
//! flank context inside a read window, then global scoring of a candidate
//! barcode against the extracted window.
//!
//! Wildcard characters (the `N` mask base, the `M` wobble in 16S primers)
//! compare equal to their expansion set in either operand.

/// Alignment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    /// End-to-end alignment of query and target.
    Global,
    /// Gaps before and after the query in the target are free; the query
    /// aligns as an infix of the target.
    SemiGlobal,
}

/// One step of an alignment trace, in query order.
///
/// `Insert` consumes a query base with no target partner; `Delete` consumes a
/// target base with no query partner. Both diagonal ops consume one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    /// Bases compare equal (including wildcard expansion).
    Match,
    /// Bases differ.
    Mismatch,
    /// Query base with no target partner.
    Insert,
    /// Target base with no query partner.
    Delete,
}

/// Extra equality pairs honored on top of exact byte equality.
///
/// A pair `(w, b)` makes `w` compare equal to `b` regardless of which operand
/// holds the wildcard.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wildcards<'a> {
    pairs: &'a [(u8, u8)],
}

impl<'a> Wildcards<'a> {
    /// Wraps a pair list as a wildcard set.
    #[must_use]
    pub fn new(pairs: &'a [(u8, u8)]) -> Self {
        Self { pairs }
    }

    /// Empty set: exact byte equality only.
    #[must_use]
    pub fn none() -> Self {
        Self { pairs: &[] }
    }

    /// Whether `a` and `b` compare equal under this set.
    #[must_use]
    pub fn matches(&self, a: u8, b: u8) -> bool {
        a == b || self.pairs.iter().any(|&(w, x)| (w == a && x == b) || (w == b && x == a))
    }
}

/// Result of an edit alignment with trace.
///
/// `start` and `end` are the first and last target indices consumed by the
/// alignment, both inclusive, mirroring the location convention of the usual
/// C edit-distance libraries. For global mode they always span the whole
/// target.
#[derive(Debug, Clone)]
pub struct EditAlignment {
    /// Edit distance of the chosen placement.
    pub distance: u32,
    /// First target index consumed.
    pub start: usize,
    /// Last target index consumed (inclusive).
    pub end: usize,
    /// Trace from the start of the query to its end.
    pub ops: Vec<EditOp>,
}

#[inline]
fn sub_cost(a: u8, b: u8, wildcards: &Wildcards<'_>) -> u32 {
    u32::from(!wildcards.matches(a, b))
}

/// Edit distance without a trace.
///
/// Uses a rolling row, so memory is O(target). In semi-global mode the
/// distance is the best over all end positions in the target.
#[must_use]
pub fn edit_distance(
    query: &[u8],
    target: &[u8],
    mode: EditMode,
    wildcards: &Wildcards<'_>,
) -> u32 {
    let n = target.len();
    let mut row: Vec<u32> = match mode {
        EditMode::Global => (0..=n as u32).collect(),
        EditMode::SemiGlobal => vec![0; n + 1],
    };

    for (i, &q) in query.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i as u32 + 1;
        for (j, &t) in target.iter().enumerate() {
            let cost = sub_cost(q, t, wildcards);
            let best = (prev_diag + cost).min(row[j] + 1).min(row[j + 1] + 1);
            prev_diag = row[j + 1];
            row[j + 1] = best;
        }
    }

    match mode {
        EditMode::Global => row[n],
        EditMode::SemiGlobal => row.iter().copied().min().unwrap_or(0),
    }
}

/// Edit alignment with full trace and target locations.
///
/// In semi-global mode ties on the end location resolve to the smallest
/// target index. The trace prefers diagonal steps, then query-consuming
/// steps, which keeps mask extraction walks stable on clean data.
#[must_use]
pub fn edit_align(
    query: &[u8],
    target: &[u8],
    mode: EditMode,
    wildcards: &Wildcards<'_>,
) -> EditAlignment {
    let m = query.len();
    let n = target.len();
    let idx = |i: usize, j: usize| -> usize { i * (n + 1) + j };

    let mut dp = vec![0u32; (m + 1) * (n + 1)];
    for i in 0..=m {
        dp[idx(i, 0)] = i as u32;
    }
    for j in 0..=n {
        dp[idx(0, j)] = match mode {
            EditMode::Global => j as u32,
            EditMode::SemiGlobal => 0,
        };
    }

    for i in 1..=m {
        for j in 1..=n {
            let cost = sub_cost(query[i - 1], target[j - 1], wildcards);
            dp[idx(i, j)] = (dp[idx(i - 1, j - 1)] + cost)
                .min(dp[idx(i - 1, j)] + 1)
                .min(dp[idx(i, j - 1)] + 1);
        }
    }

    // Pick the end column: fixed in global mode, best (ties -> smallest
    // index) in semi-global mode.
    let (distance, end_col) = match mode {
        EditMode::Global => (dp[idx(m, n)], n),
        EditMode::SemiGlobal => {
            let mut best = (dp[idx(m, 0)], 0);
            for j in 1..=n {
                if dp[idx(m, j)] < best.0 {
                    best = (dp[idx(m, j)], j);
                }
            }
            (best.0, best.1)
        }
    };

    // Backtrack from (m, end_col) to row 0.
    let mut ops = Vec::with_capacity(m + n);
    let mut i = m;
    let mut j = end_col;
    while i > 0 {
        let here = dp[idx(i, j)];
        if j > 0 && here == dp[idx(i - 1, j - 1)] + sub_cost(query[i - 1], target[j - 1], wildcards)
        {
            ops.push(if wildcards.matches(query[i - 1], target[j - 1]) {
                EditOp::Match
            } else {
                EditOp::Mismatch
            });
            i -= 1;
            j -= 1;
        } else if here == dp[idx(i - 1, j)] + 1 {
            ops.push(EditOp::Insert);
            i -= 1;
        } else {
            ops.push(EditOp::Delete);
            j -= 1;
        }
    }
    // In global mode any remaining leading target bases are deletions.
    if mode == EditMode::Global {
        while j > 0 {
            ops.push(EditOp::Delete);
            j -= 1;
        }
    }
    ops.reverse();

    let start = j;
    let end = if end_col > 0 { end_col - 1 } else { 0 };
    EditAlignment { distance, start, end: end.max(start), ops }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops_distance(ops: &[EditOp]) -> u32 {
        ops.iter().filter(|op| !matches!(op, EditOp::Match)).count() as u32
    }

    #[test]
    fn test_global_distance_classic() {
        let d = edit_distance(b"kitten", b"sitting", EditMode::Global, &Wildcards::none());
        assert_eq!(d, 3);
    }

    #[test]
    fn test_global_identical_and_empty() {
        let w = Wildcards::none();
        assert_eq!(edit_distance(b"ACGT", b"ACGT", EditMode::Global, &w), 0);
        assert_eq!(edit_distance(b"", b"ACGT", EditMode::Global, &w), 4);
        assert_eq!(edit_distance(b"ACGT", b"", EditMode::Global, &w), 4);
        assert_eq!(edit_distance(b"", b"", EditMode::Global, &w), 0);
    }

    #[test]
    fn test_semiglobal_embedded_pattern() {
        let target = b"TTTTTTACGTACGTTTTTTT";
        let query = b"ACGTACGT";
        let aln = edit_align(query, target, EditMode::SemiGlobal, &Wildcards::none());
        assert_eq!(aln.distance, 0);
        assert_eq!(aln.start, 6);
        assert_eq!(aln.end, 13);
        assert_eq!(aln.ops.len(), 8);
        assert!(aln.ops.iter().all(|op| matches!(op, EditOp::Match)));
    }

    #[test]
    fn test_semiglobal_distance_matches_align() {
        let target = b"GGGGACGTTACGTGGGGG";
        let query = b"ACGTACGT";
        let w = Wildcards::none();
        let d = edit_distance(query, target, EditMode::SemiGlobal, &w);
        let aln = edit_align(query, target, EditMode::SemiGlobal, &w);
        assert_eq!(d, aln.distance);
        assert_eq!(ops_distance(&aln.ops), aln.distance);
    }

    #[test]
    fn test_wildcard_n_matches_all_bases() {
        let pairs =
            [(b'N', b'A'), (b'N', b'T'), (b'N', b'C'), (b'N', b'G'), (b'N', b'U')];
        let w = Wildcards::new(&pairs);
        assert_eq!(edit_distance(b"NNNN", b"ACGT", EditMode::Global, &w), 0);
        // Wildcard applies on either operand.
        assert_eq!(edit_distance(b"ACGT", b"NNNN", EditMode::Global, &w), 0);
    }

    #[test]
    fn test_wildcard_m_is_restricted() {
        let pairs = [(b'M', b'A'), (b'M', b'C')];
        let w = Wildcards::new(&pairs);
        assert_eq!(edit_distance(b"M", b"A", EditMode::Global, &w), 0);
        assert_eq!(edit_distance(b"M", b"C", EditMode::Global, &w), 0);
        assert_eq!(edit_distance(b"M", b"G", EditMode::Global, &w), 1);
        assert_eq!(edit_distance(b"M", b"T", EditMode::Global, &w), 1);
    }

    #[test]
    fn test_global_trace_consumes_both() {
        let query = b"GATTACA";
        let target = b"GCATGCT";
        let aln = edit_align(query, target, EditMode::Global, &Wildcards::none());
        let consumed_query =
            aln.ops.iter().filter(|op| !matches!(op, EditOp::Delete)).count();
        let consumed_target =
            aln.ops.iter().filter(|op| !matches!(op, EditOp::Insert)).count();
        assert_eq!(consumed_query, query.len());
        assert_eq!(consumed_target, target.len());
        assert_eq!(ops_distance(&aln.ops), aln.distance);
        assert_eq!(aln.start, 0);
        assert_eq!(aln.end, target.len() - 1);
    }

    #[test]
    fn test_semiglobal_trace_spans_locations() {
        let target = b"CCCCCCGATTACAGGGGGG";
        let query = b"GATTTACA"; // one inserted T
        let aln = edit_align(query, target, EditMode::SemiGlobal, &Wildcards::none());
        assert_eq!(aln.distance, 1);
        let consumed_target =
            aln.ops.iter().filter(|op| !matches!(op, EditOp::Insert)).count();
        assert_eq!(aln.end - aln.start + 1, consumed_target);
        assert_eq!(aln.start, 6);
    }

    #[test]
    fn test_semiglobal_tie_prefers_smallest_end() {
        // Query occurs twice; the leftmost placement wins.
        let target = b"AACGTAAAACGTAA";
        let aln = edit_align(b"ACGT", target, EditMode::SemiGlobal, &Wildcards::none());
        assert_eq!(aln.distance, 0);
        assert_eq!(aln.start, 1);
        assert_eq!(aln.end, 4);
    }
}
