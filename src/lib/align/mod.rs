//! Sequence alignment engines.
//!
//! Two engines with very different jobs: [`edit`] does exact unit-cost
//! edit-distance DP with traces, for placing short barcode and adapter
//! contexts inside read windows and for merging duplex strands base by base.
//! [`overlap`] does approximate minimizer chaining, for deciding quickly
//! whether two full-length reads overlap at all and in which orientation.

pub mod edit;
pub mod overlap;

pub use edit::{edit_align, edit_distance, EditAlignment, EditMode, EditOp, Wildcards};
pub use overlap::{map_overlaps, OverlapHit, OverlapScratch, MINIMIZER_K, MINIMIZER_W};
