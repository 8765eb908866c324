//! Custom barcode kit files.
//!
//! A custom kit is a TOML file with one `[arrangement]` table, an optional
//! `[scoring]` table of parameter overrides, and an optional `[barcodes]`
//! table of extra barcode sequences:
//!
//! ```toml
//! [arrangement]
//! name = "MY-KIT"
//! kit = "MYK"
//! top_front_flank = "CCGTGAC"
//! top_rear_flank = "CGTTTTTCGTGCGCCGCTTC"
//! barcodes = ["MY01", "MY02"]
//!
//! [scoring]
//! max_barcode_penalty = 12
//!
//! [barcodes]
//! MY01 = "AAGAAAGTTGTCGGTGTCTTTGTG"
//! MY02 = "TCGATTCCGTTTGTAGTCGTCTGT"
//! ```
//!
//! Bottom flanks make the arrangement double-ended; a `barcodes2` list makes
//! the two ends carry different barcodes. Any validation failure is fatal at
//! load time, before the pipeline starts.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::{BarcodeScoringParams, KitInfo};
use crate::errors::{LampreyError, Result};
use crate::validation::{validate_fraction, validate_min_max};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CustomKitFile {
    arrangement: Arrangement,
    #[serde(default)]
    scoring: ScoringOverrides,
    #[serde(default)]
    barcodes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Arrangement {
    name: String,
    /// Ligation family name; defaults to the arrangement name.
    kit: Option<String>,
    top_front_flank: String,
    top_rear_flank: String,
    bottom_front_flank: Option<String>,
    bottom_rear_flank: Option<String>,
    barcodes: Vec<String>,
    barcodes2: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScoringOverrides {
    max_barcode_penalty: Option<i32>,
    barcode_end_proximity: Option<i32>,
    min_barcode_penalty_dist: Option<i32>,
    min_separation_only_dist: Option<i32>,
    min_flank_score: Option<f32>,
    flank_left_pad: Option<usize>,
    flank_right_pad: Option<usize>,
    front_barcode_window: Option<usize>,
    rear_barcode_window: Option<usize>,
}

impl ScoringOverrides {
    fn apply(&self, mut params: BarcodeScoringParams) -> BarcodeScoringParams {
        if let Some(v) = self.max_barcode_penalty {
            params.max_barcode_penalty = v;
        }
        if let Some(v) = self.barcode_end_proximity {
            params.barcode_end_proximity = v;
        }
        if let Some(v) = self.min_barcode_penalty_dist {
            params.min_barcode_penalty_dist = v;
        }
        if let Some(v) = self.min_separation_only_dist {
            params.min_separation_only_dist = v;
        }
        if let Some(v) = self.min_flank_score {
            params.min_flank_score = v;
        }
        if let Some(v) = self.flank_left_pad {
            params.flank_left_pad = v;
        }
        if let Some(v) = self.flank_right_pad {
            params.flank_right_pad = v;
        }
        if let Some(v) = self.front_barcode_window {
            params.front_barcode_window = v;
        }
        if let Some(v) = self.rear_barcode_window {
            params.rear_barcode_window = v;
        }
        params
    }
}

/// A parsed and validated custom kit, ready to merge into a registry.
#[derive(Debug)]
pub(crate) struct ParsedCustomKit {
    pub(crate) name: String,
    pub(crate) info: KitInfo,
    pub(crate) barcode_sequences: Vec<(String, String)>,
}

fn invalid(path: &Path, reason: impl Into<String>) -> LampreyError {
    LampreyError::InvalidCustomKit { path: path.display().to_string(), reason: reason.into() }
}

/// Reads and validates a custom kit TOML file.
pub(crate) fn parse_custom_kit(path: &Path) -> Result<ParsedCustomKit> {
    let contents =
        fs::read_to_string(path).map_err(|e| invalid(path, format!("cannot read file: {e}")))?;
    let file: CustomKitFile =
        toml::from_str(&contents).map_err(|e| invalid(path, format!("parse error: {e}")))?;

    let arrangement = file.arrangement;
    if arrangement.name.is_empty() {
        return Err(invalid(path, "arrangement name is empty"));
    }
    if arrangement.top_front_flank.is_empty() || arrangement.top_rear_flank.is_empty() {
        return Err(invalid(path, "top flanks must be non-empty"));
    }
    if arrangement.barcodes.is_empty() {
        return Err(invalid(path, "arrangement lists no barcodes"));
    }

    let double_ends =
        arrangement.bottom_front_flank.is_some() || arrangement.bottom_rear_flank.is_some();
    if double_ends
        && (arrangement.bottom_front_flank.is_none() || arrangement.bottom_rear_flank.is_none())
    {
        return Err(invalid(path, "bottom flanks must both be set or both be omitted"));
    }

    let ends_different = arrangement.barcodes2.is_some();
    if ends_different && !double_ends {
        return Err(invalid(path, "barcodes2 requires bottom flanks"));
    }
    let barcodes2 = arrangement.barcodes2.unwrap_or_default();
    if ends_different && barcodes2.len() != arrangement.barcodes.len() {
        return Err(invalid(path, "barcodes and barcodes2 must have the same length"));
    }

    for (name, seq) in &file.barcodes {
        if seq.is_empty() {
            return Err(invalid(path, format!("barcode {name} has an empty sequence")));
        }
    }

    let scoring_params = file.scoring.apply(BarcodeScoringParams::default());
    validate_fraction(f64::from(scoring_params.min_flank_score), "min_flank_score")
        .map_err(|e| invalid(path, e.to_string()))?;
    validate_min_max(
        scoring_params.min_barcode_penalty_dist,
        Some(scoring_params.max_barcode_penalty),
        "min_barcode_penalty_dist",
        "max_barcode_penalty",
    )
    .map_err(|e| invalid(path, e.to_string()))?;

    let info = KitInfo {
        name: arrangement.kit.unwrap_or_else(|| arrangement.name.clone()),
        double_ends,
        ends_different,
        top_front_flank: arrangement.top_front_flank,
        top_rear_flank: arrangement.top_rear_flank,
        bottom_front_flank: arrangement.bottom_front_flank.unwrap_or_default(),
        bottom_rear_flank: arrangement.bottom_rear_flank.unwrap_or_default(),
        barcodes: arrangement.barcodes,
        barcodes2,
        scoring_params,
    };

    Ok(ParsedCustomKit {
        name: arrangement.name,
        info,
        barcode_sequences: file.barcodes.into_iter().collect(),
    })
}
