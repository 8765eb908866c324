//! Barcode kit definitions and scoring parameters.
//!
//! A [`KitRegistry`] maps kit product names to [`KitInfo`] arrangements and
//! barcode names to their sequences. The shipped table covers the rapid,
//! rapid-PCR and 16S kits this pipeline is used with; custom arrangements can
//! be merged in from a TOML file (see [`custom`]). The registry is built once
//! at command startup and is read-only afterwards, so classifiers can share
//! it without locking.

pub mod custom;

use ahash::AHashMap;
use std::path::Path;

use crate::dna::reverse_complement;
use crate::errors::{LampreyError, Result};

// Flank sequences bounding the barcode region, per ligation family.
const RBK_FRONT: &str = "GCTTGGGTGTTTAACC";
const RBK_REAR: &str = "GTTTTCGCATTTATCGTGAAACGCTTTCGCGTTTTTCGTGCGCCGCTTCA";
const RBK114_FRONT: &str = "C";
const RLB_FRONT: &str = "CCGTGAC";
const RLB_REAR: &str = "CGTTTTTCGTGCGCCGCTTC";
const RAB_1ST_FRONT: &str = "CCGTGAC";
const RAB_1ST_REAR: &str = "AGAGTTTGATCMTGGCTCAG";
const RAB_2ND_FRONT: &str = "CCGTGAC";
const RAB_2ND_REAR: &str = "CGGTTACCTTGTTACGACTT";

/// Barcode sequences, 5' to 3' as they ligate to the template strand. The
/// native-barcode forms (NBxx) are the reverse complements of these and are
/// generated at registry construction.
const BARCODE_SEQUENCES: &[(&str, &str)] = &[
    ("BC01", "AAGAAAGTTGTCGGTGTCTTTGTG"),
    ("BC02", "TCGATTCCGTTTGTAGTCGTCTGT"),
    ("BC03", "GAGTCTTGTGTCCCAGTTACCAGG"),
    ("BC04", "TTCGGATTCTATCGTGTTTCCCTA"),
    ("BC05", "CTTGTCCAGGGTTTGTGTAACCTT"),
    ("BC06", "TTCTCGCAAAGGCAGAAAGTAGTC"),
    ("BC07", "GTGTTACCGTGGGAATGAATCCTT"),
    ("BC08", "TTCAGGGAACAAACCAAGTTACGT"),
    ("BC09", "AACTAGGCACAGCGAGTCTTGGTT"),
    ("BC10", "AAGCGTTGAAACCTTTGTCCTCTC"),
    ("BC11", "GTTTCATCTATCGGAGGGAATGGA"),
    ("BC12", "CAGGTAGAAAGAAGCAGAATCGGA"),
    ("BC13", "AGAACGACTTCCATACTCGTGTGA"),
    ("BC14", "AACGAGTCTCTTGGGACCCATAGA"),
    ("BC15", "AGGTCTACCTCGCTAACACCACTG"),
    ("BC16", "CGTCAACTGACAGTGGTTCGTACT"),
    ("BC17", "ACCCTCCAGGAAAGTACCTCTGAT"),
    ("BC18", "CCAAACCCAACAACCTAGATAGGC"),
    ("BC19", "GTTCCTCGTGCAGTGTCAAGAGAT"),
    ("BC20", "TTGCGTCCTGTTACGAGAACTCAT"),
    ("BC21", "GAGCCTCTCATTGTCCGTTCTCTA"),
    ("BC22", "ACCACTGCCATGTATCAAAGTACG"),
    ("BC23", "CTTACTACCCAGTGAACCTCCTCG"),
    ("BC24", "GCATAGTTCTGCATGATGGGTTAG"),
    ("RLB12A", "GTTGAGTTACAAAGCACCGATCAG"),
];

/// Tunable thresholds for barcode classification.
///
/// Penalties are edit distances, so lower is better; flank scores are
/// normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarcodeScoringParams {
    /// Highest barcode penalty still considered a credible match.
    pub max_barcode_penalty: i32,
    /// A match must start (top) or end (bottom) within this many bases of
    /// the respective read end.
    pub barcode_end_proximity: i32,
    /// Required penalty separation from the runner-up when the best match
    /// itself passes the penalty/flank thresholds.
    pub min_barcode_penalty_dist: i32,
    /// Larger separation that accepts the best match on margin alone.
    pub min_separation_only_dist: i32,
    /// Minimum flank score for a non-exact match.
    pub min_flank_score: f32,
    /// Bases of front flank appended to the left of each candidate barcode.
    pub flank_left_pad: usize,
    /// Bases of rear flank appended to the right of each candidate barcode.
    pub flank_right_pad: usize,
    /// Bases searched at the start of the read.
    pub front_barcode_window: usize,
    /// Bases searched at the end of the read.
    pub rear_barcode_window: usize,
}

impl Default for BarcodeScoringParams {
    fn default() -> Self {
        Self {
            max_barcode_penalty: 9,
            barcode_end_proximity: 75,
            min_barcode_penalty_dist: 3,
            min_separation_only_dist: 6,
            min_flank_score: 0.5,
            flank_left_pad: 5,
            flank_right_pad: 10,
            front_barcode_window: 175,
            rear_barcode_window: 175,
        }
    }
}

/// One barcode arrangement: flanks, barcode name lists, and scoring.
///
/// `double_ends` kits ligate a barcode to both ends of the strand;
/// `ends_different` additionally means the two ends carry different barcode
/// sequences (`barcodes2` parallel to `barcodes`).
#[derive(Debug, Clone)]
pub struct KitInfo {
    /// Ligation family name shared by related products (e.g. `RBK`).
    pub name: String,
    pub double_ends: bool,
    pub ends_different: bool,
    pub top_front_flank: String,
    pub top_rear_flank: String,
    pub bottom_front_flank: String,
    pub bottom_rear_flank: String,
    /// Barcode names for the top strand, index-aligned with `barcodes2`.
    pub barcodes: Vec<String>,
    /// Barcode names for the bottom strand of `ends_different` kits.
    pub barcodes2: Vec<String>,
    pub scoring_params: BarcodeScoringParams,
}

/// Lookup tables for kit arrangements and barcode sequences.
#[derive(Debug, Clone)]
pub struct KitRegistry {
    kits: AHashMap<String, KitInfo>,
    barcode_sequences: AHashMap<String, String>,
}

impl KitRegistry {
    /// Builds the registry of shipped kits and barcode sequences.
    #[must_use]
    pub fn built_in() -> Self {
        Self { kits: built_in_kits(), barcode_sequences: built_in_barcodes() }
    }

    /// Looks up a kit arrangement by product name.
    ///
    /// # Errors
    ///
    /// Returns [`LampreyError::UnknownKit`] when the kit is not registered.
    pub fn kit(&self, name: &str) -> Result<&KitInfo> {
        self.kits.get(name).ok_or_else(|| LampreyError::UnknownKit { kit_name: name.to_string() })
    }

    /// Looks up a barcode sequence by barcode name.
    ///
    /// # Errors
    ///
    /// Returns [`LampreyError::UnknownBarcode`] when the name is not
    /// registered.
    pub fn barcode_sequence(&self, name: &str) -> Result<&str> {
        self.barcode_sequences
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| LampreyError::UnknownBarcode { barcode_name: name.to_string() })
    }

    /// Registered kit product names, sorted for stable error messages.
    #[must_use]
    pub fn kit_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.kits.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Parses a custom kit TOML file and merges its arrangement and barcode
    /// sequences into the registry, returning the new kit's name.
    ///
    /// # Errors
    ///
    /// Returns [`LampreyError::InvalidCustomKit`] when the file cannot be
    /// read or fails validation.
    pub fn add_custom_kit<P: AsRef<Path>>(&mut self, path: P) -> Result<String> {
        let path = path.as_ref();
        let parsed = custom::parse_custom_kit(path)?;
        for (name, seq) in parsed.barcode_sequences {
            self.barcode_sequences.insert(name, seq);
        }
        for barcode in parsed.info.barcodes.iter().chain(parsed.info.barcodes2.iter()) {
            if !self.barcode_sequences.contains_key(barcode) {
                return Err(LampreyError::InvalidCustomKit {
                    path: path.display().to_string(),
                    reason: format!("barcode {barcode} has no known sequence"),
                });
            }
        }
        self.kits.insert(parsed.name.clone(), parsed.info);
        Ok(parsed.name)
    }
}

impl Default for KitRegistry {
    fn default() -> Self {
        Self::built_in()
    }
}

/// Normalizes a kit-specific barcode name (`BC01`, `NB01`, `RLB12A`) to the
/// `barcodeNN` form used in output annotations.
#[must_use]
pub fn normalize_barcode_name(name: &str) -> String {
    let digits: String = name.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        name.to_lowercase()
    } else {
        format!("barcode{digits}")
    }
}

/// Builds the annotation written to the `BC` tag, `<kit>_<barcodeNN>`.
#[must_use]
pub fn barcode_tag_value(kit_name: &str, barcode_name: &str) -> String {
    format!("{kit_name}_{}", normalize_barcode_name(barcode_name))
}

fn barcode_names(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(|i| format!("BC{i:02}")).collect()
}

fn built_in_kits() -> AHashMap<String, KitInfo> {
    let mut kits = AHashMap::new();

    kits.insert(
        "SQK-RBK004".to_string(),
        KitInfo {
            name: "RBK".to_string(),
            double_ends: false,
            ends_different: false,
            top_front_flank: RBK_FRONT.to_string(),
            top_rear_flank: RBK_REAR.to_string(),
            bottom_front_flank: String::new(),
            bottom_rear_flank: String::new(),
            barcodes: barcode_names(1..=12),
            barcodes2: Vec::new(),
            scoring_params: BarcodeScoringParams::default(),
        },
    );

    kits.insert(
        "SQK-RBK114-24".to_string(),
        KitInfo {
            name: "RBK114".to_string(),
            double_ends: false,
            ends_different: false,
            top_front_flank: RBK114_FRONT.to_string(),
            top_rear_flank: RBK_REAR.to_string(),
            bottom_front_flank: String::new(),
            bottom_rear_flank: String::new(),
            barcodes: barcode_names(1..=24),
            barcodes2: Vec::new(),
            scoring_params: BarcodeScoringParams::default(),
        },
    );

    let mut rpb_barcodes = barcode_names(1..=11);
    rpb_barcodes.push("RLB12A".to_string());
    kits.insert(
        "SQK-RPB004".to_string(),
        KitInfo {
            name: "RPB".to_string(),
            double_ends: true,
            ends_different: false,
            top_front_flank: RLB_FRONT.to_string(),
            top_rear_flank: RLB_REAR.to_string(),
            bottom_front_flank: String::new(),
            bottom_rear_flank: String::new(),
            barcodes: rpb_barcodes,
            barcodes2: Vec::new(),
            scoring_params: BarcodeScoringParams::default(),
        },
    );

    kits.insert(
        "SQK-RAB204".to_string(),
        KitInfo {
            name: "RAB".to_string(),
            double_ends: true,
            ends_different: true,
            top_front_flank: RAB_1ST_FRONT.to_string(),
            top_rear_flank: RAB_1ST_REAR.to_string(),
            bottom_front_flank: RAB_2ND_FRONT.to_string(),
            bottom_rear_flank: RAB_2ND_REAR.to_string(),
            barcodes: barcode_names(1..=12),
            barcodes2: barcode_names(1..=12),
            scoring_params: BarcodeScoringParams::default(),
        },
    );

    kits
}

fn built_in_barcodes() -> AHashMap<String, String> {
    let mut sequences = AHashMap::new();
    for &(name, seq) in BARCODE_SEQUENCES {
        sequences.insert(name.to_string(), seq.to_string());
        // Native barcodes are the reverse complements of the BC forms.
        if let Some(index) = name.strip_prefix("BC") {
            let rc = reverse_complement(seq.as_bytes());
            sequences.insert(format!("NB{index}"), String::from_utf8_lossy(&rc).into_owned());
        }
    }
    sequences
}
