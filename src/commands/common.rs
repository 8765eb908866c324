//! Common CLI options shared across commands.
//!
//! This module provides shared argument structures that can be composed into
//! command structs using `#[command(flatten)]`.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Args;

use lamprey_lib::bam::is_stdin_path;
use lamprey_lib::kits::KitRegistry;
use lamprey_lib::validation::{validate_file_exists, validate_positive};

/// Common input/output options for commands that read a BAM and write a BAM.
#[derive(Debug, Clone, Args)]
pub struct BamIoOptions {
    /// Input BAM file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output BAM file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
}

impl BamIoOptions {
    /// Validates that the input file exists (skipped for stdin paths).
    ///
    /// # Errors
    ///
    /// Returns an error if the input file does not exist.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !is_stdin_path(&self.input) {
            validate_file_exists(&self.input, "Input BAM")?;
        }
        Ok(())
    }
}

/// Options for writing statistics to a file.
#[derive(Debug, Clone, Default, Args)]
pub struct StatsOptions {
    /// Optional output TSV file for per-node statistics
    #[arg(short = 's', long = "stats")]
    pub stats: Option<PathBuf>,
}

impl StatsOptions {
    /// Returns true if stats output is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.stats.is_some()
    }
}

/// Worker thread options for the pipeline nodes.
///
/// Each node in a command's pipeline gets its own pool of this many worker
/// threads; BAM decompression and compression use the same count.
#[derive(Debug, Clone, Args)]
pub struct ThreadingOptions {
    /// Number of worker threads per pipeline node
    #[arg(long = "threads", default_value_t = 4)]
    pub threads: usize,
}

impl ThreadingOptions {
    /// Creates threading options with N threads.
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self { threads }
    }

    /// Returns the worker thread count, clamped to at least one.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.threads.max(1)
    }

    /// Returns a log message describing the threading configuration.
    #[must_use]
    pub fn log_message(&self) -> String {
        format!("Using {} worker threads per node", self.num_threads())
    }
}

impl Default for ThreadingOptions {
    fn default() -> Self {
        Self { threads: 4 }
    }
}

/// Options for output compression.
///
/// Controls BGZF compression level for BAM output files.
#[derive(Debug, Clone, Default, Args)]
pub struct CompressionOptions {
    /// Compression level for output BAM (1-12).
    ///
    /// Level 1 is fastest with larger files.
    /// Level 12 produces smallest files but is slowest.
    #[arg(long, default_value_t = 1)]
    pub compression_level: u32,
}

impl CompressionOptions {
    /// Validates that the level is within the BGZF range.
    ///
    /// # Errors
    ///
    /// Returns an error if the level is zero or above 12.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_positive(self.compression_level, "compression-level")?;
        if self.compression_level > 12 {
            bail!("compression-level must be between 1 and 12, got: {}", self.compression_level);
        }
        Ok(())
    }
}

/// Options selecting the barcode kit for classification.
#[derive(Debug, Clone, Default, Args)]
pub struct KitOptions {
    /// Barcode kit name (e.g. SQK-RBK114-24)
    #[arg(short = 'k', long = "kit-name")]
    pub kit_name: Option<String>,

    /// TOML file describing a custom barcode kit
    #[arg(long = "custom-kit")]
    pub custom_kit: Option<PathBuf>,

    /// Require a barcode at both ends for double-ended kits
    #[arg(long = "barcode-both-ends", default_value_t = false)]
    pub barcode_both_ends: bool,
}

impl KitOptions {
    /// Loads the kit registry and resolves the kit to classify against.
    ///
    /// A custom kit file is merged into the built-in registry; when no kit
    /// name is given the custom kit's own name is used.
    ///
    /// # Errors
    ///
    /// Returns an error if neither option is given, the custom kit file is
    /// missing or malformed, or the named kit is unknown.
    pub fn resolve(&self) -> anyhow::Result<(KitRegistry, String)> {
        let mut registry = KitRegistry::built_in();
        let custom_name = match &self.custom_kit {
            Some(path) => {
                validate_file_exists(path, "Custom kit")?;
                let name = registry
                    .add_custom_kit(path)
                    .with_context(|| format!("Failed to load custom kit: {}", path.display()))?;
                Some(name)
            }
            None => None,
        };
        let kit_name = match (&self.kit_name, custom_name) {
            (Some(name), _) => name.clone(),
            (None, Some(name)) => name,
            (None, None) => bail!(
                "either --kit-name or --custom-kit is required; built-in kits: {}",
                registry.kit_names().join(", ")
            ),
        };
        // Fail fast on unknown kits so the pipeline never starts.
        registry.kit(&kit_name)?;
        Ok((registry, kit_name))
    }
}
