//! CLI command implementations for lamprey.
//!
//! This module contains all the command implementations for the lamprey CLI
//! tool. Each submodule implements one subcommand over the same shape: parse
//! options, open the input BAM, run a pipeline of worker nodes, and drain the
//! result into a writer.
//!
//! # Commands
//!
//! - [`demux`] - Classify reads by barcode and trim barcodes and adapters
//! - [`pair`] - Find candidate duplex pairs and write a pair map TSV
//! - [`polya`] - Estimate polyA/polyT tail lengths from raw signal
//! - [`duplex`] - Pair reads and stereo-encode them into duplex reads

// Blanket clippy pedantic allows for command implementations.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

pub mod command;
pub mod common;
pub mod demux;
pub mod duplex;
pub mod pair;
pub mod polya;
mod writer;
