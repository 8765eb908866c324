//! `Duplex` command implementation.
//!
//! Pairs template/complement reads and stereo-encodes each accepted pair
//! into a single duplex read, alongside every simplex read.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use log::{debug, info};

use lamprey_lib::bam::{create_bam_reader, create_bam_writer, record_name, record_to_read};
use lamprey_lib::duplex::StereoNode;
use lamprey_lib::header::add_pg_record;
use lamprey_lib::logging::OperationTimer;
use lamprey_lib::messages::{FlushOptions, Message};
use lamprey_lib::pairing::{PairingNode, ReadOrder, read_pair_map};
use lamprey_lib::pipeline::{ChannelSink, Pipeline, PipelineNode};
use lamprey_lib::progress::ProgressTracker;
use lamprey_lib::stats::{DuplexMetrics, write_metrics};
use lamprey_lib::validation::validate_file_exists;

use super::command::Command;
use super::common::{BamIoOptions, CompressionOptions, StatsOptions, ThreadingOptions};
use super::writer::{WRITER_QUEUE_CAPACITY, join_writer, spawn_writer};

/// Pair reads and stereo-encode them into duplex reads
#[derive(Parser, Debug)]
#[command(
    name = "duplex",
    about = "\x1b[38;5;180m[DUPLEX]\x1b[0m         \x1b[36mPair reads and stereo-encode them into duplex reads\x1b[0m",
    long_about = r#"
Finds template/complement pairs and merges each one into a stereo-encoded duplex read: the two
basecalls are aligned, their bases and qualities merged, their move tables projected onto a shared
signal axis, and the raw signals concatenated. The encoded read's id is
`<template_id>;<complement_id>`.

Pairs come either from the built-in heuristics (same pore, adjacent in time, overlapping on
opposite strands; see `lamprey pair`) or from an explicit --pair-map TSV previously written by
`lamprey pair`. With a pair map, reads are held only until their named partner arrives.

Every simplex read is preserved in the output: pair members flow through unchanged alongside the
encoded duplex read, and pairs that cannot be encoded (missing signal or move tables, alignment
failure) fall back to their members. Records without the signal-metadata aux tags pass through
untouched.

--read-order describes how the input is sorted and only matters for heuristic pairing.
"#
)]
pub struct Duplex {
    /// Input and output BAM files
    #[command(flatten)]
    pub io: BamIoOptions,

    /// Pair map TSV (template_id, complement_id); skips heuristic pairing
    #[arg(short = 'p', long = "pair-map")]
    pub pair_map: Option<PathBuf>,

    /// Arrival order of reads in the input (heuristic pairing only)
    #[arg(long = "read-order", value_enum, default_value_t = ReadOrder::ByChannel)]
    pub read_order: ReadOrder,

    /// Optional output file for statistics
    #[command(flatten)]
    pub stats_opts: StatsOptions,

    /// Threading options
    #[command(flatten)]
    pub threading: ThreadingOptions,

    /// Compression options for output BAM
    #[command(flatten)]
    pub compression: CompressionOptions,
}

impl Command for Duplex {
    fn execute(&self, command_line: &str) -> Result<()> {
        let timer = OperationTimer::new("Calling duplex reads");

        self.io.validate()?;
        self.compression.validate()?;
        let threads = self.threading.num_threads();

        info!("Duplex");
        info!("  Input: {}", self.io.input.display());
        info!("  Output: {}", self.io.output.display());
        match &self.pair_map {
            Some(path) => info!("  Pair map: {}", path.display()),
            None => info!("  Read order: {:?}", self.read_order),
        }
        info!("  {}", self.threading.log_message());

        let (mut reader, header) = create_bam_reader(&self.io.input, threads)?;
        let header = add_pg_record(header, crate::version::VERSION.as_str(), command_line)?;
        let writer = create_bam_writer(
            &self.io.output,
            &header,
            threads,
            self.compression.compression_level,
        )?;

        let (sender, receiver) = bounded(WRITER_QUEUE_CAPACITY);
        let writer_handle = spawn_writer(writer, header.clone(), receiver);

        let stereo = StereoNode::spawned(Arc::new(ChannelSink::new(sender)), threads);
        let pairing = match &self.pair_map {
            Some(path) => {
                validate_file_exists(path, "Pair map")?;
                let pairs = read_pair_map(path)?;
                info!("Loaded {} pairs from {}", pairs.len(), path.display());
                PairingNode::spawned_with_pair_map(pairs, stereo.clone(), threads)
            }
            None => PairingNode::spawned(self.read_order, stereo.clone(), threads),
        };
        let pipeline =
            Pipeline::new(vec![pairing.clone() as Arc<dyn PipelineNode>, stereo.clone()])?;

        let progress = ProgressTracker::new("Read records");
        let mut passthrough = 0u64;
        for result in reader.record_bufs(&header) {
            let record = result.context("Failed to read BAM record")?;
            progress.log_if_needed(1);
            match record_to_read(&record) {
                Ok(read) => pipeline.push(Message::from(read)),
                Err(e) => {
                    debug!("{}: passing through unpaired: {e}", record_name(&record));
                    passthrough += 1;
                    pipeline.push(Message::from(record));
                }
            }
        }
        progress.log_final();
        if passthrough > 0 {
            info!("Passed through {passthrough} records without pairing metadata");
        }

        pipeline.terminate(&FlushOptions::flush_all());
        pipeline.log_summary();

        if let Some(path) = &self.stats_opts.stats {
            let pairing_metrics = pairing.metrics();
            let metrics = DuplexMetrics {
                reads: pairing_metrics.reads,
                pairs: pairing_metrics.pairs,
                duplex_reads: stereo.encoded_pairs(),
            };
            info!("Writing duplex metrics to {}", path.display());
            write_metrics(path, &[metrics])?;
        }

        drop(pipeline);
        drop(pairing);
        drop(stereo);
        let written = join_writer(writer_handle)?;

        timer.log_completion(written);
        info!("Done!");
        Ok(())
    }
}
