//! `PolyA` command implementation.
//!
//! Estimates polyA/polyT tail lengths in signal space and annotates each
//! callable read with the `pt:i` tag.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use log::info;

use lamprey_lib::bam::{create_bam_reader, create_bam_writer};
use lamprey_lib::header::add_pg_record;
use lamprey_lib::logging::OperationTimer;
use lamprey_lib::messages::{FlushOptions, Message};
use lamprey_lib::pipeline::{ChannelSink, Pipeline, PipelineNode};
use lamprey_lib::polya::PolyANode;
use lamprey_lib::progress::ProgressTracker;
use lamprey_lib::stats::write_metrics;

use super::command::Command;
use super::common::{BamIoOptions, CompressionOptions, StatsOptions, ThreadingOptions};
use super::writer::{WRITER_QUEUE_CAPACITY, join_writer, spawn_writer};

/// Estimate polyA/polyT tail lengths from raw signal
#[derive(Parser, Debug)]
#[command(
    name = "polya",
    about = "\x1b[38;5;72m[POLYA]\x1b[0m          \x1b[36mEstimate polyA/polyT tail lengths from raw signal\x1b[0m",
    long_about = r#"
Estimates the polyA (or polyT, for reverse-strand cDNA) tail length of each read and writes it to
the pt tag. Basecallers systematically compress homopolymers, so the estimate is made in signal
space: the sequencing primers are located to orient the strand and anchor the tail, then the raw
signal around the anchor is scanned for the flat, low-variance stretch a homopolymer holds the pore
current at. The matching sample span is converted back to bases using a per-read samples-per-base
estimate.

Input records must carry the raw signal (sr), move table (mv), and trimmed-sample count (ts) aux
tags produced by the upstream basecaller. Reads without them, or where no confident primer
placement or quiet interval is found, pass through unannotated and are counted as not estimated.

With --rna the input is treated as direct RNA: the tail is anchored after the adapter instead of
between the cDNA primers.
"#
)]
pub struct PolyA {
    /// Input and output BAM files
    #[command(flatten)]
    pub io: BamIoOptions,

    /// Treat input as direct RNA rather than cDNA
    #[arg(long = "rna", default_value_t = false)]
    pub rna: bool,

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

impl Command for PolyA {
    fn execute(&self, command_line: &str) -> Result<()> {
        let timer = OperationTimer::new("Estimating tail lengths");

        self.io.validate()?;
        self.compression.validate()?;
        let threads = self.threading.num_threads();

        info!("PolyA");
        info!("  Input: {}", self.io.input.display());
        info!("  Output: {}", self.io.output.display());
        info!("  RNA: {}", self.rna);
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

        let node = PolyANode::spawned(self.rna, Arc::new(ChannelSink::new(sender)), threads);
        let pipeline = Pipeline::new(vec![Arc::clone(&node) as Arc<dyn PipelineNode>])?;

        let progress = ProgressTracker::new("Read records");
        for result in reader.record_bufs(&header) {
            let record = result.context("Failed to read BAM record")?;
            pipeline.push(Message::from(record));
            progress.log_if_needed(1);
        }
        progress.log_final();

        pipeline.terminate(&FlushOptions::flush_all());
        pipeline.log_summary();

        if let Some(path) = &self.stats_opts.stats {
            info!("Writing polyA metrics to {}", path.display());
            write_metrics(path, &[node.metrics()])?;
        }

        drop(pipeline);
        drop(node);
        let written = join_writer(writer_handle)?;

        timer.log_completion(written);
        info!("Done!");
        Ok(())
    }
}
