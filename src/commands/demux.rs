//! `Demux` command implementation.
//!
//! Classifies each read against one barcode kit, annotates the winning
//! barcode in the `BC` tag, and by default trims detected adapters and the
//! classified barcode arrangement from the read ends.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use log::info;

use lamprey_lib::bam::{create_bam_reader, create_bam_writer};
use lamprey_lib::demux::{BarcodeClassifier, DemuxNode};
use lamprey_lib::header::add_pg_record;
use lamprey_lib::logging::OperationTimer;
use lamprey_lib::messages::{FlushOptions, Message};
use lamprey_lib::pipeline::{ChannelSink, Pipeline, PipelineNode};
use lamprey_lib::progress::ProgressTracker;
use lamprey_lib::stats::write_metrics;

use super::command::Command;
use super::common::{BamIoOptions, CompressionOptions, KitOptions, StatsOptions, ThreadingOptions};
use super::writer::{WRITER_QUEUE_CAPACITY, join_writer, spawn_writer};

/// Classify reads by barcode and trim barcodes and adapters
#[derive(Parser, Debug)]
#[command(
    name = "demux",
    about = "\x1b[38;5;151m[DEMUX]\x1b[0m          \x1b[36mClassify reads by barcode and trim barcodes and adapters\x1b[0m",
    long_about = r#"
Classifies each read against the barcode arrangements of one kit and writes the winning barcode name
to the BC tag (`<kit>_barcodeNN`), or `unclassified` when no arrangement scores well enough. For
double-ended kits the rear window is searched with reverse-complemented arrangements, and
--barcode-both-ends additionally demands agreeing hits at both ends.

By default adapters and the classified barcode span are trimmed from the read: sequence, qualities,
the move table, and any modified-base probabilities are cut consistently so downstream signal-space
tools keep working. Unclassified reads are never trimmed. Use --no-trim to annotate without touching
the reads.

The kit is chosen with --kit-name from the built-in registry, or supplied as a TOML file with
--custom-kit (see the documentation for the file format). A custom kit may reference built-in
barcode sequences by name or define its own.

Reads stream through a worker pool; per-kit classification results are summarized at completion and
optionally written as a TSV via --stats.
"#
)]
pub struct Demux {
    /// Input and output BAM files
    #[command(flatten)]
    pub io: BamIoOptions,

    /// Barcode kit selection
    #[command(flatten)]
    pub kit: KitOptions,

    /// Annotate only; do not trim barcodes or adapters
    #[arg(long = "no-trim", default_value_t = false)]
    pub no_trim: bool,

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

impl Command for Demux {
    fn execute(&self, command_line: &str) -> Result<()> {
        let timer = OperationTimer::new("Demultiplexing reads");

        self.io.validate()?;
        self.compression.validate()?;
        let (registry, kit_name) = self.kit.resolve()?;
        let threads = self.threading.num_threads();

        info!("Demux");
        info!("  Input: {}", self.io.input.display());
        info!("  Output: {}", self.io.output.display());
        info!("  Kit: {kit_name}");
        info!("  Barcode both ends: {}", self.kit.barcode_both_ends);
        info!("  Trim: {}", !self.no_trim);
        info!("  {}", self.threading.log_message());

        let classifier = BarcodeClassifier::new(&registry, &kit_name, self.kit.barcode_both_ends)?;

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

        let node = DemuxNode::spawned(
            classifier,
            !self.no_trim,
            !self.no_trim,
            Arc::new(ChannelSink::new(sender)),
            threads,
        );
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
            info!("Writing demux metrics to {}", path.display());
            write_metrics(path, &[node.metrics()])?;
        }

        // The node holds the only channel sender; dropping it lets the
        // writer thread finish.
        drop(pipeline);
        drop(node);
        let written = join_writer(writer_handle)?;

        timer.log_completion(written);
        info!("Done!");
        Ok(())
    }
}
