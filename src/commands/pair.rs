//! `Pair` command implementation.
//!
//! Finds candidate template/complement duplex pairs heuristically and writes
//! them as a TSV pair map for `duplex --pair-map`.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossbeam_channel::bounded;
use log::{debug, info};

use lamprey_lib::bam::{create_bam_reader, is_stdin_path, record_name, record_to_read};
use lamprey_lib::logging::OperationTimer;
use lamprey_lib::messages::{FlushOptions, Message};
use lamprey_lib::pairing::{PairingNode, ReadOrder, write_pair_map};
use lamprey_lib::pipeline::{ChannelSink, Pipeline, PipelineNode};
use lamprey_lib::progress::ProgressTracker;
use lamprey_lib::stats::write_metrics;
use lamprey_lib::validation::validate_file_exists;

use super::command::Command;
use super::common::{StatsOptions, ThreadingOptions};
use super::writer::WRITER_QUEUE_CAPACITY;

/// Find candidate duplex pairs and write them as a pair map
#[derive(Parser, Debug)]
#[command(
    name = "pair",
    about = "\x1b[38;5;180m[DUPLEX]\x1b[0m         \x1b[36mFind candidate duplex pairs and write a pair map TSV\x1b[0m",
    long_about = r#"
Scans a basecalled BAM for template/complement duplex candidates: two reads from the same pore
(channel, mux, run, and flowcell all matching) where the second starts within a second of the
first ending. Near-identical lengths right after a tiny gap are accepted immediately; otherwise
the reads must overlap on opposite strands with high identity and near-complete coverage.

Accepted pairs are written as a two-column TSV (template_id, complement_id) suitable for
`lamprey duplex --pair-map`. Splitting pairing from encoding lets the pair map be inspected or
filtered before committing to duplex calls.

--read-order describes how the input is sorted, which bounds the candidate cache: `by-channel`
for reads grouped by pore (caps the number of open pores), `by-time` for a globally time-sorted
run (caps pending reads per pore).
"#
)]
pub struct Pair {
    /// Input BAM file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output pair map TSV file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Arrival order of reads in the input
    #[arg(long = "read-order", value_enum, default_value_t = ReadOrder::ByChannel)]
    pub read_order: ReadOrder,

    /// Optional output file for statistics
    #[command(flatten)]
    pub stats_opts: StatsOptions,

    /// Threading options
    #[command(flatten)]
    pub threading: ThreadingOptions,
}

impl Command for Pair {
    fn execute(&self, _command_line: &str) -> Result<()> {
        let timer = OperationTimer::new("Pairing reads");

        if !is_stdin_path(&self.input) {
            validate_file_exists(&self.input, "Input BAM")?;
        }
        let threads = self.threading.num_threads();

        info!("Pair");
        info!("  Input: {}", self.input.display());
        info!("  Output: {}", self.output.display());
        info!("  Read order: {:?}", self.read_order);
        info!("  {}", self.threading.log_message());

        let (mut reader, header) = create_bam_reader(&self.input, threads)?;

        let (sender, receiver) = bounded(WRITER_QUEUE_CAPACITY);
        let collector = thread::spawn(move || {
            let mut pairs: Vec<(String, String)> = Vec::new();
            for message in receiver {
                if let Message::Pair(pair) = message {
                    let pair = *pair;
                    pairs.push((pair.template.id, pair.complement.id));
                }
            }
            pairs
        });

        let node =
            PairingNode::spawned(self.read_order, Arc::new(ChannelSink::new(sender)), threads);
        let pipeline = Pipeline::new(vec![Arc::clone(&node) as Arc<dyn PipelineNode>])?;

        let progress = ProgressTracker::new("Read records");
        let mut skipped = 0u64;
        for result in reader.record_bufs(&header) {
            let record = result.context("Failed to read BAM record")?;
            progress.log_if_needed(1);
            match record_to_read(&record) {
                Ok(read) => pipeline.push(Message::from(read)),
                Err(e) => {
                    debug!("{}: not pairable: {e}", record_name(&record));
                    skipped += 1;
                }
            }
        }
        progress.log_final();
        if skipped > 0 {
            info!("Skipped {skipped} records without pairing metadata");
        }

        pipeline.terminate(&FlushOptions::flush_all());
        pipeline.log_summary();

        if let Some(path) = &self.stats_opts.stats {
            info!("Writing pairing metrics to {}", path.display());
            write_metrics(path, &[node.metrics()])?;
        }

        drop(pipeline);
        drop(node);
        let mut pairs =
            collector.join().map_err(|_| anyhow!("pair collector thread panicked"))?;
        pairs.sort();

        write_pair_map(&self.output, &pairs)?;
        info!("Wrote {} pairs to {}", pairs.len(), self.output.display());

        timer.log_completion(pairs.len() as u64);
        info!("Done!");
        Ok(())
    }
}
