//! End-to-end CLI tests for the pair command.
//!
//! These tests run the actual `lamprey pair` binary over synthetic pore
//! reads and validate the pair-map TSV and statistics output.

use std::process::Command;

use tempfile::TempDir;

use crate::helpers::{duplex_strands, pore_read, read_tsv, write_reads_bam};

#[test]
fn test_pair_command_writes_pair_map() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let pair_map = temp_dir.path().join("pairs.tsv");
    let stats_path = temp_dir.path().join("stats.tsv");

    let (template, complement) = duplex_strands(42);
    let stray = pore_read("stray", 7, 500);
    // Time-sorted, as a by-time run would arrive.
    write_reads_bam(&input_bam, &[stray, template, complement]);

    let status = Command::new(env!("CARGO_BIN_EXE_lamprey"))
        .args([
            "pair",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            pair_map.to_str().unwrap(),
            "--read-order",
            "by-time",
            "--threads",
            "2",
            "--stats",
            stats_path.to_str().unwrap(),
        ])
        .status()
        .expect("Failed to run pair command");

    assert!(status.success(), "Pair command failed");
    assert!(pair_map.exists(), "Pair map not created");

    let rows = read_tsv(&pair_map);
    assert_eq!(rows.len(), 2, "Expected a header and one pair");
    assert_eq!(rows[0], vec!["template_id", "complement_id"]);
    assert_eq!(rows[1], vec!["tmpl", "cmpl"]);

    // Cached reads flush unpaired at shutdown, paired members included.
    let stats = read_tsv(&stats_path);
    assert_eq!(stats[0], vec!["reads", "pairs", "unpaired"]);
    assert_eq!(stats[1], vec!["3", "1", "3"]);
}

#[test]
fn test_pair_command_ignores_distant_reads() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let pair_map = temp_dir.path().join("pairs.tsv");

    // Same pore, but the second read starts long after the first ends.
    let first = pore_read("early", 5, 1000);
    let second = pore_read("late", 5, 20_000);
    write_reads_bam(&input_bam, &[first, second]);

    let status = Command::new(env!("CARGO_BIN_EXE_lamprey"))
        .args([
            "pair",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            pair_map.to_str().unwrap(),
            "--read-order",
            "by-channel",
            "--threads",
            "1",
        ])
        .status()
        .expect("Failed to run pair command");

    assert!(status.success(), "Pair command failed");

    let rows = read_tsv(&pair_map);
    assert!(rows.len() <= 1, "No pairs should be called, got {rows:?}");
}
