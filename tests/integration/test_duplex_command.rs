//! End-to-end CLI tests for the duplex command.
//!
//! These tests run the actual `lamprey duplex` binary and validate stereo
//! duplex calling in both pairing modes: heuristic pore/time pairing, and an
//! explicit pair map produced ahead of time.

use std::fs;
use std::process::Command;

use tempfile::TempDir;

use crate::helpers::{
    duplex_strands, pore_read, read_back_records, read_tsv, sorted_names, write_reads_bam,
};
use lamprey_lib::bam::record_name;

#[test]
fn test_duplex_command_heuristic_keeps_simplex_members() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let output_bam = temp_dir.path().join("output.bam");
    let stats_path = temp_dir.path().join("stats.tsv");

    let (template, complement) = duplex_strands(42);
    let expected_seq = template.seq.clone();
    let stray = pore_read("stray", 7, 500);
    write_reads_bam(&input_bam, &[stray, template, complement]);

    let status = Command::new(env!("CARGO_BIN_EXE_lamprey"))
        .args([
            "duplex",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            output_bam.to_str().unwrap(),
            "--read-order",
            "by-time",
            "--threads",
            "2",
            "--stats",
            stats_path.to_str().unwrap(),
        ])
        .status()
        .expect("Failed to run duplex command");

    assert!(status.success(), "Duplex command failed");
    assert!(output_bam.exists(), "Output BAM not created");

    // The duplex call is emitted alongside the original simplex strands.
    let records = read_back_records(&output_bam);
    assert_eq!(sorted_names(&records), vec!["cmpl", "stray", "tmpl", "tmpl;cmpl"]);

    let duplex = records
        .iter()
        .find(|r| record_name(r) == "tmpl;cmpl")
        .expect("duplex record missing");
    assert_eq!(
        duplex.sequence().as_ref(),
        expected_seq.as_slice(),
        "Clean reverse-complement strands should merge to the template sequence"
    );

    let stats = read_tsv(&stats_path);
    assert_eq!(stats[0], vec!["reads", "pairs", "duplex_reads"]);
    assert_eq!(stats[1], vec!["3", "1", "1"]);
}

#[test]
fn test_duplex_command_pair_map_consumes_members() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let output_bam = temp_dir.path().join("output.bam");
    let pair_map = temp_dir.path().join("pairs.tsv");

    let (template, complement) = duplex_strands(42);
    let stray = pore_read("stray", 7, 500);
    write_reads_bam(&input_bam, &[stray, template, complement]);
    fs::write(&pair_map, "template_id\tcomplement_id\ntmpl\tcmpl\n").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_lamprey"))
        .args([
            "duplex",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            output_bam.to_str().unwrap(),
            "--pair-map",
            pair_map.to_str().unwrap(),
            "--threads",
            "2",
        ])
        .status()
        .expect("Failed to run duplex command");

    assert!(status.success(), "Duplex command failed");

    // Listed members are consumed by the pair; unlisted reads flow through.
    let records = read_back_records(&output_bam);
    assert_eq!(sorted_names(&records), vec!["stray", "tmpl;cmpl"]);
}
