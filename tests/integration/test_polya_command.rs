//! End-to-end CLI tests for the polya command.
//!
//! These tests run the actual `lamprey polya` binary and validate tail
//! annotation, soft failure on reads without signal, and the statistics
//! output.

use std::process::Command;

use tempfile::TempDir;

use crate::helpers::{polya_read, read_back_records, read_tsv, tag_int, write_reads_bam};
use lamprey_lib::bam::record_name;
use lamprey_lib::read::Read;

#[test]
fn test_polya_command_annotates_rna_tail() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let output_bam = temp_dir.path().join("output.bam");
    let stats_path = temp_dir.path().join("stats.tsv");

    // One read with a clean 50-base tail in signal space, one without any
    // signal at all.
    let tailed = polya_read("tailed");
    let bare = Read::new("bare", vec![b'A'; 120], vec![b'+'; 120]);
    write_reads_bam(&input_bam, &[tailed, bare]);

    let status = Command::new(env!("CARGO_BIN_EXE_lamprey"))
        .args([
            "polya",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            output_bam.to_str().unwrap(),
            "--rna",
            "--threads",
            "2",
            "--stats",
            stats_path.to_str().unwrap(),
        ])
        .status()
        .expect("Failed to run polya command");

    assert!(status.success(), "Polya command failed");
    assert!(output_bam.exists(), "Output BAM not created");

    let records = read_back_records(&output_bam);
    assert_eq!(records.len(), 2, "Reads without an estimate are still written");

    for record in &records {
        let pt = tag_int(record, *b"pt");
        match record_name(record).as_str() {
            "tailed" => assert_eq!(pt, Some(50), "Expected a 50-base tail"),
            "bare" => assert_eq!(pt, None, "No estimate should mean no pt tag"),
            other => panic!("unexpected read {other}"),
        }
    }

    let stats = read_tsv(&stats_path);
    assert_eq!(stats[0], vec!["reads_estimated", "reads_not_estimated", "average_tail_length"]);
    assert_eq!(stats[1][0], "1");
    assert_eq!(stats[1][1], "1");
    let average: f64 = stats[1][2].parse().expect("average should be numeric");
    assert!((average - 50.0).abs() < f64::EPSILON);
}
