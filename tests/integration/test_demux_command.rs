//! End-to-end CLI tests for the demux command.
//!
//! These tests run the actual `lamprey demux` binary and validate barcode
//! annotation, trimming behavior, and the statistics output.

use std::collections::HashMap;
use std::process::Command;

use noodles::sam::alignment::record_buf::RecordBuf;
use tempfile::TempDir;

use crate::helpers::{
    assert_barcode, barcoded_read, filler, read_back_records, read_tsv, tag_string,
    write_reads_bam,
};
use lamprey_lib::bam::record_name;
use lamprey_lib::read::Read;

fn seq_lengths(records: &[RecordBuf]) -> HashMap<String, usize> {
    records.iter().map(|r| (record_name(r), r.sequence().as_ref().len())).collect()
}

#[test]
fn test_demux_command_annotates_and_trims() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let output_bam = temp_dir.path().join("output.bam");
    let stats_path = temp_dir.path().join("stats.tsv");

    let reads = vec![
        barcoded_read("bc01-read", "SQK-RBK004", "BC01", 600),
        barcoded_read("bc05-read", "SQK-RBK004", "BC05", 600),
        Read::new("plain-read", filler(600), vec![b'%'; 600]),
    ];
    let input_lengths: HashMap<String, usize> =
        reads.iter().map(|r| (r.id.clone(), r.seq_len())).collect();
    write_reads_bam(&input_bam, &reads);

    let status = Command::new(env!("CARGO_BIN_EXE_lamprey"))
        .args([
            "demux",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            output_bam.to_str().unwrap(),
            "--kit-name",
            "SQK-RBK004",
            "--threads",
            "2",
            "--stats",
            stats_path.to_str().unwrap(),
        ])
        .status()
        .expect("Failed to run demux command");

    assert!(status.success(), "Demux command failed");
    assert!(output_bam.exists(), "Output BAM not created");

    let records = read_back_records(&output_bam);
    assert_eq!(records.len(), 3, "Every read should be written back");

    for record in &records {
        match record_name(record).as_str() {
            "bc01-read" => assert_barcode(record, "SQK-RBK004_barcode01"),
            "bc05-read" => assert_barcode(record, "SQK-RBK004_barcode05"),
            "plain-read" => assert_barcode(record, "unclassified"),
            other => panic!("unexpected read {other}"),
        }
    }

    // Classified reads lose their barcode arrangement; unclassified reads
    // are left alone.
    let output_lengths = seq_lengths(&records);
    assert!(output_lengths["bc01-read"] < input_lengths["bc01-read"]);
    assert!(output_lengths["bc05-read"] < input_lengths["bc05-read"]);
    assert_eq!(output_lengths["plain-read"], input_lengths["plain-read"]);

    let rows = read_tsv(&stats_path);
    assert_eq!(rows[0], vec!["reads", "classified", "unclassified", "trimmed"]);
    assert_eq!(rows[1], vec!["3", "2", "1", "2"]);
}

#[test]
fn test_demux_command_no_trim_preserves_sequences() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let output_bam = temp_dir.path().join("output.bam");

    let reads = vec![
        barcoded_read("bc01-read", "SQK-RBK004", "BC01", 500),
        Read::new("plain-read", filler(500), vec![b'%'; 500]),
    ];
    let input_lengths: HashMap<String, usize> =
        reads.iter().map(|r| (r.id.clone(), r.seq_len())).collect();
    write_reads_bam(&input_bam, &reads);

    let status = Command::new(env!("CARGO_BIN_EXE_lamprey"))
        .args([
            "demux",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            output_bam.to_str().unwrap(),
            "--kit-name",
            "SQK-RBK004",
            "--no-trim",
            "--threads",
            "2",
        ])
        .status()
        .expect("Failed to run demux command");

    assert!(status.success(), "Demux command failed");

    let records = read_back_records(&output_bam);
    assert_eq!(records.len(), 2);
    let output_lengths = seq_lengths(&records);
    for record in &records {
        let name = record_name(record);
        assert_eq!(output_lengths[&name], input_lengths[&name], "{name} was trimmed");
        assert!(tag_string(record, *b"BC").is_some(), "{name} missing BC tag");
    }
}

#[test]
fn test_demux_command_double_ended_kit() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let output_bam = temp_dir.path().join("output.bam");

    let reads = vec![barcoded_read("rpb-read", "SQK-RPB004", "BC01", 700)];
    write_reads_bam(&input_bam, &reads);

    let status = Command::new(env!("CARGO_BIN_EXE_lamprey"))
        .args([
            "demux",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            output_bam.to_str().unwrap(),
            "--kit-name",
            "SQK-RPB004",
            "--threads",
            "1",
        ])
        .status()
        .expect("Failed to run demux command");

    assert!(status.success(), "Demux command failed");

    let records = read_back_records(&output_bam);
    assert_eq!(records.len(), 1);
    assert_barcode(&records[0], "SQK-RPB004_barcode01");
}
