//! Error path tests for the lamprey binary.
//!
//! These tests verify that bad inputs fail with a non-zero exit status
//! instead of panicking or producing partial output.

use std::fs;
use std::process::Command;

use tempfile::TempDir;

use crate::helpers::{pore_read, write_reads_bam};

fn lamprey() -> Command {
    Command::new(env!("CARGO_BIN_EXE_lamprey"))
}

#[test]
fn test_missing_input_bam_fails() {
    let temp_dir = TempDir::new().unwrap();
    let output_bam = temp_dir.path().join("output.bam");

    let status = lamprey()
        .args([
            "demux",
            "--input",
            "/no/such/input.bam",
            "--output",
            output_bam.to_str().unwrap(),
            "--kit-name",
            "SQK-RBK004",
        ])
        .status()
        .expect("Failed to run demux command");

    assert!(!status.success(), "Missing input should fail");
}

#[test]
fn test_unknown_kit_fails() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let output_bam = temp_dir.path().join("output.bam");
    write_reads_bam(&input_bam, &[pore_read("r", 1, 0)]);

    let status = lamprey()
        .args([
            "demux",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            output_bam.to_str().unwrap(),
            "--kit-name",
            "NOT-A-KIT",
        ])
        .status()
        .expect("Failed to run demux command");

    assert!(!status.success(), "Unknown kit should fail");
}

#[test]
fn test_demux_requires_a_kit() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let output_bam = temp_dir.path().join("output.bam");
    write_reads_bam(&input_bam, &[pore_read("r", 1, 0)]);

    let status = lamprey()
        .args([
            "demux",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            output_bam.to_str().unwrap(),
        ])
        .status()
        .expect("Failed to run demux command");

    assert!(!status.success(), "Demux without a kit should fail");
}

#[test]
fn test_duplex_missing_pair_map_fails() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let output_bam = temp_dir.path().join("output.bam");
    write_reads_bam(&input_bam, &[pore_read("r", 1, 0)]);

    let status = lamprey()
        .args([
            "duplex",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            output_bam.to_str().unwrap(),
            "--pair-map",
            temp_dir.path().join("missing.tsv").to_str().unwrap(),
        ])
        .status()
        .expect("Failed to run duplex command");

    assert!(!status.success(), "Missing pair map should fail");
}

#[test]
fn test_duplex_malformed_pair_map_fails() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let output_bam = temp_dir.path().join("output.bam");
    let pair_map = temp_dir.path().join("pairs.tsv");
    write_reads_bam(&input_bam, &[pore_read("r", 1, 0)]);
    fs::write(&pair_map, "not_a_template\tnot_a_complement\nx\ty\n").unwrap();

    let status = lamprey()
        .args([
            "duplex",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            output_bam.to_str().unwrap(),
            "--pair-map",
            pair_map.to_str().unwrap(),
        ])
        .status()
        .expect("Failed to run duplex command");

    assert!(!status.success(), "Malformed pair map should fail");
}

#[test]
fn test_invalid_bam_input_fails() {
    let temp_dir = TempDir::new().unwrap();
    let input_bam = temp_dir.path().join("input.bam");
    let output_bam = temp_dir.path().join("output.bam");
    fs::write(&input_bam, "this is not a BAM file\n").unwrap();

    let status = lamprey()
        .args([
            "polya",
            "--input",
            input_bam.to_str().unwrap(),
            "--output",
            output_bam.to_str().unwrap(),
        ])
        .status()
        .expect("Failed to run polya command");

    assert!(!status.success(), "Invalid BAM input should fail");
}
