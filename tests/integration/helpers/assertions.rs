//! Custom assertion helpers for integration tests.
//!
//! These helpers read back the aux tags and stats files the pipeline writes
//! so command tests can assert on them without repeating extraction code.

#![allow(dead_code)]

use std::path::Path;

use noodles::sam::alignment::record_buf::RecordBuf;
use noodles::sam::alignment::record_buf::data::field::Value;

use lamprey_lib::bam::record_name;

/// Returns a record's string aux tag value, if present.
pub fn tag_string(record: &RecordBuf, tag: [u8; 2]) -> Option<String> {
    match record.data().get(&tag) {
        Some(Value::String(s)) => Some(String::from_utf8_lossy(s.as_ref()).into_owned()),
        _ => None,
    }
}

/// Returns a record's integer aux tag value, widened to i64, if present.
pub fn tag_int(record: &RecordBuf, tag: [u8; 2]) -> Option<i64> {
    match record.data().get(&tag)? {
        Value::Int8(v) => Some(i64::from(*v)),
        Value::UInt8(v) => Some(i64::from(*v)),
        Value::Int16(v) => Some(i64::from(*v)),
        Value::UInt16(v) => Some(i64::from(*v)),
        Value::Int32(v) => Some(i64::from(*v)),
        Value::UInt32(v) => Some(i64::from(*v)),
        _ => None,
    }
}

/// Returns the sorted read names of a record set.
pub fn sorted_names(records: &[RecordBuf]) -> Vec<String> {
    let mut names: Vec<String> = records.iter().map(record_name).collect();
    names.sort_unstable();
    names
}

/// Asserts that a record carries the expected `BC` barcode annotation.
///
/// # Panics
///
/// Panics if the tag is missing or differs.
pub fn assert_barcode(record: &RecordBuf, expected: &str) {
    let barcode = tag_string(record, *b"BC");
    assert_eq!(
        barcode.as_deref(),
        Some(expected),
        "BC tag mismatch for record {}",
        record_name(record)
    );
}

/// Reads a TSV file into rows of fields.
///
/// # Panics
///
/// Panics if the file cannot be read.
pub fn read_tsv(path: &Path) -> Vec<Vec<String>> {
    std::fs::read_to_string(path)
        .expect("failed to read TSV")
        .lines()
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}
