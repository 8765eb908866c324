//! BAM I/O and aux-tag conversion between records and [`Read`]s.
//!
//! Basecalled reads arrive as unaligned BAM records whose aux tags carry the
//! signal-space metadata: the move table (`mv`, stride first), raw calibrated
//! signal samples (`sr`), trimmed-sample and sample counts (`ts`, `ns`),
//! acquisition coordinates (`ch`, `mx`, `RD`, `fc`) and timing (`sm`
//! milliseconds, or an ISO 8601 `st` which is parsed down to milliseconds).
//! Annotations produced here are `BC` (barcode) and `pt` (polyA tail length).
//!
//! File access goes through enum-wrapped BGZF readers/writers so commands can
//! switch between single-threaded and multithreaded compression without
//! changing types downstream.

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::num::NonZero;
use std::path::Path;

use anyhow::Context;
use bstr::BString;
use noodles::bgzf::{
    MultithreadedReader, MultithreadedWriter, Reader as BgzfReader, Writer as BgzfWriter,
    multithreaded_writer, writer::CompressionLevel,
};
use noodles::sam::Header;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::data::field::value::Array;
use noodles::sam::alignment::record_buf::{QualityScores, RecordBuf, Sequence};

use crate::errors::{LampreyError, Result};
use crate::read::Read;

/// Offset between raw phred scores and the ASCII quality string.
pub const PHRED_OFFSET: u8 = 33;

/// Move table, stride as the first element (`mv:B:c`).
pub const TAG_MOVES: [u8; 2] = *b"mv";
/// Raw calibrated signal samples (`sr:B:f`).
pub const TAG_SIGNAL: [u8; 2] = *b"sr";
/// Signal samples trimmed from the front (`ts:i`).
pub const TAG_TRIMMED_SAMPLES: [u8; 2] = *b"ts";
/// Total signal samples including trimmed ones (`ns:i`).
pub const TAG_NUM_SAMPLES: [u8; 2] = *b"ns";
/// Flow cell channel (`ch:i`).
pub const TAG_CHANNEL: [u8; 2] = *b"ch";
/// Mux within the channel (`mx:i`).
pub const TAG_MUX: [u8; 2] = *b"mx";
/// Acquisition start time in milliseconds (`sm:i`).
pub const TAG_START_TIME_MS: [u8; 2] = *b"sm";
/// Acquisition start time as ISO 8601 text (`st:Z`).
pub const TAG_START_TIME_ISO: [u8; 2] = *b"st";
/// Acquisition duration in seconds (`du:f`).
pub const TAG_DURATION: [u8; 2] = *b"du";
/// Acquisition run id (`RD:Z`).
pub const TAG_RUN_ID: [u8; 2] = *b"RD";
/// Flow cell id (`fc:Z`).
pub const TAG_FLOWCELL: [u8; 2] = *b"fc";
/// Mean basecall qscore (`qs:i`).
pub const TAG_MEAN_QSCORE: [u8; 2] = *b"qs";
/// Modified-base calls (`MM:Z`).
pub const TAG_MODBASE_STRING: [u8; 2] = *b"MM";
/// Modified-base probabilities (`ML:B:C`).
pub const TAG_MODBASE_PROBS: [u8; 2] = *b"ML";
/// Barcode classification (`BC:Z`), written by the demux node.
pub const TAG_BARCODE: [u8; 2] = *b"BC";
/// PolyA tail length in bases (`pt:i`), written by the polyA node.
pub const TAG_POLYA_LENGTH: [u8; 2] = *b"pt";

/// BGZF reader that is either single-threaded or multi-threaded.
pub enum BgzfReaderEnum {
    /// Single-threaded BGZF decompression.
    SingleThreaded(BgzfReader<File>),
    /// Multi-threaded BGZF decompression.
    MultiThreaded(MultithreadedReader<File>),
}

impl io::Read for BgzfReaderEnum {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::SingleThreaded(reader) => reader.read(buf),
            Self::MultiThreaded(reader) => reader.read(buf),
        }
    }
}

impl BufRead for BgzfReaderEnum {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Self::SingleThreaded(reader) => reader.fill_buf(),
            Self::MultiThreaded(reader) => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::SingleThreaded(reader) => reader.consume(amt),
            Self::MultiThreaded(reader) => reader.consume(amt),
        }
    }
}

/// BGZF writer that is either single-threaded or multi-threaded.
pub enum BgzfWriterEnum {
    /// Single-threaded BGZF compression.
    SingleThreaded(BgzfWriter<File>),
    /// Multi-threaded BGZF compression.
    MultiThreaded(MultithreadedWriter<File>),
}

impl BgzfWriterEnum {
    /// Flushes pending blocks and writes the BGZF EOF marker.
    pub fn finish(self) -> io::Result<()> {
        match self {
            Self::SingleThreaded(writer) => {
                writer.finish()?;
                Ok(())
            }
            Self::MultiThreaded(mut writer) => {
                writer.finish()?;
                Ok(())
            }
        }
    }
}

impl Write for BgzfWriterEnum {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::SingleThreaded(writer) => writer.write(buf),
            Self::MultiThreaded(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::SingleThreaded(writer) => writer.flush(),
            Self::MultiThreaded(writer) => writer.flush(),
        }
    }
}

/// BAM reader over an enum-wrapped BGZF stream.
pub type BamReader = noodles::bam::io::Reader<BgzfReaderEnum>;

/// BAM writer over an enum-wrapped BGZF stream.
pub type BamWriter = noodles::bam::io::Writer<BgzfWriterEnum>;

/// Check if a path refers to stdin.
///
/// Returns true if the path is "-" or "/dev/stdin".
pub fn is_stdin_path<P: AsRef<Path>>(path: P) -> bool {
    let path_str = path.as_ref().to_string_lossy();
    path_str == "-" || path_str == "/dev/stdin"
}

/// Check if a path refers to stdout.
///
/// Returns true if the path is "-" or "/dev/stdout".
pub fn is_stdout_path<P: AsRef<Path>>(path: P) -> bool {
    let path_str = path.as_ref().to_string_lossy();
    path_str == "-" || path_str == "/dev/stdout"
}

/// Create a BAM reader and read the header in one operation.
///
/// `threads > 1` enables multi-threaded BGZF decompression. `-` reads from
/// stdin.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the header cannot be read.
///
/// # Panics
///
/// Panics if `threads > 1` but `NonZero::new` fails (should not happen).
pub fn create_bam_reader<P: AsRef<Path>>(
    path: P,
    threads: usize,
) -> anyhow::Result<(BamReader, Header)> {
    let path_ref = path.as_ref();
    let path_ref = if is_stdin_path(path_ref) { Path::new("/dev/stdin") } else { path_ref };
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open input BAM: {}", path_ref.display()))?;

    let bgzf_reader = if threads > 1 {
        let worker_count = NonZero::new(threads).expect("threads > 1 checked above");
        BgzfReaderEnum::MultiThreaded(MultithreadedReader::with_worker_count(worker_count, file))
    } else {
        BgzfReaderEnum::SingleThreaded(BgzfReader::new(file))
    };

    let mut reader = noodles::bam::io::Reader::from(bgzf_reader);
    let header = reader
        .read_header()
        .with_context(|| format!("Failed to read header from: {}", path_ref.display()))?;
    Ok((reader, header))
}

/// Create a BAM writer and write the header in one operation.
///
/// `threads > 1` enables multi-threaded BGZF compression at
/// `compression_level`; the single-threaded writer uses the default level.
/// `-` writes to stdout.
///
/// # Errors
///
/// Returns an error if the file cannot be created or the header cannot be
/// written.
///
/// # Panics
///
/// Panics if `threads > 1` but `NonZero::new` fails (should not happen).
pub fn create_bam_writer<P: AsRef<Path>>(
    path: P,
    header: &Header,
    threads: usize,
    compression_level: u32,
) -> anyhow::Result<BamWriter> {
    let path_ref = path.as_ref();
    let path_ref = if is_stdout_path(path_ref) { Path::new("/dev/stdout") } else { path_ref };
    let file = File::create(path_ref)
        .with_context(|| format!("Failed to create output BAM: {}", path_ref.display()))?;

    let bgzf_writer = if threads > 1 {
        let worker_count = NonZero::new(threads).expect("threads > 1 checked above");
        let mut builder = multithreaded_writer::Builder::default().set_worker_count(worker_count);
        if let Some(level) = CompressionLevel::new(compression_level as u8) {
            builder = builder.set_compression_level(level);
        }
        BgzfWriterEnum::MultiThreaded(builder.build_from_writer(file))
    } else {
        BgzfWriterEnum::SingleThreaded(BgzfWriter::new(file))
    };

    let mut writer = noodles::bam::io::Writer::from(bgzf_writer);
    writer
        .write_header(header)
        .with_context(|| format!("Failed to write header to: {}", path_ref.display()))?;
    Ok(writer)
}

/// Flushes and finalizes a BAM writer, including the BGZF EOF marker.
///
/// # Errors
///
/// Returns an error when the final blocks cannot be written.
pub fn finish_bam_writer(writer: BamWriter) -> anyhow::Result<()> {
    writer.into_inner().finish().context("Failed to finalize output BAM")
}

/// The record's name, or `<unnamed>` when it has none.
#[must_use]
pub fn record_name(record: &RecordBuf) -> String {
    record
        .name()
        .map_or_else(|| "<unnamed>".to_string(), |n| String::from_utf8_lossy(n.as_ref()).into_owned())
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int8(v) => Some(i64::from(*v)),
        Value::UInt8(v) => Some(i64::from(*v)),
        Value::Int16(v) => Some(i64::from(*v)),
        Value::UInt16(v) => Some(i64::from(*v)),
        Value::Int32(v) => Some(i64::from(*v)),
        Value::UInt32(v) => Some(i64::from(*v)),
        _ => None,
    }
}

pub(crate) fn aux_i64(record: &RecordBuf, tag: [u8; 2]) -> Option<i64> {
    record.data().get(&tag).and_then(value_as_i64)
}

pub(crate) fn aux_f32(record: &RecordBuf, tag: [u8; 2]) -> Option<f32> {
    match record.data().get(&tag) {
        Some(Value::Float(v)) => Some(*v),
        _ => None,
    }
}

pub(crate) fn aux_string(record: &RecordBuf, tag: [u8; 2]) -> Option<String> {
    match record.data().get(&tag) {
        Some(Value::String(s)) => Some(String::from_utf8_lossy(s.as_ref()).into_owned()),
        _ => None,
    }
}

/// Extracts the move table from a record's `mv` tag.
///
/// The first array element is the model stride, the rest are the per-block
/// move flags. Returns `Ok(None)` when the tag is absent.
///
/// # Errors
///
/// Returns [`LampreyError::InconsistentRead`] when the tag has the wrong
/// type, is empty, declares a non-positive stride, or contains flags other
/// than 0/1.
pub fn moves_from_record(record: &RecordBuf) -> Result<Option<(usize, Vec<u8>)>> {
    let Some(value) = record.data().get(&TAG_MOVES) else {
        return Ok(None);
    };
    let raw: Vec<i8> = match value {
        Value::Array(Array::Int8(values)) => values.clone(),
        Value::Array(Array::UInt8(values)) => values.iter().map(|&v| v as i8).collect(),
        _ => {
            return Err(LampreyError::InconsistentRead {
                read_id: record_name(record),
                reason: "mv tag is not an int8 array".to_string(),
            });
        }
    };
    let Some((&stride, flags)) = raw.split_first() else {
        return Err(LampreyError::InconsistentRead {
            read_id: record_name(record),
            reason: "mv tag is empty".to_string(),
        });
    };
    if stride <= 0 {
        return Err(LampreyError::InconsistentRead {
            read_id: record_name(record),
            reason: format!("mv tag declares stride {stride}"),
        });
    }
    if flags.iter().any(|&m| m != 0 && m != 1) {
        return Err(LampreyError::InconsistentRead {
            read_id: record_name(record),
            reason: "mv tag contains flags other than 0/1".to_string(),
        });
    }
    Ok(Some((stride as usize, flags.iter().map(|&m| m as u8).collect())))
}

/// Replaces the record's `mv` tag with the given stride and move flags.
pub fn set_moves(record: &mut RecordBuf, model_stride: usize, moves: &[u8]) {
    let mut raw: Vec<i8> = Vec::with_capacity(moves.len() + 1);
    raw.push(model_stride as i8);
    raw.extend(moves.iter().map(|&m| m as i8));
    record.data_mut().insert(Tag::from(TAG_MOVES), Value::Array(Array::Int8(raw)));
}

/// Sets the `BC:Z` barcode annotation.
pub fn set_barcode(record: &mut RecordBuf, value: &str) {
    record.data_mut().insert(Tag::from(TAG_BARCODE), Value::from(value));
}

/// Sets the `pt:i` polyA tail length annotation.
pub fn set_polya_length(record: &mut RecordBuf, bases: i32) {
    record.data_mut().insert(Tag::from(TAG_POLYA_LENGTH), Value::from(bases));
}

/// Mean qscore of an ASCII phred+33 quality string.
///
/// Averaged in error-probability space, the way basecallers report it.
#[must_use]
pub fn mean_qscore(qstring: &[u8]) -> f32 {
    if qstring.is_empty() {
        return 0.0;
    }
    let total: f64 = qstring
        .iter()
        .map(|&c| {
            let q = f64::from(c.saturating_sub(PHRED_OFFSET));
            10f64.powf(-q / 10.0)
        })
        .sum();
    let mean_error = (total / qstring.len() as f64).max(1e-10);
    (-10.0 * mean_error.log10()) as f32
}

// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let doy = i64::from((153 * ((month + 9) % 12) + 2) / 5 + day - 1);
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Parses an ISO 8601 timestamp (`YYYY-MM-DDTHH:MM:SS[.frac][Z|±HH[:MM]]`)
/// to milliseconds since the epoch. Sub-second precision beyond milliseconds
/// is dropped; times before the epoch return `None`.
fn parse_iso8601_ms(text: &str) -> Option<u64> {
    let bytes = text.as_bytes();
    if bytes.len() < 19
        || bytes[4] != b'-'
        || bytes[7] != b'-'
        || (bytes[10] != b'T' && bytes[10] != b' ')
        || bytes[13] != b':'
        || bytes[16] != b':'
    {
        return None;
    }
    let year: i64 = text.get(0..4)?.parse().ok()?;
    let month: u32 = text.get(5..7)?.parse().ok()?;
    let day: u32 = text.get(8..10)?.parse().ok()?;
    let hour: i64 = text.get(11..13)?.parse().ok()?;
    let minute: i64 = text.get(14..16)?.parse().ok()?;
    let second: i64 = text.get(17..19)?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || minute > 59 {
        return None;
    }
    // Leap seconds clamp to the end of the minute.
    let second = second.min(59);

    let mut rest = &text[19..];
    let mut frac_ms: i64 = 0;
    if let Some(digits) = rest.strip_prefix('.') {
        let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
        let (frac, tail) = digits.split_at(end);
        if frac.is_empty() {
            return None;
        }
        let ms_digits = &frac[..frac.len().min(3)];
        frac_ms = ms_digits.parse::<i64>().ok()?;
        for _ in ms_digits.len()..3 {
            frac_ms *= 10;
        }
        rest = tail;
    }

    let offset_minutes: i64 = match rest {
        "" | "Z" | "z" => 0,
        _ => {
            let sign = match rest.as_bytes()[0] {
                b'+' => 1,
                b'-' => -1,
                _ => return None,
            };
            let body = &rest[1..];
            let (hours, minutes) = match body.split_once(':') {
                Some((h, m)) => (h, m),
                None if body.len() == 4 => body.split_at(2),
                None => (body, "0"),
            };
            let hours: i64 = hours.parse().ok()?;
            let minutes: i64 = minutes.parse().ok()?;
            sign * (hours * 60 + minutes)
        }
    };

    let days = days_from_civil(year, month, day);
    let total_ms =
        (days * 86_400 + hour * 3_600 + minute * 60 + second) * 1_000 + frac_ms
            - offset_minutes * 60_000;
    u64::try_from(total_ms).ok()
}

/// Builds a [`Read`] from an unaligned BAM record's aux tags.
///
/// Absent optional tags leave the corresponding fields at their defaults;
/// `sm` takes precedence over `st` for the start time.
///
/// # Errors
///
/// Returns [`LampreyError::InconsistentRead`] when the record has no name,
/// the `mv` tag is malformed, or the decoded arrays are mutually
/// inconsistent (move-table base count vs sequence length).
pub fn record_to_read(record: &RecordBuf) -> Result<Read> {
    let id = record
        .name()
        .map(|n| String::from_utf8_lossy(n.as_ref()).into_owned())
        .ok_or_else(|| LampreyError::InconsistentRead {
            read_id: "<unnamed>".to_string(),
            reason: "record has no read name".to_string(),
        })?;

    let seq = record.sequence().as_ref().to_vec();
    let qstring: Vec<u8> =
        record.quality_scores().as_ref().iter().map(|&q| q.saturating_add(PHRED_OFFSET)).collect();
    let mut read = Read::new(id, seq, qstring);

    if let Some((stride, moves)) = moves_from_record(record)? {
        read.model_stride = stride;
        read.moves = moves;
    }
    if let Some(Value::Array(Array::Float(samples))) = record.data().get(&TAG_SIGNAL) {
        read.signal = samples.clone();
    }
    read.num_trimmed_samples =
        aux_i64(record, TAG_TRIMMED_SAMPLES).map_or(0, |v| v.max(0) as u64);
    read.channel = aux_i64(record, TAG_CHANNEL).map_or(0, |v| v.max(0) as u32);
    read.mux = aux_i64(record, TAG_MUX).map_or(0, |v| v.clamp(0, 255) as u8);
    read.start_time_ms = aux_i64(record, TAG_START_TIME_MS).map(|v| v.max(0) as u64).or_else(
        || aux_string(record, TAG_START_TIME_ISO).and_then(|s| parse_iso8601_ms(&s)),
    )
    .unwrap_or(0);
    read.duration_ms = aux_f32(record, TAG_DURATION)
        .map_or(0, |seconds| (f64::from(seconds) * 1000.0).round().max(0.0) as u64);
    read.run_id = aux_string(record, TAG_RUN_ID).unwrap_or_default();
    read.flowcell_id = aux_string(record, TAG_FLOWCELL).unwrap_or_default();
    read.barcode = aux_string(record, TAG_BARCODE);
    read.polya_tail_length = aux_i64(record, TAG_POLYA_LENGTH).map(|v| v as i32);

    read.validate()?;
    Ok(read)
}

/// Builds an unaligned BAM record from a [`Read`], writing the aux-tag set
/// this crate maintains (`mv`, `sr`, `ts`, `ns`, `ch`, `mx`, `sm`, `du`,
/// `RD`, `fc`, `qs`, plus `BC`/`pt` when annotated).
#[must_use]
pub fn read_to_record(read: &Read) -> RecordBuf {
    let quals: Vec<u8> = read.qstring.iter().map(|&c| c.saturating_sub(PHRED_OFFSET)).collect();
    let mut record = RecordBuf::builder()
        .set_name(BString::from(read.id.as_str()))
        .set_flags(Flags::UNMAPPED)
        .set_sequence(Sequence::from(read.seq.clone()))
        .set_quality_scores(QualityScores::from(quals))
        .build();

    if !read.moves.is_empty() {
        set_moves(&mut record, read.model_stride, &read.moves);
    }
    let data = record.data_mut();
    if !read.signal.is_empty() {
        data.insert(Tag::from(TAG_SIGNAL), Value::Array(Array::Float(read.signal.clone())));
        let num_samples = read.signal.len() as u64 + read.num_trimmed_samples;
        data.insert(
            Tag::from(TAG_NUM_SAMPLES),
            Value::from(i32::try_from(num_samples).unwrap_or(i32::MAX)),
        );
    }
    data.insert(
        Tag::from(TAG_TRIMMED_SAMPLES),
        Value::from(i32::try_from(read.num_trimmed_samples).unwrap_or(i32::MAX)),
    );
    data.insert(Tag::from(TAG_CHANNEL), Value::UInt32(read.channel));
    data.insert(Tag::from(TAG_MUX), Value::from(i32::from(read.mux)));
    data.insert(
        Tag::from(TAG_START_TIME_MS),
        Value::UInt32(u32::try_from(read.start_time_ms).unwrap_or(u32::MAX)),
    );
    data.insert(Tag::from(TAG_DURATION), Value::from(read.duration_ms as f32 / 1000.0));
    if !read.run_id.is_empty() {
        data.insert(Tag::from(TAG_RUN_ID), Value::from(read.run_id.as_str()));
    }
    if !read.flowcell_id.is_empty() {
        data.insert(Tag::from(TAG_FLOWCELL), Value::from(read.flowcell_id.as_str()));
    }
    data.insert(
        Tag::from(TAG_MEAN_QSCORE),
        Value::from(mean_qscore(&read.qstring).round() as i32),
    );
    if let Some(barcode) = &read.barcode {
        data.insert(Tag::from(TAG_BARCODE), Value::from(barcode.as_str()));
    }
    if let Some(tail) = read.polya_tail_length {
        data.insert(Tag::from(TAG_POLYA_LENGTH), Value::from(tail));
    }
    record
}
