//! Utilities for generating synthetic nanopore reads and BAM files.
//!
//! The read shapes here mirror what a basecaller emits: a sequence plus the
//! signal, move table, and pore metadata the pipeline stages key on. BAM
//! round trips go through the same tag conventions the binary uses.

#![allow(dead_code)]

use std::path::Path;

use noodles::sam::Header;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record_buf::RecordBuf;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lamprey_lib::bam::{create_bam_reader, create_bam_writer, finish_bam_writer, read_to_record};
use lamprey_lib::dna::reverse_complement;
use lamprey_lib::kits::KitRegistry;
use lamprey_lib::read::Read;

/// Generates a random DNA sequence of the given length.
pub fn random_seq(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
}

/// Deterministic non-barcode filler; never matches a kit arrangement or
/// adapter, so classifier and detector outcomes stay fixed.
pub fn filler(len: usize) -> Vec<u8> {
    let cycle = b"GACTGACTTGCA";
    (0..len).map(|i| cycle[i % cycle.len()]).collect()
}

/// A minimal read carrying full pore metadata, for pairing-cache tests.
///
/// 100 bp of `A` at q10, mux 1, on the shared `run0`/`FC000` acquisition,
/// lasting 500 ms from `start_time_ms`.
pub fn pore_read(id: &str, channel: u32, start_time_ms: u64) -> Read {
    let mut read = Read::new(id, vec![b'A'; 100], vec![b'+'; 100]);
    read.channel = channel;
    read.mux = 1;
    read.run_id = "run0".to_string();
    read.flowcell_id = "FC000".to_string();
    read.start_time_ms = start_time_ms;
    read.duration_ms = 500;
    read
}

/// A template/complement pair that both pairs and stereo-merges cleanly.
///
/// Both strands sit on channel 3 of `run0`/`FC000`; the complement is the
/// exact reverse complement and starts 50 ms after the template ends, which
/// satisfies the immediate-accept pairing heuristic. Move tables are one
/// base per sample so the stereo encoder can anchor every merged base.
pub fn duplex_strands(seed: u64) -> (Read, Read) {
    let mut rng = StdRng::seed_from_u64(seed);
    let seq = random_seq(&mut rng, 2000);

    let mut template = strand_read("tmpl", &seq, 0.0);
    template.start_time_ms = 1000;

    let mut complement = strand_read("cmpl", &reverse_complement(&seq), 10_000.0);
    complement.start_time_ms = 3050;

    (template, complement)
}

/// A full-length strand on channel 3: one base per move entry, signal
/// counting up from `signal_offset`, uniform q4 qualities, 2000 ms long.
pub fn strand_read(id: &str, seq: &[u8], signal_offset: f32) -> Read {
    let mut read = Read::new(id, seq.to_vec(), vec![b'%'; seq.len()]);
    read.model_stride = 1;
    read.moves = vec![1; seq.len()];
    read.signal = (0..seq.len()).map(|i| signal_offset + i as f32).collect();
    read.channel = 3;
    read.mux = 1;
    read.run_id = "run0".to_string();
    read.flowcell_id = "FC000".to_string();
    read.duration_ms = 2000;
    read
}

/// A read opening with the full front barcode arrangement of `kit_name`,
/// followed by `insert_len` bases of filler.
pub fn barcoded_read(id: &str, kit_name: &str, barcode: &str, insert_len: usize) -> Read {
    let registry = KitRegistry::built_in();
    let kit = registry.kit(kit_name).expect("kit should be built in");
    let mut seq = Vec::new();
    seq.extend_from_slice(kit.top_front_flank.as_bytes());
    seq.extend_from_slice(
        registry.barcode_sequence(barcode).expect("barcode should be built in").as_bytes(),
    );
    seq.extend_from_slice(kit.top_rear_flank.as_bytes());
    seq.extend_from_slice(&filler(insert_len));
    let qstring = vec![b'%'; seq.len()];
    Read::new(id, seq, qstring)
}

/// A read whose signal opens with a 50-base polyA/polyT tail.
///
/// 100 `T` bases over 600 samples (six per base); the first 300 samples sit
/// flat at 0.8 (the tail plateau) and the rest alternate sharply, so an RNA
/// tail search finds exactly 50 bases.
pub fn polya_read(id: &str) -> Read {
    let mut read = Read::new(id, vec![b'T'; 100], vec![b'%'; 100]);
    let mut signal = vec![0.8f32; 300];
    for i in 0..300 {
        signal.push(if i % 2 == 0 { 3.0 } else { -3.0 });
    }
    read.signal = signal;
    read
}

/// Writes reads to a headerless unmapped BAM, the way the binary emits them.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_reads_bam(path: &Path, reads: &[Read]) {
    let header = Header::default();
    let mut writer =
        create_bam_writer(path, &header, 1, 1).expect("failed to create test BAM writer");
    for read in reads {
        let record = read_to_record(read);
        writer
            .write_alignment_record(&header, &record)
            .expect("failed to write test BAM record");
    }
    finish_bam_writer(writer).expect("failed to finish test BAM");
}

/// Reads every record back from a BAM file.
///
/// # Panics
///
/// Panics if the file cannot be read.
pub fn read_back_records(path: &Path) -> Vec<RecordBuf> {
    let (mut reader, header) = create_bam_reader(path, 1).expect("failed to open test BAM");
    reader
        .record_bufs(&header)
        .map(|result| result.expect("failed to read test BAM record"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamprey_lib::demux::BarcodeClassifier;
    use tempfile::TempDir;

    #[test]
    fn test_barcoded_read_classifies_as_built() {
        let read = barcoded_read("r", "SQK-RBK004", "BC01", 400);
        let registry = KitRegistry::built_in();
        let classifier = BarcodeClassifier::new(&registry, "SQK-RBK004", false).unwrap();
        let result = classifier.classify(&read.seq);
        assert!(!result.is_unclassified());
        assert_eq!(result.barcode_name, "BC01");
    }

    #[test]
    fn test_duplex_strands_are_reverse_complements_with_small_gap() {
        let (template, complement) = duplex_strands(7);
        assert_eq!(complement.seq, reverse_complement(&template.seq));
        assert_eq!(complement.start_time_ms - template.end_time_ms(), 50);
        assert_eq!(template.move_base_count(), template.seq_len());
    }

    #[test]
    fn test_bam_round_trip_preserves_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reads.bam");
        write_reads_bam(&path, &[pore_read("a", 1, 0), pore_read("b", 2, 100)]);
        let records = read_back_records(&path);
        assert_eq!(records.len(), 2);
    }
}
