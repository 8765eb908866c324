//! Benchmarks for the alignment and classification hot paths.
//!
//! Run with: `cargo bench`
//! View reports in: `target/criterion/report/index.html`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use lamprey_lib::align::{EditMode, OverlapScratch, Wildcards, edit_align, edit_distance, map_overlaps};
use lamprey_lib::demux::BarcodeClassifier;
use lamprey_lib::kits::KitRegistry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_seq(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
}

/// Copies `seq` with one substitution every `every` bases.
fn with_errors(seq: &[u8], every: usize) -> Vec<u8> {
    seq.iter()
        .enumerate()
        .map(|(i, &base)| if i % every == every - 1 { b"TGCA"[(base as usize) % 4] } else { base })
        .collect()
}

/// Benchmark edit distance without a trace
fn bench_edit_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("edit_distance");
    let mut rng = StdRng::seed_from_u64(42);

    // Global mode at barcode-scoring sizes: a padded candidate against the
    // extracted mask window.
    for len in [24_usize, 32, 48] {
        let query = random_seq(&mut rng, len);
        let target = with_errors(&query, 12);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(
            BenchmarkId::new("global", len),
            &(query, target),
            |b, (query, target)| {
                b.iter(|| {
                    black_box(edit_distance(
                        black_box(query),
                        black_box(target),
                        EditMode::Global,
                        &Wildcards::none(),
                    ))
                });
            },
        );
    }

    // Semi-global mode at flank-placement sizes: a short context somewhere
    // inside a read-end window.
    for window_len in [150_usize, 175, 250] {
        let context = random_seq(&mut rng, 50);
        let mut window = random_seq(&mut rng, window_len);
        let errored = with_errors(&context, 20);
        window[40..40 + errored.len()].copy_from_slice(&errored);
        group.throughput(Throughput::Bytes(window_len as u64));
        group.bench_with_input(
            BenchmarkId::new("semiglobal", window_len),
            &(context, window),
            |b, (context, window)| {
                b.iter(|| {
                    black_box(edit_distance(
                        black_box(context),
                        black_box(window),
                        EditMode::SemiGlobal,
                        &Wildcards::none(),
                    ))
                });
            },
        );
    }

    group.finish();
}

/// Benchmark edit alignment with a full trace
fn bench_edit_trace(c: &mut Criterion) {
    let mut group = c.benchmark_group("edit_trace");
    let mut rng = StdRng::seed_from_u64(43);

    // Flank placement: an N-masked context inside a read-end window, with
    // the wildcard set the classifiers use.
    let wildcard_pairs = [
        (b'N', b'A'),
        (b'N', b'T'),
        (b'N', b'C'),
        (b'N', b'G'),
        (b'N', b'U'),
        (b'M', b'A'),
        (b'M', b'C'),
    ];
    let wildcards = Wildcards::new(&wildcard_pairs);
    let front = random_seq(&mut rng, 24);
    let rear = random_seq(&mut rng, 20);
    let barcode = random_seq(&mut rng, 24);
    let mut context = front.clone();
    context.extend(std::iter::repeat(b'N').take(barcode.len()));
    context.extend_from_slice(&rear);
    let mut window = random_seq(&mut rng, 175);
    let mut arrangement = front;
    arrangement.extend_from_slice(&barcode);
    arrangement.extend_from_slice(&rear);
    window[30..30 + arrangement.len()].copy_from_slice(&arrangement);

    group.throughput(Throughput::Bytes(window.len() as u64));
    group.bench_with_input(
        BenchmarkId::new("flank_placement", window.len()),
        &(context, window),
        |b, (context, window)| {
            b.iter(|| {
                black_box(edit_align(
                    black_box(context),
                    black_box(window),
                    EditMode::SemiGlobal,
                    &wildcards,
                ))
            });
        },
    );

    // Strand merging: two full reads of the same molecule, traced end to
    // end. Sizes bracket typical nanopore read lengths for stereo input.
    for len in [250_usize, 500, 1000] {
        let template = random_seq(&mut rng, len);
        let complement = with_errors(&template, 20);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(
            BenchmarkId::new("strand_merge", len),
            &(template, complement),
            |b, (template, complement)| {
                b.iter(|| {
                    black_box(edit_align(
                        black_box(template),
                        black_box(complement),
                        EditMode::Global,
                        &Wildcards::none(),
                    ))
                });
            },
        );
    }

    group.finish();
}

/// Benchmark minimizer overlap mapping
fn bench_overlap_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("overlap_mapping");
    let mut rng = StdRng::seed_from_u64(44);

    for len in [500_usize, 2000, 5000] {
        let target = random_seq(&mut rng, len);
        // Query covers most of the target with sequencing-rate errors.
        let query = with_errors(&target[len / 10..], 25);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(
            BenchmarkId::new("map_overlaps", len),
            &(target, query),
            |b, (target, query)| {
                let mut scratch = OverlapScratch::new();
                b.iter(|| {
                    black_box(map_overlaps(black_box(target), black_box(query), &mut scratch))
                });
            },
        );
    }

    group.finish();
}

/// Builds a read carrying the kit's front arrangement followed by a random
/// insert.
fn barcoded_read(registry: &KitRegistry, kit: &str, barcode: &str, insert: usize) -> Vec<u8> {
    let kit = registry.kit(kit).unwrap();
    let mut rng = StdRng::seed_from_u64(45);
    let mut seq = Vec::new();
    seq.extend_from_slice(kit.top_front_flank.as_bytes());
    seq.extend_from_slice(registry.barcode_sequence(barcode).unwrap().as_bytes());
    seq.extend_from_slice(kit.top_rear_flank.as_bytes());
    seq.extend_from_slice(&random_seq(&mut rng, insert));
    seq
}

/// Benchmark end-to-end barcode classification
fn bench_barcode_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("barcode_classification");
    group.sample_size(50);
    let registry = KitRegistry::built_in();

    let single = BarcodeClassifier::new(&registry, "SQK-RBK004", false).unwrap();
    let double = BarcodeClassifier::new(&registry, "SQK-RPB004", false).unwrap();

    let hit = barcoded_read(&registry, "SQK-RBK004", "BC05", 1000);
    group.throughput(Throughput::Elements(1));
    group.bench_with_input(BenchmarkId::new("single_end", "hit"), &hit, |b, seq| {
        b.iter(|| black_box(single.classify(black_box(seq))));
    });

    let mut rng = StdRng::seed_from_u64(46);
    let miss = random_seq(&mut rng, 1000);
    group.bench_with_input(BenchmarkId::new("single_end", "miss"), &miss, |b, seq| {
        b.iter(|| black_box(single.classify(black_box(seq))));
    });

    // Double-ended kits place two flank contexts and score every candidate
    // against both ends.
    let double_hit = barcoded_read(&registry, "SQK-RPB004", "BC05", 1000);
    group.bench_with_input(BenchmarkId::new("double_ends", "hit"), &double_hit, |b, seq| {
        b.iter(|| black_box(double.classify(black_box(seq))));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_edit_distance,
    bench_edit_trace,
    bench_overlap_mapping,
    bench_barcode_classification,
);
criterion_main!(benches);
