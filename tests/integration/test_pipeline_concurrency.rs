//! Concurrency tests for the pipeline nodes.
//!
//! These tests sweep worker thread counts and repeat runs to verify that
//! node output is a deterministic set (order is free to vary), that no
//! message is lost across a terminate, and that restart cycles work. Each
//! scenario runs under a timeout guard so a stalled queue fails fast
//! instead of hanging the suite.

use std::sync::Arc;
use std::time::Duration;

use crate::helpers::{barcoded_read, duplex_strands, filler, pore_read};
use lamprey_lib::demux::{BarcodeClassifier, DemuxNode};
use lamprey_lib::duplex::StereoNode;
use lamprey_lib::kits::KitRegistry;
use lamprey_lib::messages::{FlushOptions, Message};
use lamprey_lib::pairing::{PairingNode, ReadOrder};
use lamprey_lib::pipeline::{MessageSink, Pipeline, PipelineNode, VecSink};
use lamprey_lib::read::Read;

const THREAD_COUNTS: [usize; 4] = [1, 2, 4, 8];
const TEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs a scenario on its own thread, failing the test if it stalls.
fn run_with_timeout<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(TEST_TIMEOUT)
        .unwrap_or_else(|_| panic!("scenario timed out after {TEST_TIMEOUT:?}"))
}

// ============================================================================
// Demux worker pool
// ============================================================================

/// Classifies a fixed batch through a demux node and returns the sorted
/// (id, barcode) assignments.
fn classify_batch(threads: usize) -> Vec<(String, String)> {
    let registry = KitRegistry::built_in();
    let classifier = BarcodeClassifier::new(&registry, "SQK-RBK004", false).unwrap();
    let sink = Arc::new(VecSink::new());
    let node = DemuxNode::spawned(classifier, true, true, sink.clone(), threads);

    for i in 0..20 {
        node.send(Message::from(barcoded_read(&format!("bc01-{i}"), "SQK-RBK004", "BC01", 300)));
        node.send(Message::from(barcoded_read(&format!("bc05-{i}"), "SQK-RBK004", "BC05", 300)));
        node.send(Message::from(Read::new(format!("plain-{i}"), filler(300), vec![b'%'; 300])));
    }
    node.terminate(&FlushOptions::flush_all());

    assert_eq!(node.metrics().reads, 60);
    assert_eq!(node.metrics().classified, 40);
    assert_eq!(node.metrics().unclassified, 20);

    let mut assignments: Vec<(String, String)> = sink
        .take()
        .into_iter()
        .filter_map(|message| match message {
            Message::Read(read) => Some((read.id.clone(), read.barcode.clone().unwrap_or_default())),
            _ => None,
        })
        .collect();
    assignments.sort();
    assignments
}

#[test]
fn test_demux_output_is_identical_across_thread_counts() {
    let baseline = run_with_timeout(|| classify_batch(1));
    assert_eq!(baseline.len(), 60, "No message may be lost");
    assert!(baseline.contains(&("bc01-0".to_string(), "SQK-RBK004_barcode01".to_string())));
    assert!(baseline.contains(&("bc05-19".to_string(), "SQK-RBK004_barcode05".to_string())));
    assert!(baseline.contains(&("plain-7".to_string(), "unclassified".to_string())));

    for threads in THREAD_COUNTS {
        let assignments = run_with_timeout(move || classify_batch(threads));
        assert_eq!(assignments, baseline, "Thread count {threads} changed the output");
    }
}

// ============================================================================
// Pairing + stereo chain
// ============================================================================

/// Pushes eight duplex pairs and four strays through a pairing→stereo chain
/// and returns the sorted output read names.
fn duplex_chain_names(threads: usize) -> Vec<String> {
    let sink = Arc::new(VecSink::new());
    let stereo = StereoNode::spawned(sink.clone(), threads);
    let pairing = PairingNode::spawned(ReadOrder::ByChannel, stereo.clone(), threads);
    let pipeline =
        Pipeline::new(vec![pairing.clone() as Arc<dyn PipelineNode>, stereo.clone()]).unwrap();

    for i in 0..8u64 {
        let (mut template, mut complement) = duplex_strands(i);
        template.id = format!("tmpl-{i}");
        template.channel = 10 + i as u32;
        complement.id = format!("cmpl-{i}");
        complement.channel = 10 + i as u32;
        pipeline.push(Message::from(template));
        pipeline.push(Message::from(complement));
    }
    for i in 0..4u32 {
        pipeline.push(Message::from(pore_read(&format!("stray-{i}"), 100 + i, 500)));
    }
    pipeline.terminate(&FlushOptions::flush_all());

    let mut names: Vec<String> = sink
        .take()
        .into_iter()
        .filter_map(|message| match message {
            Message::Read(read) => Some(read.id),
            _ => None,
        })
        .collect();
    names.sort();
    names
}

#[test]
fn test_duplex_chain_is_deterministic_across_thread_counts() {
    let baseline = run_with_timeout(|| duplex_chain_names(1));
    // 8 duplex calls, 16 flushed members, 4 strays.
    assert_eq!(baseline.len(), 28);
    for i in 0..8 {
        assert!(baseline.contains(&format!("tmpl-{i};cmpl-{i}")), "pair {i} was not called");
    }

    for threads in THREAD_COUNTS {
        let names = run_with_timeout(move || duplex_chain_names(threads));
        assert_eq!(names, baseline, "Thread count {threads} changed the output");
    }
}

#[test]
fn test_duplex_chain_repeat_runs_agree() {
    let first = run_with_timeout(|| duplex_chain_names(4));
    let second = run_with_timeout(|| duplex_chain_names(4));
    assert_eq!(first, second);
}

// ============================================================================
// Terminate/restart cycles
// ============================================================================

#[test]
fn test_demux_node_restart_processes_more_reads() {
    run_with_timeout(|| {
        let registry = KitRegistry::built_in();
        let classifier = BarcodeClassifier::new(&registry, "SQK-RBK004", false).unwrap();
        let sink = Arc::new(VecSink::new());
        let node = DemuxNode::spawned(classifier, true, true, sink.clone(), 2);

        for i in 0..10 {
            node.send(Message::from(Read::new(format!("a-{i}"), filler(200), vec![b'%'; 200])));
        }
        node.terminate(&FlushOptions::flush_all());
        assert_eq!(sink.take().len(), 10);

        Arc::clone(&node).restart();
        for i in 0..10 {
            node.send(Message::from(Read::new(format!("b-{i}"), filler(200), vec![b'%'; 200])));
        }
        node.terminate(&FlushOptions::flush_all());
        assert_eq!(sink.take().len(), 10);

        assert_eq!(node.metrics().reads, 20);
    });
}

#[test]
fn test_pairing_cache_survives_preserving_terminate() {
    run_with_timeout(|| {
        let sink = Arc::new(VecSink::new());
        let node = PairingNode::spawned(ReadOrder::ByChannel, sink.clone(), 2);

        let (template, complement) = duplex_strands(3);
        node.send(Message::from(template));
        node.terminate(&FlushOptions::preserve_caches());

        Arc::clone(&node).restart();
        node.send(Message::from(complement));
        node.terminate(&FlushOptions::flush_all());

        let messages = sink.take();
        let pairs = messages.iter().filter(|m| matches!(m, Message::Pair(_))).count();
        let reads = messages.iter().filter(|m| matches!(m, Message::Read(_))).count();
        assert_eq!(pairs, 1, "The preserved template should pair after restart");
        assert_eq!(reads, 2, "Both members still flush at the final terminate");
    });
}
