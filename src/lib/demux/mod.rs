//! Barcode demultiplexing stage: classification, adapter detection, trimming.
//!
//! [`DemuxNode`] classifies each read against one kit, annotates it with the
//! barcode (`<kit>_<barcodeNN>` or `unclassified`), and optionally trims the
//! classified span and any detected sequencing adapter. Reads arrive either
//! as in-memory [`Read`]s or as raw BAM records; records keep every aux tag
//! the pipeline does not model, so the node annotates and trims them in
//! place instead of round-tripping through [`Read`].

pub mod adapter;
pub mod classifier;
pub mod trim;

pub use adapter::{AdapterDetector, AdapterScoreResult, SingleEndResult};
pub use classifier::{BarcodeClassifier, BarcodeScoreResult, UNCLASSIFIED};
pub use trim::{adapter_trim_interval, barcode_trim_interval, trim_read, trim_record};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use log::debug;
use noodles::sam::alignment::record_buf::RecordBuf;

use crate::bam;
use crate::kits;
use crate::messages::{FlushOptions, Message};
use crate::pipeline::{MessageSink, NodeCore, PipelineNode};
use crate::read::Read;
use crate::stats::{DemuxMetrics, NodeStats};

const DEMUX_QUEUE_CAPACITY: usize = 10_000;

/// Pipeline node that classifies and optionally trims reads.
///
/// Adapter trimming runs first (adapters sit outside the barcode), then
/// classification and barcode trimming on whatever sequence remains.
pub struct DemuxNode {
    core: NodeCore,
    sink: Arc<dyn MessageSink>,
    threads: usize,
    classifier: BarcodeClassifier,
    detector: AdapterDetector,
    double_ends: bool,
    trim_barcodes: bool,
    trim_adapters: bool,
    reads: AtomicU64,
    classified: AtomicU64,
    unclassified: AtomicU64,
    trimmed: AtomicU64,
}

impl DemuxNode {
    /// Creates the node and spawns its worker pool.
    #[must_use]
    pub fn spawned(
        classifier: BarcodeClassifier,
        trim_barcodes: bool,
        trim_adapters: bool,
        sink: Arc<dyn MessageSink>,
        threads: usize,
    ) -> Arc<Self> {
        let double_ends = classifier.kit_info().double_ends;
        let node = Arc::new(Self {
            core: NodeCore::new("DemuxNode", DEMUX_QUEUE_CAPACITY),
            sink,
            threads: threads.max(1),
            classifier,
            detector: AdapterDetector::new(),
            double_ends,
            trim_barcodes,
            trim_adapters,
            reads: AtomicU64::new(0),
            classified: AtomicU64::new(0),
            unclassified: AtomicU64::new(0),
            trimmed: AtomicU64::new(0),
        });
        node.spawn_workers();
        node
    }

    fn spawn_workers(self: &Arc<Self>) {
        for _ in 0..self.threads {
            let node = Arc::clone(self);
            self.core.add_worker(thread::spawn(move || node.worker_loop()));
        }
        self.core.mark_running();
    }

    fn worker_loop(&self) {
        while let Some(message) = self.core.pop() {
            match message {
                Message::Read(mut read) => {
                    self.process_read(&mut read);
                    self.sink.send(Message::Read(read));
                }
                Message::Bam(mut record) => {
                    self.process_record(&mut record);
                    self.sink.send(Message::Bam(record));
                }
                other => self.sink.send(other),
            }
        }
        self.core.worker_finished();
    }

    fn annotation(&self, result: &BarcodeScoreResult) -> String {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if result.is_unclassified() {
            self.unclassified.fetch_add(1, Ordering::Relaxed);
            UNCLASSIFIED.to_string()
        } else {
            self.classified.fetch_add(1, Ordering::Relaxed);
            kits::barcode_tag_value(self.classifier.kit_name(), &result.barcode_name)
        }
    }

    fn process_read(&self, read: &mut Read) {
        let original_len = read.seq.len();

        if self.trim_adapters {
            let hits = self.detector.detect(&read.seq);
            trim_read(read, adapter_trim_interval(&hits, read.seq.len()));
        }

        let result = self.classifier.classify(&read.seq);
        read.barcode = Some(self.annotation(&result));
        if self.trim_barcodes {
            trim_read(read, barcode_trim_interval(self.double_ends, &result, read.seq.len()));
        }

        if read.seq.len() < original_len {
            self.trimmed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn process_record(&self, record: &mut RecordBuf) {
        let original_len = record.sequence().as_ref().len();

        if self.trim_adapters {
            let hits = self.detector.detect(record.sequence().as_ref());
            let interval = adapter_trim_interval(&hits, record.sequence().as_ref().len());
            if let Err(e) = trim_record(record, interval) {
                debug!("{}: adapter trim skipped: {e}", bam::record_name(record));
            }
        }

        let result = self.classifier.classify(record.sequence().as_ref());
        let annotation = self.annotation(&result);
        bam::set_barcode(record, &annotation);
        if self.trim_barcodes {
            let interval = barcode_trim_interval(
                self.double_ends,
                &result,
                record.sequence().as_ref().len(),
            );
            if let Err(e) = trim_record(record, interval) {
                debug!("{}: barcode trim skipped: {e}", bam::record_name(record));
            }
        }

        if record.sequence().as_ref().len() < original_len {
            self.trimmed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot of the classification counters as a metrics row.
    #[must_use]
    pub fn metrics(&self) -> DemuxMetrics {
        DemuxMetrics {
            reads: self.reads.load(Ordering::Relaxed),
            classified: self.classified.load(Ordering::Relaxed),
            unclassified: self.unclassified.load(Ordering::Relaxed),
            trimmed: self.trimmed.load(Ordering::Relaxed),
        }
    }
}

impl MessageSink for DemuxNode {
    fn send(&self, message: Message) {
        self.core.push(message);
    }
}

impl PipelineNode for DemuxNode {
    fn node_name(&self) -> &'static str {
        self.core.name()
    }

    fn terminate(&self, _options: &FlushOptions) {
        self.core.terminate_and_join();
    }

    fn restart(self: Arc<Self>) {
        self.core.reopen();
        self.spawn_workers();
    }

    fn stats(&self) -> NodeStats {
        NodeStats::new(self.node_name())
            .counter("reads", self.reads.load(Ordering::Relaxed))
            .counter("classified", self.classified.load(Ordering::Relaxed))
            .counter("unclassified", self.unclassified.load(Ordering::Relaxed))
            .counter("trimmed", self.trimmed.load(Ordering::Relaxed))
            .counter("queue_pushed", self.core.queue_stats().total_pushed)
    }
}
