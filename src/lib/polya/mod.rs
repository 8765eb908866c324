//! PolyA/polyT tail length estimation stage.
//!
//! [`PolyANode`] runs [`estimate_tail_length`] over every read that passes
//! through, annotating reads in place (`polya_tail_length`) or BAM records
//! with the `pt:i` tag. Reads the estimator cannot call are forwarded
//! unchanged and counted; at debug level the node also keeps a histogram of
//! called lengths and dumps it on terminate.

pub mod estimator;

pub use estimator::estimate_tail_length;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, log_enabled, Level};
use noodles::sam::alignment::record_buf::RecordBuf;
use parking_lot::Mutex;

use crate::bam;
use crate::messages::{FlushOptions, Message};
use crate::pipeline::{MessageSink, NodeCore, PipelineNode};
use crate::read::Read;
use crate::stats::{NodeStats, PolyAMetrics};

const POLYA_QUEUE_CAPACITY: usize = 1_000;

/// Pipeline node that estimates polyA/polyT tail lengths.
pub struct PolyANode {
    core: NodeCore,
    sink: Arc<dyn MessageSink>,
    threads: usize,
    is_rna: bool,
    num_called: AtomicU64,
    num_not_called: AtomicU64,
    total_tail_length: AtomicU64,
    tail_length_counts: Mutex<BTreeMap<i32, u64>>,
}

impl PolyANode {
    /// Creates the node and spawns its worker pool.
    #[must_use]
    pub fn spawned(is_rna: bool, sink: Arc<dyn MessageSink>, threads: usize) -> Arc<Self> {
        let node = Arc::new(Self {
            core: NodeCore::new("PolyANode", POLYA_QUEUE_CAPACITY),
            sink,
            threads: threads.max(1),
            is_rna,
            num_called: AtomicU64::new(0),
            num_not_called: AtomicU64::new(0),
            total_tail_length: AtomicU64::new(0),
            tail_length_counts: Mutex::new(BTreeMap::new()),
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

    fn record_estimate(&self, tail: i32) {
        self.num_called.fetch_add(1, Ordering::Relaxed);
        self.total_tail_length.fetch_add(tail as u64, Ordering::Relaxed);
        if log_enabled!(Level::Debug) {
            *self.tail_length_counts.lock().entry(tail).or_insert(0) += 1;
        }
    }

    fn process_read(&self, read: &mut Read) {
        match estimate_tail_length(read, self.is_rna) {
            Some(tail) => {
                read.polya_tail_length = Some(tail);
                self.record_estimate(tail);
            }
            None => {
                self.num_not_called.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn process_record(&self, record: &mut RecordBuf) {
        let read = match bam::record_to_read(record) {
            Ok(read) => read,
            Err(e) => {
                debug!("{}: tail estimation skipped: {e}", bam::record_name(record));
                self.num_not_called.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        match estimate_tail_length(&read, self.is_rna) {
            Some(tail) => {
                bam::set_polya_length(record, tail);
                self.record_estimate(tail);
            }
            None => {
                self.num_not_called.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn mean_tail_length(&self) -> u64 {
        let called = self.num_called.load(Ordering::Relaxed);
        if called == 0 {
            0
        } else {
            self.total_tail_length.load(Ordering::Relaxed) / called
        }
    }

    /// Snapshot of the estimator counters as a metrics row.
    #[must_use]
    pub fn metrics(&self) -> PolyAMetrics {
        let called = self.num_called.load(Ordering::Relaxed);
        let total = self.total_tail_length.load(Ordering::Relaxed);
        PolyAMetrics {
            reads_estimated: called,
            reads_not_estimated: self.num_not_called.load(Ordering::Relaxed),
            average_tail_length: if called == 0 { 0.0 } else { total as f64 / called as f64 },
        }
    }

    /// Dumps the called-length distribution as a star histogram, scaled so
    /// the tallest bucket stays near a hundred characters.
    fn log_histogram(&self) {
        if !log_enabled!(Level::Debug) {
            return;
        }
        let counts = self.tail_length_counts.lock();
        let Some(max) = counts.values().copied().max() else { return };
        let factor = 1 + max / 100;
        for (length, count) in counts.iter() {
            debug!("{length:03} : {}", "*".repeat((count / factor) as usize));
        }
    }
}

impl MessageSink for PolyANode {
    fn send(&self, message: Message) {
        self.core.push(message);
    }
}

impl PipelineNode for PolyANode {
    fn node_name(&self) -> &'static str {
        self.core.name()
    }

    fn terminate(&self, _options: &FlushOptions) {
        self.core.terminate_and_join();
        debug!(
            "tails called {}, not called {}, mean length {}",
            self.num_called.load(Ordering::Relaxed),
            self.num_not_called.load(Ordering::Relaxed),
            self.mean_tail_length()
        );
        self.log_histogram();
    }

    fn restart(self: Arc<Self>) {
        self.core.reopen();
        self.spawn_workers();
    }

    fn stats(&self) -> NodeStats {
        NodeStats::new(self.node_name())
            .counter("reads_estimated", self.num_called.load(Ordering::Relaxed))
            .counter("reads_not_estimated", self.num_not_called.load(Ordering::Relaxed))
            .counter("average_tail_length", self.mean_tail_length())
            .counter("queue_pushed", self.core.queue_stats().total_pushed)
    }
}
