//! Duplex calling: stereo encoding of accepted pairs and stitching of
//! chunked basecalls.
//!
//! [`StereoNode`] consumes [`Message::Pair`] messages and emits one merged
//! duplex read per pair it can encode. Pairs that fail encoding fall back to
//! their simplex members, so the stage never drops a read.

mod stereo;
mod stitch;

pub use stereo::stereo_encode;
pub use stitch::stitch_chunks;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use log::debug;

use crate::messages::{FlushOptions, Message};
use crate::pipeline::{MessageSink, NodeCore, PipelineNode};
use crate::read::ReadPair;
use crate::stats::NodeStats;

const STEREO_QUEUE_CAPACITY: usize = 1_000;

/// Pipeline node that stereo-encodes read pairs into duplex reads.
pub struct StereoNode {
    core: NodeCore,
    sink: Arc<dyn MessageSink>,
    threads: usize,
    num_encoded_pairs: AtomicU64,
    num_failed_pairs: AtomicU64,
}

impl StereoNode {
    /// Creates the node and spawns its worker pool.
    #[must_use]
    pub fn spawned(sink: Arc<dyn MessageSink>, threads: usize) -> Arc<Self> {
        let node = Arc::new(Self {
            core: NodeCore::new("StereoNode", STEREO_QUEUE_CAPACITY),
            sink,
            threads: threads.max(1),
            num_encoded_pairs: AtomicU64::new(0),
            num_failed_pairs: AtomicU64::new(0),
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
                Message::Pair(pair) => self.process_pair(*pair),
                other => self.sink.send(other),
            }
        }
        self.core.worker_finished();
    }

    fn process_pair(&self, pair: ReadPair) {
        match stereo_encode(&pair) {
            Some(duplex) => {
                self.num_encoded_pairs.fetch_add(1, Ordering::Relaxed);
                self.sink.send(Message::from(duplex.into_read()));
            }
            None => {
                debug!(
                    "{} + {}: pair could not be stereo encoded",
                    pair.template.id, pair.complement.id
                );
                self.num_failed_pairs.fetch_add(1, Ordering::Relaxed);
                self.sink.send(Message::from(pair.template));
                self.sink.send(Message::from(pair.complement));
            }
        }
    }

    /// Number of pairs successfully stereo encoded so far.
    #[must_use]
    pub fn encoded_pairs(&self) -> u64 {
        self.num_encoded_pairs.load(Ordering::Relaxed)
    }
}

impl MessageSink for StereoNode {
    fn send(&self, message: Message) {
        self.core.push(message);
    }
}

impl PipelineNode for StereoNode {
    fn node_name(&self) -> &'static str {
        self.core.name()
    }

    fn terminate(&self, _options: &FlushOptions) {
        self.core.terminate_and_join();
        debug!(
            "encoded pairs {}, failed pairs {}",
            self.num_encoded_pairs.load(Ordering::Relaxed),
            self.num_failed_pairs.load(Ordering::Relaxed)
        );
    }

    fn restart(self: Arc<Self>) {
        self.core.reopen();
        self.spawn_workers();
    }

    fn stats(&self) -> NodeStats {
        NodeStats::new(self.node_name())
            .counter("encoded_pairs", self.num_encoded_pairs.load(Ordering::Relaxed))
            .counter("failed_pairs", self.num_failed_pairs.load(Ordering::Relaxed))
            .counter("queue_pushed", self.core.queue_stats().total_pushed)
    }
}
