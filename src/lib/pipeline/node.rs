//! Pipeline node framework: lifecycle state machine, sinks, and the chain.
//!
//! A node owns a bounded [`MessageQueue`], a pool of worker threads popping
//! from it, and an `Arc<dyn MessageSink>` pointing at the next stage. The
//! lifecycle is an explicit state machine
//! (`Created -> Running -> Terminating -> Terminated`, with `restart` looping
//! back to `Running`) rather than ad hoc boolean flags; [`NodeCore`] holds the
//! machinery every node embeds.
//!
//! Lock discipline: a node never holds its queue lock while taking a
//! cache or stats lock. `NodeCore` only touches one lock at a time.

use crate::messages::{FlushOptions, Message};
use crate::pipeline::queue::{MessageQueue, QueueStats};
use crate::stats::NodeStats;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

/// Lifecycle state of a pipeline node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Constructed, no workers running yet.
    Created,
    /// Workers are consuming from the queue.
    Running,
    /// Terminate requested; queue is draining and workers are exiting.
    Terminating,
    /// All workers joined.
    Terminated,
}

/// Anything a node can send messages to: the next node or a terminal sink.
pub trait MessageSink: Send + Sync {
    /// Delivers one message. Delivery on a closed stage logs and drops.
    fn send(&self, message: Message);
}

/// A processing stage: a sink plus lifecycle control and stats reporting.
///
/// `restart` takes `Arc<Self>` because respawning workers hands clones of the
/// node to new threads.
pub trait PipelineNode: MessageSink {
    /// The node's name for logs and stats.
    fn node_name(&self) -> &'static str;

    /// Drains the queue and joins the workers. Idempotent. `options` controls
    /// flush behavior for nodes that hold caches.
    fn terminate(&self, options: &FlushOptions);

    /// Reopens the queue and spawns a fresh worker pool after a terminate.
    fn restart(self: Arc<Self>);

    /// Snapshot of the node's counters.
    fn stats(&self) -> NodeStats;
}

/// Shared lifecycle machinery embedded in every node.
///
/// Owns the input queue, the worker handles, and the state. Nodes wrap this
/// with their own transform logic and caches.
pub struct NodeCore {
    name: &'static str,
    queue: MessageQueue<Message>,
    state: Mutex<NodeState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    active_workers: AtomicUsize,
}

impl NodeCore {
    /// Creates the core for a node with the given input queue capacity.
    #[must_use]
    pub fn new(name: &'static str, queue_capacity: usize) -> Self {
        Self {
            name,
            queue: MessageQueue::with_capacity(queue_capacity),
            state: Mutex::new(NodeState::Created),
            workers: Mutex::new(Vec::new()),
            active_workers: AtomicUsize::new(0),
        }
    }

    /// The node's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    /// Enqueues a message for the workers, blocking on a full queue.
    ///
    /// A message arriving after terminate is a wiring defect upstream; it is
    /// logged and dropped rather than panicking the producer.
    pub fn push(&self, message: Message) {
        if let Err(rejected) = self.queue.push(message) {
            log::warn!(
                "{}: dropping {} message pushed after terminate",
                self.name,
                rejected.variant_name()
            );
        }
    }

    /// Pops the next message for a worker; `None` means drained and closed.
    pub fn pop(&self) -> Option<Message> {
        self.queue.pop()
    }

    /// Registers a spawned worker handle.
    pub fn add_worker(&self, handle: JoinHandle<()>) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
        self.workers.lock().push(handle);
    }

    /// Marks the node running once its workers are spawned.
    pub fn mark_running(&self) {
        *self.state.lock() = NodeState::Running;
    }

    /// Called by each worker on exit; returns `true` for the last one out.
    ///
    /// The last worker is the one that performs any end-of-stream flush (the
    /// pairing node drains its caches here, for example).
    pub fn worker_finished(&self) -> bool {
        self.active_workers.fetch_sub(1, Ordering::SeqCst) == 1
    }

    /// Closes the queue, joins all workers, and marks the node terminated.
    /// Idempotent; safe to call on a node that never started.
    pub fn terminate_and_join(&self) {
        {
            let mut state = self.state.lock();
            if *state == NodeState::Terminated {
                return;
            }
            *state = NodeState::Terminating;
        }
        self.queue.terminate();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if handle.join().is_err() {
                log::error!("{}: worker thread panicked", self.name);
            }
        }
        *self.state.lock() = NodeState::Terminated;
    }

    /// Reopens the queue after a terminate; the node respawns its workers.
    pub fn reopen(&self) {
        self.queue.restart();
    }

    /// Snapshot of the queue counters for stats reporting.
    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

/// Terminal sink forwarding messages into a crossbeam channel.
///
/// Commands use this to collect pipeline output on the main thread.
pub struct ChannelSink {
    sender: crossbeam_channel::Sender<Message>,
}

impl ChannelSink {
    /// Wraps a channel sender as a sink.
    #[must_use]
    pub fn new(sender: crossbeam_channel::Sender<Message>) -> Self {
        Self { sender }
    }
}

impl MessageSink for ChannelSink {
    fn send(&self, message: Message) {
        let variant = message.variant_name();
        if self.sender.send(message).is_err() {
            log::warn!("collector channel closed; dropping {variant} message");
        }
    }
}

/// Terminal sink collecting messages in memory.
#[derive(Default)]
pub struct VecSink {
    messages: Mutex<Vec<Message>>,
}

impl VecSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Removes and returns everything collected so far.
    #[must_use]
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl MessageSink for VecSink {
    fn send(&self, message: Message) {
        self.messages.lock().push(message);
    }
}

/// A chain of nodes in source-to-sink order.
///
/// The pipeline owns the nodes only for lifecycle purposes; the nodes are
/// already wired to each other through their sinks at construction.
pub struct Pipeline {
    nodes: Vec<Arc<dyn PipelineNode>>,
}

impl Pipeline {
    /// Builds a pipeline over nodes listed source first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LampreyError::InvalidPipeline`] for an empty chain.
    pub fn new(nodes: Vec<Arc<dyn PipelineNode>>) -> crate::Result<Self> {
        if nodes.is_empty() {
            return Err(crate::LampreyError::InvalidPipeline {
                reason: "pipeline requires at least one node".to_string(),
            });
        }
        Ok(Self { nodes })
    }

    /// Pushes a message into the head node.
    pub fn push(&self, message: Message) {
        self.nodes[0].send(message);
    }

    /// Terminates nodes in source-to-sink order so queues drain in sequence.
    pub fn terminate(&self, options: &FlushOptions) {
        for node in &self.nodes {
            node.terminate(options);
        }
    }

    /// Restarts every node for another processing cycle.
    pub fn restart(&self) {
        for node in &self.nodes {
            Arc::clone(node).restart();
        }
    }

    /// Stats snapshots for all nodes, source first.
    #[must_use]
    pub fn stats(&self) -> Vec<NodeStats> {
        self.nodes.iter().map(|n| n.stats()).collect()
    }

    /// Logs the summary of all node counters at info level.
    pub fn log_summary(&self) {
        crate::logging::log_pipeline_summary(&self.stats());
    }
}
