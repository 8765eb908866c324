//! Concurrent pipeline-node framework.
//!
//! Reads flow through a chain of nodes, each owning a bounded queue and a
//! pool of worker threads:
//!
//! ```text
//!          push                 push                 push
//! source ───────> [ node A ] ───────> [ node B ] ───────> terminal sink
//!                 queue+workers       queue+workers       (writer/channel)
//! ```
//!
//! Backpressure comes from the bounded queues: a fast upstream blocks on
//! `push` until the downstream drains. Termination propagates source to
//! sink: each node's queue is closed, its workers drain the remaining
//! messages and exit, and only then is the next node terminated, so no
//! message is lost at shutdown.
//!
//! # Module structure
//!
//! - [`queue`]: the bounded blocking [`MessageQueue`] with drain-on-terminate
//! - [`node`]: the [`PipelineNode`] state machine, [`NodeCore`] helper,
//!   terminal sinks, and the [`Pipeline`] chain

pub mod node;
pub mod queue;

pub use node::{ChannelSink, MessageSink, NodeCore, NodeState, Pipeline, PipelineNode, VecSink};
pub use queue::{MessageQueue, QueueStats};
