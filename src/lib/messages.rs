//! Messages exchanged between pipeline nodes.
//!
//! Every node queue carries the same closed sum type, [`Message`]. Nodes match
//! exhaustively: data variants they do not handle are forwarded to the sink
//! unchanged, and receiving a variant a node can never legally see is a wiring
//! defect, not a runtime condition.

use crate::read::{Read, ReadPair};
use noodles::sam::alignment::RecordBuf;

/// A unit of work flowing through the pipeline.
#[derive(Debug, Clone)]
pub enum Message {
    /// A simplex read.
    Read(Box<Read>),
    /// A candidate duplex pair.
    Pair(Box<ReadPair>),
    /// A BAM record headed for (or coming from) a writer/reader node.
    Bam(Box<RecordBuf>),
    /// Control: drain the pairing cache for one acquisition client.
    FlushPairingCache {
        /// The client whose cached reads should be emitted downstream.
        client_id: u32,
    },
}

impl Message {
    /// Short variant name for diagnostics.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Message::Read(_) => "Read",
            Message::Pair(_) => "Pair",
            Message::Bam(_) => "Bam",
            Message::FlushPairingCache { .. } => "FlushPairingCache",
        }
    }

    /// Whether this is a control message rather than data.
    #[must_use]
    pub fn is_control(&self) -> bool {
        matches!(self, Message::FlushPairingCache { .. })
    }
}

impl From<Read> for Message {
    fn from(read: Read) -> Self {
        Message::Read(Box::new(read))
    }
}

impl From<ReadPair> for Message {
    fn from(pair: ReadPair) -> Self {
        Message::Pair(Box::new(pair))
    }
}

impl From<RecordBuf> for Message {
    fn from(record: RecordBuf) -> Self {
        Message::Bam(Box::new(record))
    }
}

/// Options forwarded through the node chain on terminate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushOptions {
    /// When set, the pairing node keeps its caches across the terminate so a
    /// later restart can continue pairing against them.
    pub preserve_pairing_caches: bool,
}

impl FlushOptions {
    /// Options for a final terminate: caches are flushed downstream.
    #[must_use]
    pub fn flush_all() -> Self {
        Self { preserve_pairing_caches: false }
    }

    /// Options for an intermediate terminate between pipeline stages that
    /// share pairing state.
    #[must_use]
    pub fn preserve_caches() -> Self {
        Self { preserve_pairing_caches: true }
    }
}
