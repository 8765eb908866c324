//! Duplex read pairing stage.
//!
//! [`PairingNode`] finds template/complement pairs either from an explicit
//! id map or heuristically, by watching for consecutive reads from the same
//! pore whose dwell times and lengths look like the two strands of one
//! molecule. Accepted pairs are emitted as extra [`Message::Pair`] messages;
//! in heuristic mode the member reads stay cached and still flow downstream
//! when evicted or flushed, so no simplex read is ever lost to pairing.

mod criteria;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use ahash::AHashMap;
use anyhow::Context;
use clap::ValueEnum;
use fgoxide::io::DelimFile;
use log::{debug, trace};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::align::OverlapScratch;
use crate::messages::{FlushOptions, Message};
use crate::pipeline::{MessageSink, NodeCore, PipelineNode};
use crate::read::{PairOverlap, Read, ReadPair};
use crate::stats::{NodeStats, PairingMetrics};

use criteria::{check_pair, mapped_pair_overlap};

const PAIRING_QUEUE_CAPACITY: usize = 10_000;

/// Open pore keys kept per client when reads arrive grouped by channel.
const MAX_KEYS_BY_CHANNEL: usize = 10;
/// Pending reads kept per pore when reads arrive sorted by start time.
const MAX_READS_BY_TIME: usize = 10;

/// Arrival order of reads reaching the pairing stage, which determines how
/// the heuristic cache is bounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReadOrder {
    /// Reads arrive grouped by pore; cap the number of open pore keys.
    #[default]
    #[value(name = "by-channel")]
    ByChannel,
    /// Reads arrive globally time-sorted; cap each pore's pending list.
    #[value(name = "by-time")]
    ByTime,
}

impl ReadOrder {
    /// Cache bounds `(max keys, max reads per key)` for this arrival order.
    fn cache_bounds(self) -> (usize, usize) {
        match self {
            ReadOrder::ByChannel => (MAX_KEYS_BY_CHANNEL, usize::MAX),
            ReadOrder::ByTime => (usize::MAX, MAX_READS_BY_TIME),
        }
    }
}

/// One physical pore across a run: channel, mux, run id, flowcell id.
type PoreKey = (u32, u8, String, String);

/// Pending reads for one client.
#[derive(Default)]
struct ClientCache {
    /// Time-ordered pending reads per pore.
    lists: AHashMap<PoreKey, VecDeque<Read>>,
    /// Pore keys in first-seen order, for FIFO key eviction.
    key_order: VecDeque<PoreKey>,
}

enum PairingMode {
    /// Pair pore/time neighbors, keeping recent reads cached per client.
    Heuristic {
        max_num_keys: usize,
        max_num_reads: usize,
        caches: Mutex<AHashMap<u32, ClientCache>>,
    },
    /// Pair reads named by an explicit template/complement id map.
    Explicit {
        template_complement: AHashMap<String, String>,
        complement_template: AHashMap<String, String>,
        cache: Mutex<AHashMap<String, Read>>,
    },
}

/// Pipeline node that pairs template and complement strands for duplex
/// calling.
pub struct PairingNode {
    core: NodeCore,
    sink: Arc<dyn MessageSink>,
    threads: usize,
    mode: PairingMode,
    preserve_caches: AtomicBool,
    num_reads: AtomicU64,
    num_pairs: AtomicU64,
    num_unpaired: AtomicU64,
}

impl PairingNode {
    /// Creates a heuristic-mode node and spawns its worker pool.
    #[must_use]
    pub fn spawned(read_order: ReadOrder, sink: Arc<dyn MessageSink>, threads: usize) -> Arc<Self> {
        let (max_num_keys, max_num_reads) = read_order.cache_bounds();
        Self::spawned_with_mode(
            PairingMode::Heuristic {
                max_num_keys,
                max_num_reads,
                caches: Mutex::new(AHashMap::new()),
            },
            sink,
            threads,
        )
    }

    /// Creates an explicit-map node pairing the given (template id,
    /// complement id) entries, and spawns its worker pool.
    #[must_use]
    pub fn spawned_with_pair_map(
        pairs: Vec<(String, String)>,
        sink: Arc<dyn MessageSink>,
        threads: usize,
    ) -> Arc<Self> {
        let mut template_complement = AHashMap::with_capacity(pairs.len());
        let mut complement_template = AHashMap::with_capacity(pairs.len());
        for (template, complement) in pairs {
            complement_template.insert(complement.clone(), template.clone());
            template_complement.insert(template, complement);
        }
        Self::spawned_with_mode(
            PairingMode::Explicit {
                template_complement,
                complement_template,
                cache: Mutex::new(AHashMap::new()),
            },
            sink,
            threads,
        )
    }

    fn spawned_with_mode(mode: PairingMode, sink: Arc<dyn MessageSink>, threads: usize) -> Arc<Self> {
        let node = Arc::new(Self {
            core: NodeCore::new("PairingNode", PAIRING_QUEUE_CAPACITY),
            sink,
            threads: threads.max(1),
            mode,
            preserve_caches: AtomicBool::new(false),
            num_reads: AtomicU64::new(0),
            num_pairs: AtomicU64::new(0),
            num_unpaired: AtomicU64::new(0),
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
        let mut scratch = OverlapScratch::new();
        while let Some(message) = self.core.pop() {
            match message {
                Message::Read(read) => self.process_read(*read, &mut scratch),
                Message::FlushPairingCache { client_id } => self.flush_client(client_id),
                other => self.sink.send(other),
            }
        }
        // The last worker out drains what is still cached.
        if self.core.worker_finished() && !self.preserve_caches.load(Ordering::SeqCst) {
            self.flush_all();
        }
    }

    fn process_read(&self, read: Read, scratch: &mut OverlapScratch) {
        self.num_reads.fetch_add(1, Ordering::Relaxed);
        match &self.mode {
            PairingMode::Heuristic { max_num_keys, max_num_reads, caches } => {
                self.pair_by_pore(read, *max_num_keys, *max_num_reads, caches, scratch);
            }
            PairingMode::Explicit { template_complement, complement_template, cache } => {
                self.pair_by_map(read, template_complement, complement_template, cache, scratch);
            }
        }
    }

    /// Caches `read` under its pore key, keeping the list sorted by start
    /// time, and tests it against its immediate time-neighbors. The cache
    /// lock is released before any alignment or downstream send; candidates
    /// are cloned out for that reason.
    fn pair_by_pore(
        &self,
        read: Read,
        max_num_keys: usize,
        max_num_reads: usize,
        caches: &Mutex<AHashMap<u32, ClientCache>>,
        scratch: &mut OverlapScratch,
    ) {
        let key: PoreKey =
            (read.channel, read.mux, read.run_id.clone(), read.flowcell_id.clone());
        let client_id = read.client_id;

        let mut evicted = Vec::new();
        let mut candidate = None;
        {
            let mut caches = caches.lock();
            let cache = caches.entry(client_id).or_default();
            if let Some(list) = cache.lists.get_mut(&key) {
                let idx = list.partition_point(|r| r.start_time_ms < read.start_time_ms);
                let later = list.get(idx).cloned();
                let earlier = idx.checked_sub(1).and_then(|i| list.get(i).cloned());
                candidate = Some((read.clone(), earlier, later));
                list.insert(idx, read);
                while list.len() > max_num_reads {
                    if let Some(oldest) = list.pop_front() {
                        evicted.push(oldest);
                    }
                }
            } else {
                cache.key_order.push_back(key.clone());
                cache.lists.insert(key, VecDeque::from([read]));
                while cache.key_order.len() > max_num_keys {
                    if let Some(oldest_key) = cache.key_order.pop_front() {
                        if let Some(list) = cache.lists.remove(&oldest_key) {
                            evicted.extend(list);
                        }
                    }
                }
            }
        }

        for read in evicted {
            self.send_unpaired(read);
        }
        let Some((read, earlier, later)) = candidate else { return };
        if let Some(later) = later {
            if let Some(overlap) = check_pair(&read, &later, scratch) {
                self.send_pair(read, later, overlap);
                return;
            }
        }
        if let Some(earlier) = earlier {
            if let Some(overlap) = check_pair(&earlier, &read, scratch) {
                self.send_pair(earlier, read, overlap);
            }
        }
    }

    /// Looks `read` up in the explicit id maps. The first member of a pair
    /// to arrive is cached by id; the second takes it out and the pair is
    /// emitted in map order. Reads the map does not name flow through
    /// unpaired.
    fn pair_by_map(
        &self,
        read: Read,
        template_complement: &AHashMap<String, String>,
        complement_template: &AHashMap<String, String>,
        cache: &Mutex<AHashMap<String, Read>>,
        scratch: &mut OverlapScratch,
    ) {
        let (partner_id, read_is_template) =
            if let Some(complement) = template_complement.get(&read.id) {
                (complement, true)
            } else if let Some(template) = complement_template.get(&read.id) {
                (template, false)
            } else {
                self.send_unpaired(read);
                return;
            };

        let partner = {
            let mut cache = cache.lock();
            match cache.remove(partner_id) {
                Some(partner) => partner,
                None => {
                    cache.insert(read.id.clone(), read);
                    return;
                }
            }
        };
        let (template, complement) =
            if read_is_template { (read, partner) } else { (partner, read) };
        match mapped_pair_overlap(&template, &complement, scratch) {
            Some(overlap) => self.send_pair(template, complement, overlap),
            None => {
                debug!(
                    "{} + {}: mapped pair failed the overlap check",
                    template.id, complement.id
                );
                self.send_unpaired(template);
                self.send_unpaired(complement);
            }
        }
    }

    /// Handles a cache-flush control message: every read cached for
    /// `client_id` is emitted downstream unpaired and the message itself is
    /// consumed.
    fn flush_client(&self, client_id: u32) {
        let drained: Vec<Read> = match &self.mode {
            PairingMode::Heuristic { caches, .. } => {
                let mut caches = caches.lock();
                caches
                    .remove(&client_id)
                    .map(|cache| cache.lists.into_values().flatten().collect())
                    .unwrap_or_default()
            }
            PairingMode::Explicit { cache, .. } => {
                let mut cache = cache.lock();
                let ids: Vec<String> = cache
                    .iter()
                    .filter(|(_, read)| read.client_id == client_id)
                    .map(|(id, _)| id.clone())
                    .collect();
                ids.iter().filter_map(|id| cache.remove(id)).collect()
            }
        };
        if !drained.is_empty() {
            debug!("client {client_id} disconnected, flushing {} cached reads", drained.len());
        }
        for read in drained {
            self.send_unpaired(read);
        }
    }

    /// Drains every cache downstream.
    fn flush_all(&self) {
        let drained: Vec<Read> = match &self.mode {
            PairingMode::Heuristic { caches, .. } => caches
                .lock()
                .drain()
                .flat_map(|(_, cache)| cache.lists.into_values().flatten())
                .collect(),
            PairingMode::Explicit { cache, .. } => {
                cache.lock().drain().map(|(_, read)| read).collect()
            }
        };
        for read in drained {
            self.send_unpaired(read);
        }
    }

    fn send_unpaired(&self, read: Read) {
        self.num_unpaired.fetch_add(1, Ordering::Relaxed);
        self.sink.send(Message::from(read));
    }

    fn send_pair(&self, template: Read, complement: Read, overlap: PairOverlap) {
        self.num_pairs.fetch_add(1, Ordering::Relaxed);
        trace!("paired {} + {}", template.id, complement.id);
        self.sink.send(Message::from(ReadPair { template, complement, overlap }));
    }

    /// Snapshot of the pairing counters as a metrics row.
    #[must_use]
    pub fn metrics(&self) -> PairingMetrics {
        PairingMetrics {
            reads: self.num_reads.load(Ordering::Relaxed),
            pairs: self.num_pairs.load(Ordering::Relaxed),
            unpaired: self.num_unpaired.load(Ordering::Relaxed),
        }
    }
}

impl MessageSink for PairingNode {
    fn send(&self, message: Message) {
        self.core.push(message);
    }
}

impl PipelineNode for PairingNode {
    fn node_name(&self) -> &'static str {
        self.core.name()
    }

    fn terminate(&self, options: &FlushOptions) {
        self.preserve_caches.store(options.preserve_pairing_caches, Ordering::SeqCst);
        self.core.terminate_and_join();
        debug!(
            "reads {}, pairs {}, unpaired {}",
            self.num_reads.load(Ordering::Relaxed),
            self.num_pairs.load(Ordering::Relaxed),
            self.num_unpaired.load(Ordering::Relaxed)
        );
    }

    fn restart(self: Arc<Self>) {
        self.core.reopen();
        self.spawn_workers();
    }

    fn stats(&self) -> NodeStats {
        NodeStats::new(self.node_name())
            .counter("reads", self.num_reads.load(Ordering::Relaxed))
            .counter("pairs", self.num_pairs.load(Ordering::Relaxed))
            .counter("unpaired", self.num_unpaired.load(Ordering::Relaxed))
            .counter("queue_pushed", self.core.queue_stats().total_pushed)
    }
}

/// One row of a pair-map TSV, as written by `lamprey pair` and consumed by
/// `lamprey duplex --pair-map`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairMapRecord {
    /// Template read id.
    pub template_id: String,
    /// Complement read id.
    pub complement_id: String,
}

/// Reads a template/complement pair map from a TSV file.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn read_pair_map<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<(String, String)>> {
    let path_ref = path.as_ref();
    let records: Vec<PairMapRecord> = DelimFile::default()
        .read_tsv(&path_ref)
        .with_context(|| format!("Failed to read pair map: {}", path_ref.display()))?;
    Ok(records.into_iter().map(|r| (r.template_id, r.complement_id)).collect())
}

/// Writes template/complement pairs as a pair-map TSV.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn write_pair_map<P: AsRef<Path>>(path: P, pairs: &[(String, String)]) -> anyhow::Result<()> {
    let path_ref = path.as_ref();
    let records: Vec<PairMapRecord> = pairs
        .iter()
        .map(|(template, complement)| PairMapRecord {
            template_id: template.clone(),
            complement_id: complement.clone(),
        })
        .collect();
    DelimFile::default()
        .write_tsv(&path_ref, &records)
        .with_context(|| format!("Failed to write pair map: {}", path_ref.display()))
}
