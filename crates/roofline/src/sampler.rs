//! The sampler context and the concurrent start/stop protocol.
//!
//! # Protocol
//!
//! Every member of a team calls [`Sampler::start_in`] and later
//! [`Sampler::stop_in`]. Members bound to the same leaf share one sample.
//!
//! Start, per member:
//! 1. resolve the leaf (OS affinity, cached in the binding table)
//! 2. attach to the leaf's sample and add the member's share of any
//!    caller-supplied counts
//! 3. team barrier
//! 4. the first member to take the sample's open token arms it: starts the
//!    counters, then records the start timestamp
//!
//! Stop, per member:
//! 1. read the clock
//! 2. the last member to give back the open token finalizes the sample: stops
//!    the counters, derives flops and bytes, records the end timestamp and
//!    the thread count
//! 3. team barrier; the barrier leader reduces every group, emits one record
//!    per reduction-level node and resets every sample
//! 4. team barrier, so no member starts a new window mid-reset
//!
//! Members without a sample (unresolvable affinity, or a binding slot
//! beyond the table) still take part in both barriers.

use std::env;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use roofline_core::{
    CounterReader, ExternalCounts, Sample, SampleStore, SimdWidth, Topology, WorkCounts,
};

use crate::bindings::BindingTable;
use crate::config::SamplerConfig;
use crate::error::SamplerError;
use crate::measurement::affinity::{CpuLocator, OsAffinity};
use crate::measurement::{clock, simd};
use crate::output::{compose_info, NodeRecord, OutputSink};
use crate::team::{Team, TeamMember};

/// Token for an open window, returned by start and passed back to stop.
///
/// `None` in its place is the "no sample" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleHandle {
    leaf: usize,
}

impl SampleHandle {
    /// Logical index of the leaf the window is attributed to.
    pub fn leaf(&self) -> usize {
        self.leaf
    }
}

/// Topology-aware roofline sampler.
///
/// Created once, shared by reference between all participating threads, and
/// dropped once they are done. Dropping closes every counter handle and
/// flushes the output.
pub struct Sampler<R: CounterReader = ExternalCounts> {
    config: SamplerConfig,
    topology: Topology,
    reader: Arc<R>,
    store: SampleStore<R::Handle>,
    bindings: BindingTable,
    locator: Box<dyn CpuLocator>,
    sink: Mutex<OutputSink>,
    /// Team spanning the rayon pool, for windows entered from inside it.
    pool_team: OnceLock<Team>,
    width: SimdWidth,
}

impl Sampler<ExternalCounts> {
    /// Sampler over the host topology whose windows carry caller-supplied
    /// flop and byte counts.
    pub fn external(config: SamplerConfig) -> Result<Self, SamplerError> {
        let topology = crate::topology::load()?;
        Self::new(config, topology, ExternalCounts)
    }
}

#[cfg(all(target_os = "linux", feature = "perf"))]
impl Sampler<crate::measurement::PerfCounters> {
    /// Sampler over the host topology counting hardware events with
    /// perf_event.
    pub fn hardware(config: SamplerConfig) -> Result<Self, SamplerError> {
        let topology = crate::topology::load()?;
        let width = config.simd_width.unwrap_or_else(simd::detect);
        Self::new(config, topology, crate::measurement::PerfCounters::new(width))
    }
}

impl<R> Sampler<R>
where
    R: CounterReader + 'static,
    R::Handle: 'static,
{
    /// Create a sampler writing to the output named by `config`.
    ///
    /// # Errors
    ///
    /// Fails if the output cannot be opened or any leaf's counters cannot be
    /// opened. Nothing is retained on failure.
    pub fn new(config: SamplerConfig, topology: Topology, reader: R) -> Result<Self, SamplerError> {
        let sink = OutputSink::open(&config)?;
        Self::with_sink(config, topology, reader, sink)
    }

    /// Create a sampler writing to `writer`, header first.
    pub fn with_writer<W>(
        config: SamplerConfig,
        topology: Topology,
        reader: R,
        writer: W,
    ) -> Result<Self, SamplerError>
    where
        W: Write + Send + 'static,
    {
        let sink = OutputSink::new(Box::new(writer), config.format, true);
        Self::with_sink(config, topology, reader, sink)
    }

    fn with_sink(
        config: SamplerConfig,
        topology: Topology,
        reader: R,
        mut sink: OutputSink,
    ) -> Result<Self, SamplerError> {
        let depth = topology.reduction_depth(config.reduction);
        let reader = Arc::new(reader);
        let store = SampleStore::build(&topology, depth, Arc::clone(&reader))?;
        let max_threads = config
            .max_threads
            .unwrap_or_else(|| topology.leaf_count().max(rayon::current_num_threads()));
        let width = config.simd_width.unwrap_or_else(simd::detect);

        sink.write_header().map_err(SamplerError::Write)?;

        tracing::info!(
            leaves = topology.leaf_count(),
            groups = store.groups().len(),
            reduction = %config.reduction,
            depth,
            simd = %width,
            reader = reader.name(),
            max_threads,
            "Roofline sampler ready"
        );

        Ok(Self {
            config,
            topology,
            reader,
            store,
            bindings: BindingTable::new(max_threads),
            locator: Box::new(OsAffinity),
            sink: Mutex::new(sink),
            pool_team: OnceLock::new(),
            width,
        })
    }

    /// Replace the CPU locator (OS affinity by default).
    pub fn with_locator<L>(mut self, locator: L) -> Self
    where
        L: CpuLocator + 'static,
    {
        self.locator = Box::new(locator);
        self
    }
}

impl<R: CounterReader> Sampler<R> {
    /// Topology the sampler was built on.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Per-leaf samples and reduction groups.
    pub fn store(&self) -> &SampleStore<R::Handle> {
        &self.store
    }

    /// Configuration in effect.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Packed width used to derive flops and bytes.
    pub fn simd_width(&self) -> SimdWidth {
        self.width
    }

    /// Cached leaf of a team member, if any.
    pub fn binding(&self, member: usize) -> Option<usize> {
        self.bindings.get(member)
    }

    fn sample(&self, leaf: usize) -> &Sample<R::Handle> {
        self.store.get(leaf)
    }

    fn now(&self) -> u64 {
        clock::now_ns(self.config.clock)
    }

    /// Ask the OS where `member` runs and refresh its binding slot.
    fn bind(&self, member: usize) -> Option<usize> {
        if member >= self.bindings.capacity() {
            tracing::warn!(
                member,
                capacity = self.bindings.capacity(),
                "Team member beyond binding table, not sampled"
            );
            return None;
        }
        let leaf = match self.locator.current_cpu(member) {
            Ok(cpu) => match self.topology.pu_by_os_index(cpu) {
                Some(pu) => Some(self.topology.node(pu).logical_index()),
                None => {
                    tracing::warn!(member, cpu, "CPU is not part of the sampled topology");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(member, "Cannot resolve thread binding: {}", e);
                None
            }
        };
        match leaf {
            Some(leaf) => {
                self.bindings.set(member, leaf);
                tracing::debug!(member, leaf, "Thread bound");
            }
            None => self.bindings.clear(member),
        }
        leaf
    }

    /// Open a window as one member of a team.
    ///
    /// `counts` is this member's share of caller-supplied work; it is added to
    /// the member's sample. Every member of the team must call this, and
    /// later [`stop_in`](Self::stop_in), even if it gets `None` back.
    pub fn start_in(&self, member: &TeamMember, counts: Option<WorkCounts>) -> Option<SampleHandle> {
        let leaf = self.bind(member.index());
        if let Some(leaf) = leaf {
            let sample = self.sample(leaf);
            sample.attach();
            if let Some(counts) = counts {
                sample.add_work(counts);
            }
        }

        member.wait();

        let leaf = leaf?;
        let sample = self.sample(leaf);
        if sample.try_open() {
            if let Err(e) = sample.arm(&*self.reader, || self.now()) {
                tracing::warn!(leaf, "Counters failed to start: {}", e);
            }
        }
        Some(SampleHandle { leaf })
    }

    /// Close a window as one member of a team.
    ///
    /// Without a handle the member's cached binding is used; a member with
    /// no binding contributes nothing but still synchronizes. Returns the
    /// emitted records on exactly one member, `None` on the others.
    pub fn stop_in(
        &self,
        member: &TeamMember,
        handle: Option<SampleHandle>,
        info: Option<&str>,
    ) -> Option<Vec<NodeRecord>> {
        let now = self.now();
        let leaf = handle
            .map(|h| h.leaf)
            .or_else(|| self.bindings.get(member.index()));

        if let Some(leaf) = leaf {
            let sample = self.sample(leaf);
            if sample.try_close() {
                if let Err(e) = sample.finalize(&*self.reader, now, self.width) {
                    tracing::warn!(leaf, "Counters failed to stop: {}", e);
                }
            }
        }

        let records = if member.wait() {
            Some(self.reduce_and_emit(info))
        } else {
            None
        };
        member.wait();
        records
    }

    /// Open a window on the calling thread alone.
    pub fn start(&self, counts: Option<WorkCounts>) -> Option<SampleHandle> {
        self.start_in(&TeamMember::solo(), counts)
    }

    /// Close a window opened with [`start`](Self::start). `None` is a no-op.
    pub fn stop(&self, handle: Option<SampleHandle>, info: Option<&str>) -> Option<Vec<NodeRecord>> {
        handle?;
        self.stop_in(&TeamMember::solo(), handle, info)
    }

    /// Open a window on every thread of the rayon pool, splitting `counts`
    /// evenly between them.
    ///
    /// From inside the pool (for example under `ThreadPool::broadcast`) the
    /// pool is already forked: every worker must call this, each passing its
    /// own counts, and the workers synchronize as one team. Only that worker's
    /// handle is returned.
    pub fn start_parallel(&self, counts: Option<WorkCounts>) -> Option<SampleHandle> {
        if let Some(index) = rayon::current_thread_index() {
            let member = self.pool_member(index)?;
            return self.start_in(&member, counts);
        }
        Team::broadcast(|member| {
            let share = counts.map(|c| c.share(member.size()));
            self.start_in(&member, share);
        });
        None
    }

    /// Close a window opened with [`start_parallel`](Self::start_parallel)
    /// and return the emitted records.
    ///
    /// From inside the pool every worker must call this; the records are
    /// returned on one worker and the others get an empty list.
    pub fn stop_parallel(&self, info: Option<&str>) -> Vec<NodeRecord> {
        if let Some(index) = rayon::current_thread_index() {
            return match self.pool_member(index) {
                Some(member) => self.stop_in(&member, None, info).unwrap_or_default(),
                None => Vec::new(),
            };
        }
        Team::broadcast(|member| self.stop_in(&member, None, info))
            .into_iter()
            .flatten()
            .flatten()
            .collect()
    }

    /// Membership of a worker in the team spanning its pool.
    ///
    /// The team is sized by the first pool that enters a window from inside.
    /// Workers of a pool of another size get no membership, consistently for
    /// the whole pool, so none of them waits on a barrier it cannot complete.
    fn pool_member(&self, index: usize) -> Option<TeamMember> {
        let size = rayon::current_num_threads();
        let team = self.pool_team.get_or_init(|| {
            tracing::debug!(size, "Team spanning the rayon pool created");
            Team::new(size)
        });
        if team.size() != size || index >= size {
            tracing::warn!(
                pool = size,
                team = team.size(),
                "Pool size differs from the sampler's pool team, not sampled"
            );
            return None;
        }
        Some(team.member(index))
    }

    fn lock_sink(&self) -> MutexGuard<'_, OutputSink> {
        self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fold every group, write the records, and reset all samples.
    fn reduce_and_emit(&self, info: Option<&str>) -> Vec<NodeRecord> {
        let env_info = env::var(&self.config.info_env_var).ok();
        let info = compose_info(info.or(self.config.info.as_deref()), env_info.as_deref());

        let records: Vec<NodeRecord> = self
            .store
            .reduce_all()
            .iter()
            .map(|sample| NodeRecord::from_sample(&self.topology, sample, &info))
            .collect();

        if let Err(e) = self.lock_sink().emit(&records) {
            tracing::warn!("Failed to write records: {}", e);
        }
        if let Err(e) = self.store.reset_all(&*self.reader) {
            tracing::warn!("Counters failed to reset: {}", e);
        }
        records
    }
}

impl<R: CounterReader> Drop for Sampler<R> {
    fn drop(&mut self) {
        if let Err(e) = self.lock_sink().flush() {
            tracing::warn!("Failed to flush output: {}", e);
        }
        tracing::debug!(leaves = self.store.len(), "Roofline sampler released");
    }
}

impl<R: CounterReader> std::fmt::Debug for Sampler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("reduction", &self.config.reduction)
            .field("leaves", &self.store.len())
            .field("groups", &self.store.groups().len())
            .field("simd_width", &self.width)
            .finish()
    }
}
