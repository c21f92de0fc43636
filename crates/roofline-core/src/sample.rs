//! Per-location measurement state and its reduction record.
//!
//! A [`Sample`] is bound to one leaf hardware thread for the lifetime of the
//! sampler and reused window after window. All of its fields are atomics so
//! that a team of threads can share it without locks: the counting fields
//! (`active_threads`, `open_token`) are driven by fetch-and-add, and the
//! timing/count fields are written by exactly one elected thread per window
//! and read only after a team barrier.
//!
//! The counter handle lives in a [`CounterSlot`], which hands out exclusive
//! access without ever blocking: the protocol guarantees a single user at a
//! time, and the slot turns a violation of that guarantee into an error
//! instead of a data race.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use crate::counters::{CounterError, CounterReader};
use crate::metrics::SimdWidth;
use crate::topology::{NodeId, Topology};
use crate::types::WorkCounts;

/// Exclusive, non-blocking holder of a counter handle.
pub struct CounterSlot<H> {
    busy: AtomicBool,
    handle: UnsafeCell<H>,
}

// SAFETY: the handle is only reachable through `with`, which grants access to
// at most one thread at a time via the `busy` flag (Acquire on claim, Release
// on release), or through `get_mut`, which requires exclusive ownership.
unsafe impl<H: Send> Sync for CounterSlot<H> {}

impl<H> CounterSlot<H> {
    /// Wrap a handle.
    pub fn new(handle: H) -> Self {
        Self {
            busy: AtomicBool::new(false),
            handle: UnsafeCell::new(handle),
        }
    }

    /// Run `f` with exclusive access to the handle.
    ///
    /// Returns `None` without running `f` if another thread currently holds
    /// the handle.
    pub fn with<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut H) -> R,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }
        // SAFETY: the successful compare_exchange above makes this thread the
        // only holder until `busy` is cleared below.
        let out = f(unsafe { &mut *self.handle.get() });
        self.busy.store(false, Ordering::Release);
        Some(out)
    }

    /// Mutable access through exclusive ownership.
    pub fn get_mut(&mut self) -> &mut H {
        self.handle.get_mut()
    }
}

impl<H> fmt::Debug for CounterSlot<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterSlot")
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .finish()
    }
}

fn slot_busy() -> CounterError {
    CounterError::Io("counter handle is held by another thread".to_string())
}

/// Measurement state bound to one leaf hardware thread.
pub struct Sample<H> {
    leaf: NodeId,
    cpu: usize,
    /// Ancestor of `leaf` at the reduction depth.
    location: NodeId,
    start_ns: AtomicU64,
    end_ns: AtomicU64,
    bytes: AtomicU64,
    flops: AtomicU64,
    n_threads: AtomicU64,
    active_threads: AtomicI64,
    open_token: AtomicI64,
    counters: CounterSlot<H>,
}

impl<H> Sample<H> {
    /// Create the sample for `leaf`, opening its counter handle on the
    /// leaf's CPU. The stored location is the leaf's ancestor at `depth`.
    ///
    /// # Errors
    ///
    /// Propagates the reader's failure to open the event set.
    pub fn open<R>(
        topology: &Topology,
        leaf: NodeId,
        depth: usize,
        reader: &R,
    ) -> Result<Self, CounterError>
    where
        R: CounterReader<Handle = H> + ?Sized,
    {
        let cpu = topology.node(leaf).os_index();
        let handle = reader.open(cpu)?;
        Ok(Self {
            leaf,
            cpu,
            location: topology.ancestor_at(leaf, depth),
            start_ns: AtomicU64::new(0),
            end_ns: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            flops: AtomicU64::new(0),
            n_threads: AtomicU64::new(0),
            active_threads: AtomicI64::new(0),
            open_token: AtomicI64::new(0),
            counters: CounterSlot::new(handle),
        })
    }

    /// Leaf hardware thread this sample measures.
    pub fn leaf(&self) -> NodeId {
        self.leaf
    }

    /// OS CPU number of the leaf.
    pub fn cpu(&self) -> usize {
        self.cpu
    }

    /// Reduction-level node this sample reports to.
    pub fn location(&self) -> NodeId {
        self.location
    }

    /// Threads attached since the last window reset.
    pub fn active_threads(&self) -> i64 {
        self.active_threads.load(Ordering::Acquire)
    }

    /// Contributing threads recorded when the window was finalized.
    pub fn n_threads(&self) -> u64 {
        self.n_threads.load(Ordering::Relaxed)
    }

    /// Snapshot of the measured values.
    pub fn record(&self) -> SampleRecord {
        SampleRecord {
            location: self.location,
            start_ns: self.start_ns.load(Ordering::Relaxed),
            end_ns: self.end_ns.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            flops: self.flops.load(Ordering::Relaxed),
            n_threads: self.n_threads.load(Ordering::Relaxed),
        }
    }

    /// Register one more contributing thread; returns the new count.
    pub fn attach(&self) -> i64 {
        self.active_threads.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Add caller-supplied totals.
    pub fn add_work(&self, counts: WorkCounts) {
        self.flops.fetch_add(counts.flops, Ordering::Relaxed);
        self.bytes.fetch_add(counts.bytes, Ordering::Relaxed);
    }

    /// Opening election: true for exactly the first caller of the window.
    pub fn try_open(&self) -> bool {
        self.open_token.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Closing election: true for exactly the last caller of the window.
    pub fn try_close(&self) -> bool {
        self.open_token.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Start the counters, then record the start timestamp from `now`.
    ///
    /// Only the thread that won [`try_open`](Self::try_open) calls this. The
    /// timestamp is recorded even if the counters fail to start.
    pub fn arm<R, F>(&self, reader: &R, now: F) -> Result<(), CounterError>
    where
        R: CounterReader<Handle = H> + ?Sized,
        F: FnOnce() -> u64,
    {
        let started = self
            .counters
            .with(|handle| reader.start(handle))
            .unwrap_or_else(|| Err(slot_busy()));
        self.start_ns.store(now(), Ordering::Relaxed);
        started
    }

    /// Stop the counters and close the window at `end_ns`.
    ///
    /// Only the thread that won [`try_close`](Self::try_close) calls this.
    /// When the reader returns raw counts, flops and bytes are derived from
    /// them with `width`; otherwise the caller-supplied totals are kept.
    ///
    /// The closing thread may have read its clock before the opening thread
    /// recorded the start, so the end is never stored earlier than the start.
    pub fn finalize<R>(&self, reader: &R, end_ns: u64, width: SimdWidth) -> Result<(), CounterError>
    where
        R: CounterReader<Handle = H> + ?Sized,
    {
        let stopped = self
            .counters
            .with(|handle| reader.stop(handle))
            .unwrap_or_else(|| Err(slot_busy()));
        let start_ns = self.start_ns.load(Ordering::Relaxed);
        self.end_ns.store(end_ns.max(start_ns), Ordering::Relaxed);
        let threads = self.active_threads.load(Ordering::Acquire).max(0) as u64;
        self.n_threads.store(threads, Ordering::Relaxed);
        match stopped {
            Ok(Some(raw)) => {
                let derived = raw.derive(width);
                self.flops.store(derived.flops, Ordering::Relaxed);
                self.bytes.store(derived.bytes, Ordering::Relaxed);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Zero timestamps, counts and the thread total, and reset the counter
    /// handle. Leaves the attachment counters alone; see
    /// [`clear_threads`](Self::clear_threads).
    pub fn reset<R>(&self, reader: &R) -> Result<(), CounterError>
    where
        R: CounterReader<Handle = H> + ?Sized,
    {
        self.start_ns.store(0, Ordering::Relaxed);
        self.end_ns.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
        self.flops.store(0, Ordering::Relaxed);
        self.n_threads.store(0, Ordering::Relaxed);
        self.counters
            .with(|handle| reader.reset(handle))
            .unwrap_or_else(|| Err(slot_busy()))
    }

    /// Zero the attachment counters once every thread has left the window.
    pub fn clear_threads(&self) {
        self.active_threads.store(0, Ordering::Release);
        self.open_token.store(0, Ordering::Release);
    }

    /// Release the counter handle.
    pub fn close<R>(&mut self, reader: &R)
    where
        R: CounterReader<Handle = H> + ?Sized,
    {
        reader.close(self.counters.get_mut());
    }
}

impl<H> fmt::Debug for Sample<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("leaf", &self.leaf)
            .field("cpu", &self.cpu)
            .field("record", &self.record())
            .field("active_threads", &self.active_threads())
            .finish()
    }
}

/// Plain snapshot of a sample, used as the reduction accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SampleRecord {
    /// Node the record is attributed to.
    pub location: NodeId,
    /// Window start in nanoseconds, 0 if unset.
    pub start_ns: u64,
    /// Window end in nanoseconds, 0 if unset.
    pub end_ns: u64,
    /// Bytes moved.
    pub bytes: u64,
    /// Floating-point operations.
    pub flops: u64,
    /// Contributing threads.
    pub n_threads: u64,
}

impl SampleRecord {
    /// Zeroed record attributed to `location`.
    pub fn empty(location: NodeId) -> Self {
        Self {
            location,
            start_ns: 0,
            end_ns: 0,
            bytes: 0,
            flops: 0,
            n_threads: 0,
        }
    }

    /// Window duration.
    pub fn elapsed_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }

    /// Fold `with` into `self`.
    ///
    /// Keeps the timestamps of the longer window (the slowest contributor
    /// bounds the region) and sums bytes, flops and thread counts. The
    /// location of `self` is preserved.
    pub fn accumulate(mut self, with: &SampleRecord) -> Self {
        if self.elapsed_ns() <= with.elapsed_ns() {
            self.start_ns = with.start_ns;
            self.end_ns = with.end_ns;
        }
        self.bytes = self.bytes.saturating_add(with.bytes);
        self.flops = self.flops.saturating_add(with.flops);
        self.n_threads = self.n_threads.saturating_add(with.n_threads);
        self
    }
}
