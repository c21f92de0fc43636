//! OS-facing measurement pieces.
//!
//! - [`clock`]: nanosecond timestamps (`CLOCK_MONOTONIC` or per-thread CPU time)
//! - [`affinity`]: which CPU a thread is bound to, and pinning
//! - [`simd`]: packed double-precision width of the host
//! - [`perf`]: perf_event hardware counters (Linux, `perf` feature)

pub mod affinity;
pub mod clock;
#[cfg(all(target_os = "linux", feature = "perf"))]
pub mod perf;
pub mod simd;

pub use affinity::{AffinityError, AffinityGuard, CpuLocator, OsAffinity};
#[cfg(all(target_os = "linux", feature = "perf"))]
pub use perf::{EventSet, PerfCounters};
