//! Topology-aware sampling of memory traffic and flop throughput for roofline
//! analysis.
//!
//! A [`Sampler`] owns one persistent sample per hardware thread of the
//! machine. A team of threads brackets a region with a start/stop pair; each
//! thread is attributed to the hardware thread it runs on, exactly one thread
//! per sample arms and finalizes it, and on stop the samples are folded up to
//! the configured reduction level (machine, NUMA node or core) and one record
//! per node is written.
//!
//! Flops and bytes come either from the caller ([`WorkCounts`], with
//! [`ExternalCounts`]) or from hardware counters (`PerfCounters`, Linux with
//! the `perf` feature).
//!
//! # Quick Start
//!
//! ```ignore
//! use roofline::{Sampler, SamplerConfig, WorkCounts};
//!
//! let sampler = Sampler::external(SamplerConfig::from_env())?;
//!
//! // Every rayon worker opens a window; 1 GFlop / 8 GB split between them.
//! sampler.start_parallel(Some(WorkCounts::new(1_000_000_000, 8_000_000_000)));
//! run_kernel();
//! let records = sampler.stop_parallel(Some("kernel"));
//! ```
//!
//! Threads the caller already manages can join a window as members of a
//! [`Team`]:
//!
//! ```ignore
//! use roofline::{Sampler, SamplerConfig, Team};
//!
//! let sampler = Sampler::external(SamplerConfig::new())?;
//! Team::run(4, |member| {
//!     let handle = sampler.start_in(&member, None);
//!     work(member.index());
//!     sampler.stop_in(&member, handle, Some("phase1"));
//! });
//! ```
//!
//! # Output
//!
//! ```text
//!         Location      Nanoseconds            Bytes            Flops  n_threads       type info
//!       NUMANode:0          1520000        819200000        409600000          4        APP kernel
//! ```
//!
//! # Features
//!
//! - `perf` (default): hardware counters through Linux perf_event

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bindings;
pub mod config;
mod error;
pub mod measurement;
pub mod output;
mod sampler;
pub mod team;
pub mod topology;

pub use config::{ClockSource, OutputFormat, OutputTarget, SamplerConfig};
pub use error::SamplerError;
pub use measurement::{AffinityError, AffinityGuard, CpuLocator, OsAffinity};
#[cfg(all(target_os = "linux", feature = "perf"))]
pub use measurement::PerfCounters;
pub use output::{NodeRecord, RECORD_TAG};
pub use sampler::{SampleHandle, Sampler};
pub use team::{Team, TeamMember};

pub use roofline_core::{
    CounterError, CounterReader, ExternalCounts, RawCounts, ReductionLevel, SimdWidth, Topology,
    TopologyBuilder, TopologyError, WorkCounts,
};
