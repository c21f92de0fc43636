//! Core data model for topology-aware roofline sampling.
//!
//! This crate holds the OS-independent half of the sampler:
//!
//! - [`list`]: a fixed-capacity owning list with non-owning sub-range views
//! - [`topology`]: an arena-indexed hardware hierarchy (machine, NUMA node,
//!   core, hardware thread) with ancestor and leaf-span queries
//! - [`counters`]: the hardware-counter reader contract and raw event counts
//! - [`metrics`]: derivation of flops and bytes from raw event counts
//! - [`sample`]: the per-location [`Sample`] and its reduction record
//! - [`store`]: one persistent sample per leaf unit plus the reduction groups
//!
//! The runtime crate (`roofline`) provides the OS-facing pieces: perf_event
//! counters, sysfs topology discovery, thread affinity and the concurrent
//! start/stop protocol built on top of these types.
//!
//! # Features
//!
//! - `serde` (default): `Serialize`/`Deserialize` for records and enums

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod counters;
pub mod list;
pub mod metrics;
pub mod sample;
pub mod store;
pub mod topology;
pub mod types;

pub use counters::{CounterError, CounterReader, ExternalCounts};
pub use list::{FixedList, ListError, SubRange};
pub use metrics::{DerivedMetrics, RawCounts, SimdWidth, DOUBLE_BYTES};
pub use sample::{CounterSlot, Sample, SampleRecord};
pub use store::{ReductionGroup, SampleStore, StoreError};
pub use topology::{Node, NodeId, NodeKind, Topology, TopologyBuilder, TopologyError};
pub use types::{ReductionLevel, WorkCounts};
