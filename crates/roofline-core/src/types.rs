//! Small shared value types.

use std::fmt;

/// Hierarchy level at which samples are aggregated and reported.
///
/// Chosen once when the sampler is created and fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReductionLevel {
    /// One record for the whole machine.
    Machine,
    /// One record per NUMA node.
    #[default]
    Numa,
    /// One record per physical core.
    Core,
}

impl ReductionLevel {
    /// All levels, coarsest first.
    pub const ALL: [ReductionLevel; 3] = [
        ReductionLevel::Machine,
        ReductionLevel::Numa,
        ReductionLevel::Core,
    ];

    /// Parse a level by name (case-insensitive).
    ///
    /// Accepts `machine`, `numa` / `node` / `numanode`, and `core`.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "machine" => Some(ReductionLevel::Machine),
            "numa" | "node" | "numanode" => Some(ReductionLevel::Numa),
            "core" => Some(ReductionLevel::Core),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReductionLevel::Machine => "machine",
            ReductionLevel::Numa => "numa",
            ReductionLevel::Core => "core",
        }
    }
}

impl fmt::Display for ReductionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied flop and byte totals for a window.
///
/// Used instead of hardware counters when the caller knows how much work a
/// region performs. When a team shares one window the totals are divided
/// evenly across its members; the division assumes uniform per-thread work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkCounts {
    /// Floating-point operations.
    pub flops: u64,
    /// Bytes moved to or from memory.
    pub bytes: u64,
}

impl WorkCounts {
    /// Create a new pair of totals.
    pub fn new(flops: u64, bytes: u64) -> Self {
        Self { flops, bytes }
    }

    /// The share of one member in a team of `team_size` threads.
    pub fn share(&self, team_size: usize) -> Self {
        let n = team_size.max(1) as u64;
        Self {
            flops: self.flops / n,
            bytes: self.bytes / n,
        }
    }
}
