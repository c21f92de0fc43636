//! Flop and byte derivation from raw hardware event counts.
//!
//! The hardware reader delivers four counts per window: scalar double
//! floating-point ops, packed double floating-point ops, retired store uops
//! and retired load uops. Flops weight packed ops by the SIMD lane count.
//! Bytes are estimated from the memory/flop uop mix:
//!
//! ```text
//! fused = scalar + packed
//! mem   = stores + loads
//! bytes = (8 * mem / fused) * (W * packed + scalar)   if fused > 0
//! bytes = 8 * mem                                      otherwise
//! ```
//!
//! The first branch assumes the memory and floating-point uop mixes are
//! proportionally coupled within the window. Integer division is kept as is,
//! and sums and products saturate at `u64::MAX`.

use std::fmt;

/// Size in bytes of one double-precision element.
pub const DOUBLE_BYTES: u64 = 8;

/// Vector width of packed double-precision instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SimdWidth {
    /// No packed instructions; one double per op.
    #[default]
    Scalar,
    /// 128-bit vectors (SSE2, NEON): two doubles.
    Packed128,
    /// 256-bit vectors (AVX, AVX2): four doubles.
    Packed256,
    /// 512-bit vectors (AVX-512): eight doubles.
    Packed512,
}

impl SimdWidth {
    /// Doubles processed by one packed instruction.
    pub fn lanes(&self) -> u64 {
        match self {
            SimdWidth::Scalar => 1,
            SimdWidth::Packed128 => 2,
            SimdWidth::Packed256 => 4,
            SimdWidth::Packed512 => 8,
        }
    }

    /// Vector register width in bytes.
    pub fn vector_bytes(&self) -> u64 {
        self.lanes() * DOUBLE_BYTES
    }

    /// Width for a given lane count, if it is one of the supported widths.
    pub fn from_lanes(lanes: u64) -> Option<Self> {
        match lanes {
            1 => Some(SimdWidth::Scalar),
            2 => Some(SimdWidth::Packed128),
            4 => Some(SimdWidth::Packed256),
            8 => Some(SimdWidth::Packed512),
            _ => None,
        }
    }
}

impl fmt::Display for SimdWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.vector_bytes() * 8)
    }
}

/// Raw event counts read from the hardware reader at window close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawCounts {
    /// Scalar double-precision floating-point instructions retired.
    pub scalar_ops: u64,
    /// Packed double-precision floating-point instructions retired.
    pub packed_ops: u64,
    /// Store uops retired.
    pub store_uops: u64,
    /// Load uops retired.
    pub load_uops: u64,
}

/// Flops and bytes derived from a [`RawCounts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DerivedMetrics {
    /// Floating-point operations.
    pub flops: u64,
    /// Estimated bytes moved.
    pub bytes: u64,
}

impl RawCounts {
    /// Uops carrying floating-point work.
    pub fn fused_uops(&self) -> u64 {
        self.scalar_ops.saturating_add(self.packed_ops)
    }

    /// Uops touching memory.
    pub fn mem_uops(&self) -> u64 {
        self.store_uops.saturating_add(self.load_uops)
    }

    /// Floating-point operations for the given vector width.
    pub fn flops(&self, width: SimdWidth) -> u64 {
        self.scalar_ops
            .saturating_add(width.lanes().saturating_mul(self.packed_ops))
    }

    /// Estimated bytes moved for the given vector width.
    pub fn bytes(&self, width: SimdWidth) -> u64 {
        let fused = self.fused_uops();
        let mem = self.mem_uops();
        if fused > 0 {
            (DOUBLE_BYTES.saturating_mul(mem) / fused).saturating_mul(self.flops(width))
        } else {
            DOUBLE_BYTES.saturating_mul(mem)
        }
    }

    /// Derive both metrics at once.
    pub fn derive(&self, width: SimdWidth) -> DerivedMetrics {
        DerivedMetrics {
            flops: self.flops(width),
            bytes: self.bytes(width),
        }
    }
}
