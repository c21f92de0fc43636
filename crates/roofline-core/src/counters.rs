//! Hardware-counter reader contract.
//!
//! A reader opens a fixed event set bound to one hardware execution unit and
//! reports the four [`RawCounts`] when a window closes. Readers that do not
//! count anything (the caller supplies [`WorkCounts`](crate::WorkCounts)
//! instead) return `None` from [`CounterReader::stop`].

use std::fmt;

use crate::metrics::RawCounts;

/// Error returned by a [`CounterReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    /// The event set could not be opened on the given CPU.
    Open {
        /// OS index of the CPU.
        cpu: usize,
        /// Underlying failure description.
        reason: String,
    },
    /// Insufficient privileges to open hardware counters.
    PermissionDenied,
    /// Starting, stopping, resetting or reading an open event set failed.
    Io(String),
    /// Hardware counters are not available on this platform.
    Unsupported,
}

impl fmt::Display for CounterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterError::Open { cpu, reason } => {
                write!(f, "failed to open counters on cpu {}: {}", cpu, reason)
            }
            CounterError::PermissionDenied => write!(
                f,
                "hardware counters require elevated privileges \
                 (root, CAP_PERFMON, or kernel.perf_event_paranoid <= 0)"
            ),
            CounterError::Io(msg) => write!(f, "counter operation failed: {}", msg),
            CounterError::Unsupported => {
                write!(f, "hardware counters are not supported on this platform")
            }
        }
    }
}

impl std::error::Error for CounterError {}

/// Source of raw event counts for one hardware execution unit.
///
/// A handle is owned by exactly one sample; the sampler guarantees that at
/// most one thread operates on a given handle at a time.
pub trait CounterReader: Send + Sync {
    /// Per-unit state, e.g. a set of open counter descriptors.
    type Handle: Send;

    /// Open the event set on the CPU with OS index `cpu`.
    fn open(&self, cpu: usize) -> Result<Self::Handle, CounterError>;

    /// Start counting from zero.
    fn start(&self, handle: &mut Self::Handle) -> Result<(), CounterError>;

    /// Stop counting and return the raw counts, or `None` if this reader
    /// does not count (caller-supplied totals are used instead).
    fn stop(&self, handle: &mut Self::Handle) -> Result<Option<RawCounts>, CounterError>;

    /// Zero the internal counters without closing the handle.
    fn reset(&self, handle: &mut Self::Handle) -> Result<(), CounterError>;

    /// Release the handle. Called exactly once, when its sample is dropped.
    fn close(&self, handle: &mut Self::Handle);

    /// Short name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Reader for windows whose flops and bytes are supplied by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalCounts;

impl CounterReader for ExternalCounts {
    type Handle = ();

    fn open(&self, _cpu: usize) -> Result<(), CounterError> {
        Ok(())
    }

    fn start(&self, _handle: &mut ()) -> Result<(), CounterError> {
        Ok(())
    }

    fn stop(&self, _handle: &mut ()) -> Result<Option<RawCounts>, CounterError> {
        Ok(None)
    }

    fn reset(&self, _handle: &mut ()) -> Result<(), CounterError> {
        Ok(())
    }

    fn close(&self, _handle: &mut ()) {}

    fn name(&self) -> &'static str {
        "external"
    }
}
