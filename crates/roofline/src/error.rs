//! Error type for sampler initialization.
//!
//! Only init can fail. Per-window problems (an unbound thread, a counter that
//! refuses to start) are logged and degrade to "no sample".

use std::fmt;
use std::io;
use std::path::PathBuf;

use roofline_core::{CounterError, ListError, StoreError, TopologyError};

/// Error returned when a [`Sampler`](crate::Sampler) cannot be created.
#[derive(Debug)]
pub enum SamplerError {
    /// The output file could not be opened.
    Output {
        /// Requested output path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Writing the header failed.
    Write(io::Error),
    /// Topology discovery or construction failed.
    Topology(TopologyError),
    /// A counter handle could not be opened.
    Counter(CounterError),
    /// The sample store could not hold the topology.
    Store(ListError),
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerError::Output { path, source } => {
                write!(f, "cannot open output {}: {}", path.display(), source)
            }
            SamplerError::Write(e) => write!(f, "cannot write output: {}", e),
            SamplerError::Topology(e) => write!(f, "{}", e),
            SamplerError::Counter(e) => write!(f, "{}", e),
            SamplerError::Store(e) => write!(f, "sample store: {}", e),
        }
    }
}

impl std::error::Error for SamplerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SamplerError::Output { source, .. } => Some(source),
            SamplerError::Write(e) => Some(e),
            SamplerError::Topology(e) => Some(e),
            SamplerError::Counter(e) => Some(e),
            SamplerError::Store(e) => Some(e),
        }
    }
}

impl From<TopologyError> for SamplerError {
    fn from(e: TopologyError) -> Self {
        SamplerError::Topology(e)
    }
}

impl From<CounterError> for SamplerError {
    fn from(e: CounterError) -> Self {
        SamplerError::Counter(e)
    }
}

impl From<StoreError> for SamplerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Counter(e) => SamplerError::Counter(e),
            StoreError::List(e) => SamplerError::Store(e),
        }
    }
}
