//! Sampler configuration.
//!
//! Everything is fixed when the [`Sampler`](crate::Sampler) is created. The
//! defaults print text records to stdout, reduced per NUMA node.
//!
//! # Environment variables
//!
//! [`SamplerConfig::from_env`] applies these overrides on top of the defaults:
//!
//! | variable             | effect                                        |
//! |----------------------|-----------------------------------------------|
//! | `ROOFLINE_OUTPUT`    | output file path (`-` or `stdout` for stdout) |
//! | `ROOFLINE_APPEND`    | `1`/`true`/`yes` to append to the output file |
//! | `ROOFLINE_REDUCTION` | `machine`, `numa` or `core`                   |
//!
//! The info tag environment variable (default `ROOFLINE_INFO`) is read at each
//! emission, not at init.

use std::env;
use std::fmt;
use std::path::PathBuf;

use roofline_core::{ReductionLevel, SimdWidth};

/// Environment variable naming the output file.
pub const OUTPUT_ENV: &str = "ROOFLINE_OUTPUT";
/// Environment variable selecting append mode.
pub const APPEND_ENV: &str = "ROOFLINE_APPEND";
/// Environment variable selecting the reduction level.
pub const REDUCTION_ENV: &str = "ROOFLINE_REDUCTION";
/// Default environment variable holding the info tag.
pub const DEFAULT_INFO_ENV: &str = "ROOFLINE_INFO";

/// Where records are written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    /// Standard output. The header is always printed.
    #[default]
    Stdout,
    /// A file, created if missing.
    File(PathBuf),
}

/// Record encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Fixed-width columns preceded by a header line.
    #[default]
    Text,
    /// One JSON object per line, no header.
    JsonLines,
}

impl OutputFormat {
    /// Parse a format by name: `text`, or `json` / `jsonl` / `json-lines`.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Some(OutputFormat::Text),
            "json" | "jsonl" | "json-lines" | "jsonlines" => Some(OutputFormat::JsonLines),
            _ => None,
        }
    }
}

/// Clock used for window timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockSource {
    /// `CLOCK_MONOTONIC`: wall-clock time, comparable across threads.
    #[default]
    Monotonic,
    /// `CLOCK_THREAD_CPUTIME_ID`: CPU time of the calling thread. Start and
    /// end may be read by different threads, so this is only meaningful for
    /// single-thread windows.
    ThreadCpu,
}

impl ClockSource {
    /// Parse a clock by name: `monotonic` or `thread` / `thread-cpu`.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "monotonic" | "wall" => Some(ClockSource::Monotonic),
            "thread" | "thread-cpu" | "threadcpu" | "cpu" => Some(ClockSource::ThreadCpu),
            _ => None,
        }
    }
}

impl fmt::Display for ClockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockSource::Monotonic => write!(f, "monotonic"),
            ClockSource::ThreadCpu => write!(f, "thread-cpu"),
        }
    }
}

/// Configuration for a [`Sampler`](crate::Sampler).
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Output destination. Default: stdout.
    pub output: OutputTarget,

    /// Append to an existing output file instead of truncating it.
    ///
    /// The header is only written when the file is new or truncated.
    /// Ignored for stdout. Default: false.
    pub append: bool,

    /// Hierarchy level records are reduced to. Default: NUMA node.
    pub reduction: ReductionLevel,

    /// Info tag used when `stop` is called without one.
    pub info: Option<String>,

    /// Environment variable appended to the info tag. Default: `ROOFLINE_INFO`.
    pub info_env_var: String,

    /// Record encoding. Default: text.
    pub format: OutputFormat,

    /// Timestamp clock. Default: monotonic.
    pub clock: ClockSource,

    /// Size of the thread binding table.
    ///
    /// Team member indices at or above this bound get no sample. Default:
    /// the larger of the leaf count and the rayon pool size.
    pub max_threads: Option<usize>,

    /// Packed-instruction width. Default: detected from CPU features.
    pub simd_width: Option<SimdWidth>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            output: OutputTarget::Stdout,
            append: false,
            reduction: ReductionLevel::default(),
            info: None,
            info_env_var: DEFAULT_INFO_ENV.to_string(),
            format: OutputFormat::Text,
            clock: ClockSource::Monotonic,
            max_threads: None,
            simd_width: None,
        }
    }
}

impl SamplerConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `ROOFLINE_OUTPUT`, `ROOFLINE_APPEND` and
    /// `ROOFLINE_REDUCTION`.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|name| env::var(name).ok())
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(output) = lookup(OUTPUT_ENV) {
            let output = output.trim();
            self.output = match output {
                "" | "-" | "stdout" => OutputTarget::Stdout,
                path => OutputTarget::File(PathBuf::from(path)),
            };
        }
        if let Some(append) = lookup(APPEND_ENV) {
            match parse_flag(&append) {
                Some(flag) => self.append = flag,
                None => tracing::warn!("Ignoring {}={:?}: expected a boolean", APPEND_ENV, append),
            }
        }
        if let Some(reduction) = lookup(REDUCTION_ENV) {
            match ReductionLevel::by_name(&reduction) {
                Some(level) => self.reduction = level,
                None => tracing::warn!(
                    "Ignoring {}={:?}: expected machine, numa or core",
                    REDUCTION_ENV,
                    reduction
                ),
            }
        }
        self
    }

    /// Write records to stdout.
    pub fn stdout(mut self) -> Self {
        self.output = OutputTarget::Stdout;
        self
    }

    /// Write records to a file.
    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = OutputTarget::File(path.into());
        self
    }

    /// Set append mode.
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Set the reduction level.
    pub fn reduction(mut self, level: ReductionLevel) -> Self {
        self.reduction = level;
        self
    }

    /// Set the default info tag.
    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Set the environment variable holding the info tag.
    pub fn info_env_var(mut self, name: impl Into<String>) -> Self {
        self.info_env_var = name.into();
        self
    }

    /// Set the record encoding.
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the timestamp clock.
    pub fn clock(mut self, clock: ClockSource) -> Self {
        self.clock = clock;
        self
    }

    /// Set the binding table size.
    pub fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = Some(n);
        self
    }

    /// Override SIMD width detection.
    pub fn simd_width(mut self, width: SimdWidth) -> Self {
        self.simd_width = Some(width);
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
