//! Record emission.
//!
//! Each window close produces one [`NodeRecord`] per reduction-level node,
//! written to an [`OutputSink`] as fixed-width text ([`text`]) or JSON lines
//! ([`json`]).

pub mod json;
pub mod text;

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};

use serde::{Deserialize, Serialize};

use roofline_core::{SampleRecord, Topology};

use crate::config::{OutputFormat, OutputTarget, SamplerConfig};
use crate::error::SamplerError;

/// Record-type tag of application samples.
pub const RECORD_TAG: &str = "APP";

/// One reduced measurement, as emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Short node name, e.g. `NUMANode:0`.
    pub location: String,
    /// Window duration of the slowest contributor.
    pub nanoseconds: u64,
    /// Bytes moved.
    pub bytes: u64,
    /// Floating-point operations.
    pub flops: u64,
    /// Contributing threads.
    pub n_threads: u64,
    /// Record-type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Caller and environment info tag.
    pub info: String,
    /// Window start timestamp.
    pub start_ns: u64,
    /// Window end timestamp.
    pub end_ns: u64,
}

impl NodeRecord {
    /// Build the emitted form of a reduced sample.
    pub fn from_sample(topology: &Topology, sample: &SampleRecord, info: &str) -> Self {
        Self {
            location: topology.name(sample.location),
            nanoseconds: sample.elapsed_ns(),
            bytes: sample.bytes,
            flops: sample.flops,
            n_threads: sample.n_threads,
            kind: RECORD_TAG.to_string(),
            info: info.to_string(),
            start_ns: sample.start_ns,
            end_ns: sample.end_ns,
        }
    }
}

/// Join the caller and environment info tags with `_`. Empty tags count as
/// absent.
pub fn compose_info(caller: Option<&str>, env: Option<&str>) -> String {
    let caller = caller.filter(|s| !s.is_empty());
    let env = env.filter(|s| !s.is_empty());
    match (caller, env) {
        (Some(c), Some(e)) => format!("{}_{}", c, e),
        (Some(c), None) => c.to_string(),
        (None, Some(e)) => e.to_string(),
        (None, None) => String::new(),
    }
}

/// Line-oriented record destination.
pub struct OutputSink {
    writer: Box<dyn Write + Send>,
    format: OutputFormat,
    header_pending: bool,
}

impl OutputSink {
    /// Open the destination named by `config`.
    ///
    /// The header is due for stdout, for a truncated file, and for an
    /// appended file that is missing or empty.
    pub fn open(config: &SamplerConfig) -> Result<Self, SamplerError> {
        match &config.output {
            OutputTarget::Stdout => Ok(Self::new(Box::new(io::stdout()), config.format, true)),
            OutputTarget::File(path) => {
                let mut options = OpenOptions::new();
                options.create(true);
                if config.append {
                    options.append(true);
                } else {
                    options.write(true).truncate(true);
                }
                let file = options.open(path).map_err(|source| SamplerError::Output {
                    path: path.clone(),
                    source,
                })?;
                let header = !config.append
                    || file.metadata().map(|m| m.len() == 0).unwrap_or(true);
                tracing::debug!(path = %path.display(), append = config.append, header, "Opened output file");
                Ok(Self::new(Box::new(BufWriter::new(file)), config.format, header))
            }
        }
    }

    /// Wrap an arbitrary writer. `header` selects whether the header is due.
    pub fn new(writer: Box<dyn Write + Send>, format: OutputFormat, header: bool) -> Self {
        Self {
            writer,
            format,
            header_pending: header,
        }
    }

    /// Write the header if it is due and the format has one.
    pub fn write_header(&mut self) -> io::Result<()> {
        if !std::mem::take(&mut self.header_pending) {
            return Ok(());
        }
        if self.format == OutputFormat::Text {
            writeln!(self.writer, "{}", text::header())?;
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Write `records`, one per line, then flush.
    pub fn emit(&mut self, records: &[NodeRecord]) -> io::Result<()> {
        for record in records {
            match self.format {
                OutputFormat::Text => writeln!(self.writer, "{}", text::format_record(record))?,
                OutputFormat::JsonLines => {
                    let line = json::to_json_line(record)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    writeln!(self.writer, "{}", line)?;
                }
            }
        }
        self.writer.flush()
    }

    /// Flush buffered output.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("format", &self.format)
            .field("header_pending", &self.header_pending)
            .finish()
    }
}
