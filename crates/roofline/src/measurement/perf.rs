//! Hardware event counting for Linux using perf_event.
//!
//! Each leaf CPU gets four raw PMU events, counted for every process on that
//! CPU:
//!
//! | event                         | encoding (event, umask)            |
//! |-------------------------------|------------------------------------|
//! | scalar double FP instructions | `FP_ARITH_INST_RETIRED` 0xC7, 0x01 |
//! | packed double FP instructions | 0xC7, 0x04 / 0x10 / 0x40 by width  |
//! | retired stores                | `MEM_INST_RETIRED` 0xD0, 0x82      |
//! | retired loads                 | 0xD0, 0x81                         |
//!
//! The encodings are Intel core PMU events (Skylake and later). Other
//! microarchitectures reject them at open time.
//!
//! # Requirements
//!
//! - Linux kernel with perf_event support
//! - CPU-wide counting needs root, `CAP_PERFMON`, or
//!   `kernel.perf_event_paranoid <= 0`
//! - Enable with `--features perf` (enabled by default)

use std::io;

use ::perf_event2::events::Raw;
use ::perf_event2::{Builder, Counter};
use roofline_core::{CounterError, CounterReader, RawCounts, SimdWidth};

const FP_ARITH_INST_RETIRED: u64 = 0xC7;
const SCALAR_DOUBLE: u64 = 0x01;
const PACKED_DOUBLE_128B: u64 = 0x04;
const PACKED_DOUBLE_256B: u64 = 0x10;
const PACKED_DOUBLE_512B: u64 = 0x40;

const MEM_INST_RETIRED: u64 = 0xD0;
const ALL_LOADS: u64 = 0x81;
const ALL_STORES: u64 = 0x82;

fn raw_config(event: u64, umask: u64) -> u64 {
    event | (umask << 8)
}

/// The four raw event configurations for a packed width, in
/// `[scalar, packed, stores, loads]` order.
pub fn event_configs(width: SimdWidth) -> [u64; 4] {
    let packed = match width {
        SimdWidth::Scalar | SimdWidth::Packed128 => PACKED_DOUBLE_128B,
        SimdWidth::Packed256 => PACKED_DOUBLE_256B,
        SimdWidth::Packed512 => PACKED_DOUBLE_512B,
    };
    [
        raw_config(FP_ARITH_INST_RETIRED, SCALAR_DOUBLE),
        raw_config(FP_ARITH_INST_RETIRED, packed),
        raw_config(MEM_INST_RETIRED, ALL_STORES),
        raw_config(MEM_INST_RETIRED, ALL_LOADS),
    ]
}

/// Open counters on one CPU.
pub struct EventSet {
    cpu: usize,
    counters: [Counter; 4],
}

impl EventSet {
    /// CPU the counters are attached to.
    pub fn cpu(&self) -> usize {
        self.cpu
    }

    fn each<F>(&mut self, mut op: F) -> Result<(), CounterError>
    where
        F: FnMut(&mut Counter) -> io::Result<()>,
    {
        for counter in &mut self.counters {
            op(counter).map_err(|e| CounterError::Io(format!("cpu {}: {}", self.cpu, e)))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSet").field("cpu", &self.cpu).finish()
    }
}

/// perf_event reader for the scalar/packed/store/load event set.
#[derive(Debug, Clone, Copy)]
pub struct PerfCounters {
    width: SimdWidth,
    configs: [u64; 4],
}

impl PerfCounters {
    /// Reader counting packed instructions of `width`.
    pub fn new(width: SimdWidth) -> Self {
        Self {
            width,
            configs: event_configs(width),
        }
    }

    /// Packed width the event set counts.
    pub fn width(&self) -> SimdWidth {
        self.width
    }
}

fn open_error(cpu: usize, e: io::Error) -> CounterError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        CounterError::PermissionDenied
    } else {
        CounterError::Open {
            cpu,
            reason: e.to_string(),
        }
    }
}

impl CounterReader for PerfCounters {
    type Handle = EventSet;

    fn open(&self, cpu: usize) -> Result<EventSet, CounterError> {
        let open = |config: u64| {
            Builder::new(Raw::new(config))
                .one_cpu(cpu)
                .any_pid()
                .build()
                .map_err(|e| open_error(cpu, e))
        };
        let [scalar, packed, stores, loads] = self.configs;
        let counters = [open(scalar)?, open(packed)?, open(stores)?, open(loads)?];
        tracing::debug!(cpu, width = %self.width, "Opened perf event set");
        Ok(EventSet { cpu, counters })
    }

    fn start(&self, set: &mut EventSet) -> Result<(), CounterError> {
        set.each(|c| c.reset())?;
        set.each(|c| c.enable())
    }

    fn stop(&self, set: &mut EventSet) -> Result<Option<RawCounts>, CounterError> {
        set.each(|c| c.disable())?;
        let mut values = [0u64; 4];
        for (value, counter) in values.iter_mut().zip(set.counters.iter_mut()) {
            *value = counter
                .read()
                .map_err(|e| CounterError::Io(format!("cpu {}: {}", set.cpu, e)))?;
        }
        let [scalar_ops, packed_ops, store_uops, load_uops] = values;
        Ok(Some(RawCounts {
            scalar_ops,
            packed_ops,
            store_uops,
            load_uops,
        }))
    }

    fn reset(&self, set: &mut EventSet) -> Result<(), CounterError> {
        set.each(|c| c.reset())
    }

    fn close(&self, set: &mut EventSet) {
        if let Err(e) = set.each(|c| c.disable()) {
            tracing::debug!("Disabling counters on close failed: {}", e);
        }
    }

    fn name(&self) -> &'static str {
        "perf_event"
    }
}
