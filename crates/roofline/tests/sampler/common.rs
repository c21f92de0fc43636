//! Shared test fixtures.

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use roofline::{AffinityError, CounterError, CounterReader, CpuLocator, RawCounts};

/// Call counters shared between a test and its [`ScriptedCounters`].
#[derive(Debug, Default)]
pub struct Calls {
    pub opens: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub resets: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Deterministic counter reader returning fixed raw counts, or none at all.
#[derive(Debug, Clone)]
pub struct ScriptedCounters {
    pub calls: Arc<Calls>,
    pub raw: Option<RawCounts>,
}

impl ScriptedCounters {
    pub fn external() -> Self {
        Self {
            calls: Arc::new(Calls::default()),
            raw: None,
        }
    }

    pub fn returning(raw: RawCounts) -> Self {
        Self {
            calls: Arc::new(Calls::default()),
            raw: Some(raw),
        }
    }
}

impl CounterReader for ScriptedCounters {
    type Handle = usize;

    fn open(&self, cpu: usize) -> Result<usize, CounterError> {
        self.calls.opens.fetch_add(1, Ordering::SeqCst);
        Ok(cpu)
    }

    fn start(&self, _cpu: &mut usize) -> Result<(), CounterError> {
        self.calls.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self, _cpu: &mut usize) -> Result<Option<RawCounts>, CounterError> {
        self.calls.stops.fetch_add(1, Ordering::SeqCst);
        Ok(self.raw)
    }

    fn reset(&self, _cpu: &mut usize) -> Result<(), CounterError> {
        self.calls.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self, _cpu: &mut usize) {
        self.calls.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Every member runs on `cpu`.
pub fn on_cpu(cpu: usize) -> impl CpuLocator {
    move |_: usize| -> Result<usize, AffinityError> { Ok(cpu) }
}

/// Member `i` runs on CPU `i % cpus`.
pub fn round_robin(cpus: usize) -> impl CpuLocator {
    move |member: usize| -> Result<usize, AffinityError> { Ok(member % cpus) }
}

/// Writer whose contents stay readable after the sampler takes it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
