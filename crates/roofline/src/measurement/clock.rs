//! Nanosecond timestamps via `clock_gettime`.

use crate::config::ClockSource;

/// Current time in nanoseconds on the given clock, or 0 if it cannot be read.
#[cfg(unix)]
#[inline]
pub fn now_ns(source: ClockSource) -> u64 {
    let clock = match source {
        ClockSource::Monotonic => libc::CLOCK_MONOTONIC,
        ClockSource::ThreadCpu => libc::CLOCK_THREAD_CPUTIME_ID,
    };
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec.
    let ret = unsafe { libc::clock_gettime(clock, &mut ts) };
    if ret != 0 {
        return 0;
    }
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

/// Current time in nanoseconds since the first call. Thread CPU time is not
/// available here, so both sources read the monotonic clock.
#[cfg(not(unix))]
#[inline]
pub fn now_ns(_source: ClockSource) -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    // Offset by one so a valid reading is never the "unset" value.
    ORIGIN.get_or_init(Instant::now).elapsed().as_nanos() as u64 + 1
}
