//! Fixed-width text records.
//!
//! ```text
//!         Location      Nanoseconds            Bytes            Flops  n_threads       type info
//!       NUMANode:0          1520000        819200000        409600000          4        APP dgemm_run1
//! ```

use super::NodeRecord;

/// Column header line, without the trailing newline.
pub fn header() -> String {
    format!(
        "{:>16} {:>16} {:>16} {:>16} {:>10} {:>10} {}",
        "Location", "Nanoseconds", "Bytes", "Flops", "n_threads", "type", "info"
    )
}

/// One record line, without the trailing newline.
pub fn format_record(record: &NodeRecord) -> String {
    format!(
        "{:>16} {:>16} {:>16} {:>16} {:>10} {:>10} {}",
        record.location,
        record.nanoseconds,
        record.bytes,
        record.flops,
        record.n_threads,
        record.kind,
        record.info
    )
}
