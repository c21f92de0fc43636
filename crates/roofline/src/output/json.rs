//! JSON serialization for node records.

use super::NodeRecord;

/// Serialize a record to a single-line JSON string.
///
/// # Errors
///
/// Returns an error if serialization fails (should not happen for NodeRecord).
pub fn to_json_line(record: &NodeRecord) -> Result<String, serde_json::Error> {
    serde_json::to_string(record)
}
