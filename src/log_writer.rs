//! Abandonment log output (spec §4.5, §6).
//!
//! `log_abandoned` enables a plain-text record, in the exact shape named
//! by spec §6, emitted through a pluggable [`LogWriter`] sink so callers
//! can redirect it without reconfiguring the crate's tracing subscriber.

use chrono::{DateTime, Local};

/// A line-oriented sink for abandonment log records (spec §6 `log_writer`).
pub trait LogWriter: Send + Sync {
    /// Write one complete, possibly multi-line, record.
    fn write_record(&self, record: &str);
}

/// Default [`LogWriter`] emitting through `tracing::warn!`.
#[derive(Debug, Default)]
pub struct TracingLogWriter;

impl LogWriter for TracingLogWriter {
    fn write_record(&self, record: &str) {
        #[cfg(feature = "tracing")]
        tracing::warn!("{record}");
        #[cfg(not(feature = "tracing"))]
        {
            let _ = record;
        }
    }
}

/// Format an abandonment record per spec §6:
///
/// ```text
/// Pooled object created <timestamp> by <trace-or-"unknown">
/// The last code to use this object was:
/// <trace-lines>
/// ```
///
/// `created_at` is converted to the local time zone and rendered ISO-8601.
#[must_use]
pub fn format_abandonment_record(
    created_at: DateTime<Local>,
    last_use_trace: Option<&str>,
) -> String {
    let trace = last_use_trace.unwrap_or("unknown");
    format!(
        "Pooled object created {} by {trace}\nThe last code to use this object was:\n{trace}",
        created_at.to_rfc3339(),
    )
}
