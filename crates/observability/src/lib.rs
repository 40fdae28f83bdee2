//! Process-wide logging setup for the stockroom binaries.

/// Tracing subscriber configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize tracing with the format named by `STOCKROOM_LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    let format = std::env::var("STOCKROOM_LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();
    tracing::init(format);
}
