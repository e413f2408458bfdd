//! Structured logging with `tracing`.
//!
//! - [`init_subscriber`] installs the global stderr subscriber
//! - [`capture_logs`] installs a thread-scoped capture layer for tests

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

/// Filter from `rust_log` when it parses, else from `level`.
pub fn resolve_filter(level: &str, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

fn filter_from_env(level: &str) -> EnvFilter {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    resolve_filter(level, rust_log.as_deref())
}

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` wins over `level` when set. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter_from_env(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default is a no-op if already set
    let _ = subscriber.try_init();
}

/// Same as [`init_subscriber`] but emits newline-delimited JSON.
pub fn init_json_subscriber(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_from_env(level))
        .with_writer(std::io::stderr)
        .json()
        .try_init();
}
