//! Metric names recorded through the `metrics` facade.
//!
//! No recorder is installed here; embedders install whichever exporter they
//! use. Without one every call is a no-op.

/// Endpoints currently registered (gauge).
pub const ENDPOINTS_ACTIVE: &str = "streamfan_endpoints_active";
/// Streams that arrived (counter, labels: endpoint).
pub const STREAMS_OPENED_TOTAL: &str = "streamfan_streams_opened_total";
/// Streams evicted after closing (counter, labels: endpoint).
pub const STREAMS_CLOSED_TOTAL: &str = "streamfan_streams_closed_total";
/// Open streams (gauge, labels: endpoint).
pub const STREAMS_ACTIVE: &str = "streamfan_streams_active";
/// Sessions established (counter, labels: endpoint).
pub const SESSIONS_OPENED_TOTAL: &str = "streamfan_sessions_opened_total";
/// Dispatch passes started (counter, labels: endpoint).
pub const DISPATCH_PASSES_TOTAL: &str = "streamfan_dispatch_passes_total";
/// Dispatch passes aborted by a listener failure (counter, labels: endpoint).
pub const DISPATCH_ERRORS_TOTAL: &str = "streamfan_dispatch_errors_total";
/// Dispatch pass duration seconds (histogram, labels: endpoint).
pub const DISPATCH_DURATION_SECONDS: &str = "streamfan_dispatch_duration_seconds";
/// Successful broadcast writes (counter, labels: endpoint).
pub const BROADCAST_WRITES_TOTAL: &str = "streamfan_broadcast_writes_total";
/// Failed broadcast writes (counter, labels: endpoint).
pub const BROADCAST_WRITE_FAILURES_TOTAL: &str = "streamfan_broadcast_write_failures_total";
/// Polling listener re-invocations (counter).
pub const POLL_TICKS_TOTAL: &str = "streamfan_poll_ticks_total";
