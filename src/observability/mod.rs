//! Observability: metrics and tracing.
//!
//! - **Metrics**: counters and gauges via `metrics-rs`
//! - **Tracing**: structured logging and spans via `tracing`
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `omxbridge_pool_buffers_acquired` | Counter | Buffers handed out by a pool |
//! | `omxbridge_pool_buffers_released` | Counter | Buffers returned to a pool |
//! | `omxbridge_pool_release_errors` | Counter | Port refusals on release |
//! | `omxbridge_pool_need_copy` | Counter | Starts whose hardware layout needs a copy |
//! | `omxbridge_dma_exports` | Counter | Physical regions exported as DMA-BUF |
//! | `omxbridge_dma_exports_live` | Gauge | Export mappings not yet ended |
//! | `omxbridge_dma_imports` | Counter | DMA-BUFs imported for hardware access |
//!
//! Nothing is exported until the application installs a recorder.
//!
//! ## Tracing
//!
//! Spans are emitted for pool start/stop ([`span_pool`]) and for applying a
//! negotiated format to a component ([`span_format`]).

mod metrics;
mod tracing_support;

pub use metrics::{
    PoolMetrics, init_metrics, record_export_ended, record_export_started, record_import,
    record_need_copy,
};
pub use tracing_support::{span_format, span_pool};
