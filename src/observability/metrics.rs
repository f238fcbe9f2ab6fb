//! Metrics collection using metrics-rs.

use metrics::{Counter, Unit, counter, gauge};
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const BUFFERS_ACQUIRED: &str = "omxbridge_pool_buffers_acquired";
const BUFFERS_RELEASED: &str = "omxbridge_pool_buffers_released";
const RELEASE_ERRORS: &str = "omxbridge_pool_release_errors";
const NEED_COPY: &str = "omxbridge_pool_need_copy";
const DMA_EXPORTS: &str = "omxbridge_dma_exports";
const DMA_EXPORTS_LIVE: &str = "omxbridge_dma_exports_live";
const DMA_IMPORTS: &str = "omxbridge_dma_imports";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        BUFFERS_ACQUIRED,
        Unit::Count,
        "Buffers handed out by a hardware pool"
    );
    metrics::describe_counter!(
        BUFFERS_RELEASED,
        Unit::Count,
        "Buffers returned to a hardware pool"
    );
    metrics::describe_counter!(
        RELEASE_ERRORS,
        Unit::Count,
        "Hardware refusals while giving a released buffer back to the port"
    );
    metrics::describe_counter!(
        NEED_COPY,
        Unit::Count,
        "Pool starts whose hardware layout differs from the negotiated layout"
    );
    metrics::describe_counter!(DMA_EXPORTS, Unit::Count, "Physical regions exported as DMA-BUF");
    metrics::describe_gauge!(DMA_EXPORTS_LIVE, Unit::Count, "Export mappings not yet ended");
    metrics::describe_counter!(DMA_IMPORTS, Unit::Count, "DMA-BUFs imported for hardware access");
}

/// Record a new export mapping.
#[inline]
pub fn record_export_started() {
    counter!(DMA_EXPORTS).increment(1);
    gauge!(DMA_EXPORTS_LIVE).increment(1.0);
}

/// Record the end of an export mapping.
#[inline]
pub fn record_export_ended() {
    gauge!(DMA_EXPORTS_LIVE).decrement(1.0);
}

/// Record a new import mapping.
#[inline]
pub fn record_import() {
    counter!(DMA_IMPORTS).increment(1);
}

/// Record the outcome of a pool's need-copy check.
#[inline]
pub fn record_need_copy(pool: &str, need_copy: bool) {
    if need_copy {
        counter!(NEED_COPY, "pool" => pool.to_string()).increment(1);
    }
}

/// Counters for one pool, labeled once at construction.
#[derive(Clone)]
pub struct PoolMetrics {
    pool: String,
    acquired: Counter,
    released: Counter,
    release_errors: Counter,
}

impl PoolMetrics {
    /// Create a new pool metrics collector.
    pub fn new(pool: &str) -> Self {
        Self {
            pool: pool.to_string(),
            acquired: counter!(BUFFERS_ACQUIRED, "pool" => pool.to_string()),
            released: counter!(BUFFERS_RELEASED, "pool" => pool.to_string()),
            release_errors: counter!(RELEASE_ERRORS, "pool" => pool.to_string()),
        }
    }

    /// Record a buffer handed out.
    #[inline]
    pub fn record_acquired(&self) {
        self.acquired.increment(1);
    }

    /// Record a buffer returned.
    #[inline]
    pub fn record_released(&self) {
        self.released.increment(1);
    }

    /// Record a hardware release failure.
    #[inline]
    pub fn record_release_error(&self) {
        self.release_errors.increment(1);
    }

    /// Pool label.
    pub fn pool(&self) -> &str {
        &self.pool
    }
}

impl std::fmt::Debug for PoolMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolMetrics")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
