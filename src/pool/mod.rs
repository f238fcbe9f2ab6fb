//! Buffer pools bound to hardware ports.
//!
//! This module provides:
//! - [`BufferPool`]: the generic pool contract (configure, activate, acquire, release)
//! - [`OmxBufferPool`]: a pool owning the fixed buffer batch of one hardware port
//! - [`PoolBuffer`]: the pipeline-visible buffer, tagged with its [`BufferOwner`]
//!
//! # Lifecycle
//!
//! ```text
//! Unconfigured --set_config--> Configured --set_active(true)--> Started
//!      ^                                                           |
//!      +--------------------- set_active(false) / stop -----------+
//! ```
//!
//! Activation forces `max == min`, asks the owner to allocate hardware
//! buffers if the port has none, and binds one [`PoolBuffer`] to each
//! hardware buffer in index order. Buffers are never allocated afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! use omxbridge::pool::{BufferPool, OmxBufferPool, PoolConfig, PoolSettings};
//!
//! let pool = OmxBufferPool::new(&element, component, port, PoolSettings::new("dec-out"));
//! pool.set_config(PoolConfig::new(caps, frame_size, 4, 4))?;
//! pool.set_active(true)?;
//!
//! pool.set_current_buffer_index(filled.index());
//! let buffer = pool.acquire_buffer(AcquireParams::default())?;
//! // push downstream...
//! pool.release_buffer(buffer);
//! ```

mod buffer;
mod config;
mod omx_pool;

pub use buffer::{BufferOwner, ForeignPool, ForeignPoolHandle, PoolBuffer};
pub use config::{
    AcquireParams, BUFFER_POOL_OPTION_VIDEO_META, BufferMode, DmaStrategy, PoolConfig,
    PoolSettings,
};
pub use omx_pool::{OmxBufferPool, PoolOwner};

use crate::error::Result;

// ============================================================================
// BufferPool Trait
// ============================================================================

/// A pool of reusable buffers.
///
/// # Flushing
///
/// While flushing (or inactive), `acquire_buffer` returns
/// [`Error::Flushing`](crate::Error::Flushing) immediately, including for
/// callers already blocked waiting for a buffer.
pub trait BufferPool: Send + Sync {
    /// Options this pool understands.
    fn options(&self) -> Vec<&'static str>;

    /// Apply a configuration. Fails while the pool is active.
    fn set_config(&self, config: PoolConfig) -> Result<()>;

    /// Effective configuration, if configured.
    fn config(&self) -> Option<PoolConfig>;

    /// Start or stop the pool.
    fn set_active(&self, active: bool) -> Result<()>;

    /// Whether the pool is started.
    fn is_active(&self) -> bool;

    /// Enter or leave flushing.
    fn set_flushing(&self, flushing: bool);

    /// Get a buffer.
    fn acquire_buffer(&self, params: AcquireParams) -> Result<PoolBuffer>;

    /// Return a buffer obtained from `acquire_buffer`.
    ///
    /// Returning a buffer that is not held is a no-op.
    fn release_buffer(&self, buffer: PoolBuffer);

    /// Get pool statistics.
    fn stats(&self) -> PoolStats;
}

/// Statistics about pool usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers bound to the pool.
    pub capacity: usize,
    /// Buffers not held by a consumer.
    pub available: usize,
    /// Buffers held by a consumer.
    pub in_use: usize,
    /// Total number of successful acquisitions.
    pub acquisitions: u64,
}
