//! # omxbridge
//!
//! Zero-copy glue between OpenMAX IL hardware codec ports and a media
//! pipeline.
//!
//! A hardware port owns a fixed batch of buffers negotiated with the
//! component. omxbridge wraps that batch in a pipeline buffer pool so that
//! decoded frames flow downstream (and input frames flow into the codec)
//! without copies, optionally as DMA-BUF memory exported from the buffers'
//! physical addresses.
//!
//! ## Features
//!
//! - **Fixed-count pools**: `min == max == port buffer count`, bound in index order
//! - **Foreign pools**: adopt buffers from an upstream pool, hand them back on free
//! - **DMA-BUF**: native descriptors, or physical export with page-aligned bounds
//! - **Per-codec translators**: AAC, H.264, VP8, VP9, WMA, WMV format negotiation
//! - **Simulated hardware**: [`omx::sim`] drives everything without a device
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use omxbridge::prelude::*;
//!
//! let pool = OmxBufferPool::new(&element, component.clone(), out_port.clone(),
//!     PoolSettings::new("omxh264dec-out"));
//! pool.set_config(PoolConfig::new(caps, frame_size, 4, 4))?;
//! pool.set_active(true)?;
//!
//! // Hardware filled buffer 2:
//! pool.set_current_buffer_index(2);
//! let frame = pool.acquire_buffer(AcquireParams::default())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod caps;
pub mod codec;
pub mod dma;
pub mod error;
pub mod memory;
pub mod observability;
pub mod omx;
pub mod pool;
mod sync;
pub mod video;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::caps::{CAPS_FEATURE_MEMORY_DMABUF, Caps};
    pub use crate::codec::{CodecKind, CodecTranslator, FormatContext, FormatTranslator};
    pub use crate::dma::{DmaBridge, MemoryManager};
    pub use crate::error::{Error, Result};
    pub use crate::memory::{Memory, MemoryType};
    pub use crate::omx::{Component, Direction, HardwareBuffer, HardwarePort, WaitPolicy};
    pub use crate::pool::{
        AcquireParams, BufferMode, BufferPool, OmxBufferPool, PoolBuffer, PoolConfig, PoolOwner,
        PoolSettings,
    };
    pub use crate::video::{VideoFormat, VideoInfo};
}

pub use error::{Error, Result};
