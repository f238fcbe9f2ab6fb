//! Pool configuration and per-pool settings.

use crate::caps::Caps;
use crate::dma::DmaBridge;
use crate::omx::WaitPolicy;

/// Pool option: attach plane metadata to every buffer.
pub const BUFFER_POOL_OPTION_VIDEO_META: &str = "GstBufferPoolOptionVideoMeta";

/// Configuration negotiated between a pool and its users.
///
/// # Example
///
/// ```rust
/// use omxbridge::caps::Caps;
/// use omxbridge::pool::{BUFFER_POOL_OPTION_VIDEO_META, PoolConfig};
///
/// let caps = Caps::builder("video/x-raw")
///     .field("format", "NV12")
///     .field("width", 640)
///     .field("height", 480)
///     .build();
/// let config = PoolConfig::new(caps, 460_800, 4, 4).with_option(BUFFER_POOL_OPTION_VIDEO_META);
/// assert!(config.has_option(BUFFER_POOL_OPTION_VIDEO_META));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolConfig {
    /// Stream description of the buffers.
    pub caps: Option<Caps>,
    /// Size of one buffer in bytes.
    pub size: u32,
    /// Minimum number of buffers.
    pub min: u32,
    /// Maximum number of buffers (0 = unlimited).
    pub max: u32,
    /// Enabled pool options.
    pub options: Vec<String>,
}

impl PoolConfig {
    /// Configuration with caps and buffer geometry.
    pub fn new(caps: Caps, size: u32, min: u32, max: u32) -> Self {
        Self {
            caps: Some(caps),
            size,
            min,
            max,
            options: Vec::new(),
        }
    }

    /// Enable an option.
    pub fn with_option(mut self, option: &str) -> Self {
        self.add_option(option);
        self
    }

    /// Enable an option.
    pub fn add_option(&mut self, option: &str) {
        if !self.has_option(option) {
            self.options.push(option.to_owned());
        }
    }

    /// Whether an option is enabled.
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

/// Parameters of a single acquire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquireParams {
    /// Whether to block until a buffer is available.
    pub wait: WaitPolicy,
}

impl AcquireParams {
    /// Fail instead of blocking when nothing is available.
    pub fn dont_wait() -> Self {
        Self {
            wait: WaitPolicy::DontWait,
        }
    }
}

/// How DMA-BUF memory is produced for hardware buffers.
#[derive(Debug, Clone)]
pub enum DmaStrategy {
    /// The port hands out a DMA-BUF descriptor per buffer; wrap it directly.
    NativeFd,
    /// Export each buffer's physical memory through the memory manager.
    PhysicalExport {
        /// Bridge to the memory manager.
        bridge: DmaBridge,
        /// One memory per video plane instead of one for the whole frame.
        multi_plane: bool,
    },
}

/// Memory the pool wraps around hardware buffers.
#[derive(Debug, Clone, Default)]
pub enum BufferMode {
    /// Host-mapped hardware memory.
    #[default]
    SystemMemory,
    /// DMA-BUF memory.
    DmaBuf(DmaStrategy),
}

/// Per-pool settings fixed at construction.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Name used in logs and metric labels.
    pub name: String,
    /// Memory strategy.
    pub mode: BufferMode,
}

impl PoolSettings {
    /// Settings for a pool wrapping host-mapped memory.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: BufferMode::SystemMemory,
        }
    }

    /// Use a different memory strategy.
    pub fn with_mode(mut self, mode: BufferMode) -> Self {
        self.mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_are_deduplicated() {
        let mut config = PoolConfig::default();
        config.add_option(BUFFER_POOL_OPTION_VIDEO_META);
        config.add_option(BUFFER_POOL_OPTION_VIDEO_META);
        assert_eq!(config.options.len(), 1);
        assert!(config.caps.is_none());
    }

    #[test]
    fn test_settings_default_mode() {
        let settings = PoolSettings::new("omxaacdec-in");
        assert!(matches!(settings.mode, BufferMode::SystemMemory));
        assert_eq!(AcquireParams::default().wait, WaitPolicy::Wait);
        assert_eq!(AcquireParams::dont_wait().wait, WaitPolicy::DontWait);
    }
}
