//! Error types for omxbridge.

use crate::dma::MmngrError;
use crate::omx::OmxError;
use thiserror::Error;

/// Result type alias using omxbridge's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for omxbridge operations.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    /// The pool configuration carries no caps.
    #[error("no caps in buffer pool configuration")]
    NoCaps,

    /// Caps describe raw video but the geometry could not be parsed.
    #[error("failed getting geometry from caps {0}")]
    InvalidVideoCaps(String),

    /// The requested maximum exceeds the hardware-negotiated buffer count.
    #[error(
        "max ({max}) cannot be higher than min ({min}) as pool cannot allocate buffers on the fly"
    )]
    MaxExceedsMin {
        /// Requested minimum buffer count.
        min: u32,
        /// Requested maximum buffer count.
        max: u32,
    },

    /// Configuration was rejected for another reason.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// The pool was activated without a configuration.
    #[error("buffer pool is not configured")]
    NotConfigured,

    /// The operation is not allowed while the pool is active.
    #[error("buffer pool is active")]
    PoolActive,

    // ========================================================================
    // Attachment
    // ========================================================================
    /// The pool has no component or port attached.
    #[error("buffer pool is not attached to a component and port")]
    NotAttached,

    /// The owning element failed to allocate hardware buffers.
    #[error("element failed to allocate buffers on port {port}")]
    AllocateFailed {
        /// Port index.
        port: u32,
    },

    // ========================================================================
    // Logic errors (fatal)
    // ========================================================================
    /// Buffer allocation was requested past the hardware buffer count.
    #[error("buffer index {index} out of range: port has {count} buffers")]
    AllocationExhausted {
        /// Requested buffer index.
        index: usize,
        /// Number of buffers on the port.
        count: usize,
    },

    /// Internal bookkeeping is inconsistent.
    #[error("invariant violated: {0}")]
    Invariant(String),

    // ========================================================================
    // Signals
    // ========================================================================
    /// The pool or port is flushing.
    #[error("flushing")]
    Flushing,

    /// No buffer is available and the caller asked not to wait.
    #[error("no buffer available")]
    WouldBlock,

    // ========================================================================
    // Hardware and memory
    // ========================================================================
    /// The hardware component reported an error.
    #[error("hardware error: {0}")]
    Omx(#[from] OmxError),

    /// Exporting a physical region as a DMA-BUF failed.
    #[error("DMA export of {size} bytes at {phys_addr:#x} failed: {source}")]
    DmaExport {
        /// Physical address requested.
        phys_addr: u64,
        /// Size requested.
        size: usize,
        /// Memory manager result.
        source: MmngrError,
    },

    /// Importing a DMA-BUF for hardware access failed.
    #[error("DMA import failed: {0}")]
    DmaImport(String),

    /// No physical address is known for a hardware buffer.
    #[error("no physical address for buffer {index}")]
    NoPhysicalAddress {
        /// Hardware buffer index.
        index: usize,
    },

    /// The memory cannot be mapped for CPU access.
    #[error("memory is not mappable: {0}")]
    NotMappable(String),

    /// The memory refuses to be shared.
    #[error("memory is not shareable")]
    NotShareable,

    /// Invalid memory segment operation.
    #[error("invalid memory segment: {0}")]
    InvalidSegment(String),

    /// Memory allocation failed.
    #[error("memory allocation failed: {0}")]
    AllocationFailed(String),

    // ========================================================================
    // Format negotiation
    // ========================================================================
    /// Caps are missing a required field.
    #[error("incomplete caps: missing {0}")]
    IncompleteCaps(&'static str),

    /// A value is not supported by the hardware mapping.
    #[error("unsupported {kind}: {value}")]
    Unsupported {
        /// What was being mapped.
        kind: &'static str,
        /// The offending value.
        value: String,
    },

    // ========================================================================
    // OS
    // ========================================================================
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}

impl Error {
    /// True for the flushing signal, which callers treat as "stop now" rather than failure.
    pub fn is_flushing(&self) -> bool {
        matches!(self, Error::Flushing)
    }

    /// True for logic errors that indicate broken bookkeeping rather than a transient condition.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::AllocationExhausted { .. } | Error::Invariant(_)
        )
    }

    /// Hardware error code carried by this error, if any.
    pub fn omx_code(&self) -> Option<u32> {
        match self {
            Error::Omx(e) => Some(e.code()),
            _ => None,
        }
    }

    pub(crate) fn unsupported(kind: &'static str, value: impl ToString) -> Self {
        Error::Unsupported {
            kind,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_code_in_message() {
        let err = Error::from(OmxError::Hardware);
        assert_eq!(err.omx_code(), Some(0x8000_1009));
        assert!(err.to_string().contains("0x80001009"));
    }

    #[test]
    fn test_signal_classification() {
        assert!(Error::Flushing.is_flushing());
        assert!(!Error::WouldBlock.is_flushing());
        assert!(Error::AllocationExhausted { index: 4, count: 4 }.is_fatal());
        assert!(!Error::NoCaps.is_fatal());
    }
}
