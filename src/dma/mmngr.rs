//! Platform memory manager contract and the release guards built on it.

use crate::observability;
use crate::omx::HardwareBuffer;
use std::fmt;
use std::os::fd::{BorrowedFd, OwnedFd};
use std::sync::{Arc, Weak};
use thiserror::Error;

/// Identifier of an export mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExportId(pub u32);

/// Identifier of an import mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImportId(pub u32);

/// Failure reported by the memory manager.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmngrError {
    /// Unrecoverable failure.
    #[error("fatal memory manager error (R_MM_FATAL)")]
    Fatal,
    /// Call out of sequence, e.g. ending an unknown mapping.
    #[error("sequence error (R_MM_SEQERR)")]
    SequenceError,
    /// Invalid argument.
    #[error("parameter error (R_MM_PARE)")]
    ParameterError,
    /// Out of memory.
    #[error("out of memory (R_MM_NOMEM)")]
    NoMemory,
}

impl MmngrError {
    /// Raw return code.
    pub const fn code(self) -> i32 {
        match self {
            MmngrError::Fatal => -1,
            MmngrError::SequenceError => -2,
            MmngrError::ParameterError => -3,
            MmngrError::NoMemory => -4,
        }
    }
}

/// Result of `export_start`.
#[derive(Debug)]
pub struct Export {
    /// Mapping identifier, passed back to `export_end`.
    pub id: ExportId,
    /// The shareable descriptor covering the exported region.
    pub fd: OwnedFd,
}

/// Result of `import_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Import {
    /// Mapping identifier, passed back to `import_end`.
    pub id: ImportId,
    /// Size of the imported region.
    pub size: usize,
    /// Physical address of the imported region.
    pub phys_addr: u64,
}

/// The platform's physical memory export/import capability.
///
/// Implementations talk to the kernel driver that turns physical
/// addresses into DMA-BUF descriptors and back.
pub trait MemoryManager: Send + Sync {
    /// Export `size` bytes at the page-aligned `phys_addr` as a DMA-BUF.
    fn export_start(&self, phys_addr: u64, size: usize) -> Result<Export, MmngrError>;

    /// Tear down an export mapping.
    fn export_end(&self, id: ExportId) -> Result<(), MmngrError>;

    /// Resolve a DMA-BUF to the physical region behind it.
    fn import_start(&self, fd: BorrowedFd<'_>) -> Result<Import, MmngrError>;

    /// Tear down an import mapping.
    fn import_end(&self, id: ImportId) -> Result<(), MmngrError>;
}

/// Ends an export mapping when dropped.
///
/// Lives inside the DMA-BUF memory it produced, so the mapping closes
/// exactly once, when the last clone of that memory goes away.
pub struct ExportGuard {
    manager: Arc<dyn MemoryManager>,
    id: ExportId,
    phys_addr: u64,
    size: usize,
}

impl ExportGuard {
    pub(crate) fn new(
        manager: Arc<dyn MemoryManager>,
        id: ExportId,
        phys_addr: u64,
        size: usize,
    ) -> Self {
        observability::record_export_started();
        Self {
            manager,
            id,
            phys_addr,
            size,
        }
    }

    /// Export identifier.
    pub fn id(&self) -> ExportId {
        self.id
    }

    /// Page-aligned physical address of the export.
    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    /// Page-aligned size of the export.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        observability::record_export_ended();
        match self.manager.export_end(self.id) {
            Ok(()) => tracing::trace!(export_id = self.id.0, "export mapping ended"),
            Err(e) => tracing::error!(
                export_id = self.id.0,
                phys_addr = self.phys_addr,
                error = %e,
                "failed to end export mapping"
            ),
        }
    }
}

impl fmt::Debug for ExportGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportGuard")
            .field("id", &self.id)
            .field("phys_addr", &format_args!("{:#x}", self.phys_addr))
            .field("size", &self.size)
            .finish()
    }
}

/// An import mapping cached on a DMA-BUF memory.
///
/// Records which hardware buffer the import was made for; ends the mapping
/// when dropped.
pub struct ImportRecord {
    manager: Arc<dyn MemoryManager>,
    import: Import,
    bound: Weak<HardwareBuffer>,
}

impl ImportRecord {
    pub(crate) fn new(
        manager: Arc<dyn MemoryManager>,
        import: Import,
        bound: &Arc<HardwareBuffer>,
    ) -> Self {
        observability::record_import();
        Self {
            manager,
            import,
            bound: Arc::downgrade(bound),
        }
    }

    /// Import identifier.
    pub fn id(&self) -> ImportId {
        self.import.id
    }

    /// Physical address of the imported region.
    pub fn phys_addr(&self) -> u64 {
        self.import.phys_addr
    }

    /// Size of the imported region.
    pub fn size(&self) -> usize {
        self.import.size
    }

    /// Whether the import was made for `buffer`.
    pub fn is_bound_to(&self, buffer: &Arc<HardwareBuffer>) -> bool {
        std::ptr::eq(self.bound.as_ptr(), Arc::as_ptr(buffer))
    }
}

impl Drop for ImportRecord {
    fn drop(&mut self) {
        if let Err(e) = self.manager.import_end(self.import.id) {
            tracing::error!(
                import_id = self.import.id.0,
                error = %e,
                "failed to end import mapping"
            );
        }
    }
}

impl fmt::Debug for ImportRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportRecord")
            .field("id", &self.import.id)
            .field("phys_addr", &format_args!("{:#x}", self.import.phys_addr))
            .field("size", &self.import.size)
            .finish()
    }
}
