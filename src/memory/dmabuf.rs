//! DMA-BUF backed memory.
//!
//! A [`DmaBufMemory`] is a visible region (offset + size) of a DMA-BUF file
//! descriptor. Clones share the descriptor; the last clone to go away
//! closes it and, for memory produced by a physical export, ends the export
//! mapping through the [`ExportGuard`] it carries.
//!
//! CPU access goes through [`DmaBufMemory::map`], which mmaps the whole
//! descriptor for as long as the returned [`DmaBufMapping`] lives.
//!
//! # Example
//!
//! ```rust,ignore
//! use omxbridge::memory::DmaBufMemory;
//!
//! let memory = DmaBufMemory::from_fd(fd, 4096);
//! let mapping = memory.map()?;
//! let visible = mapping.region(memory.offset(), memory.size());
//! ```

use super::system::check_region;
use super::{MemorySegment, MemoryType};
use crate::dma::{ExportGuard, ExportId, ImportRecord};
use crate::error::{Error, Result};
use rustix::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use rustix::mm::{MapFlags, ProtFlags};
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

struct DmaBufInner {
    fd: OwnedFd,
    maxsize: usize,
    // Declared after `fd`: the export ends once the descriptor is closed.
    export: Option<ExportGuard>,
    import: OnceLock<ImportRecord>,
}

/// A region of a DMA-BUF.
#[derive(Clone)]
pub struct DmaBufMemory {
    inner: Arc<DmaBufInner>,
    offset: usize,
    size: usize,
    no_share: bool,
}

impl DmaBufMemory {
    /// Wrap a descriptor whose full size is `maxsize`.
    pub fn from_fd(fd: OwnedFd, maxsize: usize) -> Self {
        Self {
            inner: Arc::new(DmaBufInner {
                fd,
                maxsize,
                export: None,
                import: OnceLock::new(),
            }),
            offset: 0,
            size: maxsize,
            no_share: false,
        }
    }

    /// Wrap an exported descriptor. The export ends when the last clone drops.
    pub(crate) fn from_export(
        fd: OwnedFd,
        export: ExportGuard,
        offset: usize,
        size: usize,
    ) -> Result<Self> {
        let maxsize = export.size();
        check_region(offset, size, maxsize)?;
        Ok(Self {
            inner: Arc::new(DmaBufInner {
                fd,
                maxsize,
                export: Some(export),
                import: OnceLock::new(),
            }),
            offset,
            size,
            no_share: false,
        })
    }

    /// The DMA-BUF descriptor.
    #[inline]
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.inner.fd.as_fd()
    }

    /// Offset of the visible region.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the visible region.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size of the whole descriptor.
    pub fn maxsize(&self) -> usize {
        self.inner.maxsize
    }

    /// Export identifier, if this memory came from a physical export.
    pub fn export_id(&self) -> Option<ExportId> {
        self.inner.export.as_ref().map(ExportGuard::id)
    }

    /// Change the visible region.
    pub fn set_region(&mut self, offset: usize, size: usize) -> Result<()> {
        check_region(offset, size, self.maxsize())?;
        self.offset = offset;
        self.size = size;
        Ok(())
    }

    /// Whether two memories share one descriptor.
    pub fn same_allocation(&self, other: &DmaBufMemory) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Map the whole descriptor for CPU access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotMappable`] if the descriptor refuses mmap.
    pub fn map(&self) -> Result<DmaBufMapping> {
        DmaBufMapping::new(self.inner.clone())
    }

    /// Cached import mapping, if one was made.
    pub fn import_record(&self) -> Option<&ImportRecord> {
        self.inner.import.get()
    }

    /// Return the cached import mapping, creating it with `import` on first use.
    pub(crate) fn import_or_insert_with(
        &self,
        import: impl FnOnce() -> Result<ImportRecord>,
    ) -> Result<&ImportRecord> {
        if let Some(record) = self.inner.import.get() {
            return Ok(record);
        }
        let record = import()?;
        // A concurrent import may have won; the loser's record drops and ends its mapping.
        let _ = self.inner.import.set(record);
        self.inner
            .import
            .get()
            .ok_or_else(|| Error::Invariant("import cache empty after insert".into()))
    }

    pub(crate) fn is_no_share(&self) -> bool {
        self.no_share
    }

    pub(crate) fn set_no_share(&mut self, no_share: bool) {
        self.no_share = no_share;
    }

    pub(crate) fn share(&self) -> Result<Self> {
        if self.no_share {
            return Err(Error::NotShareable);
        }
        Ok(self.clone())
    }
}

impl std::fmt::Debug for DmaBufMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaBufMemory")
            .field("fd", &self.inner.fd.as_raw_fd())
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("maxsize", &self.inner.maxsize)
            .field("export_id", &self.export_id())
            .finish()
    }
}

/// A CPU mapping of a whole DMA-BUF.
///
/// Keeps the descriptor alive; unmaps on drop.
pub struct DmaBufMapping {
    inner: Arc<DmaBufInner>,
    ptr: NonNull<u8>,
    len: usize,
}

impl DmaBufMapping {
    fn new(inner: Arc<DmaBufInner>) -> Result<Self> {
        let len = inner.maxsize;
        if len == 0 {
            return Err(Error::NotMappable("empty DMA-BUF".into()));
        }
        // SAFETY: a fresh shared mapping of a descriptor we keep open for the
        // mapping's lifetime.
        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &inner.fd,
                0,
            )
            .map_err(|e| Error::NotMappable(format!("mmap DMA-BUF failed: {e}")))?
        };
        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| Error::NotMappable("mmap returned null".into()))?;

        Ok(Self { inner, ptr, len })
    }

    /// Bytes `offset..offset + size` of the mapping.
    pub fn region(&self, offset: usize, size: usize) -> Result<&[u8]> {
        check_region(offset, size, self.len)?;
        // SAFETY: bounds checked; the mapping is valid while self lives.
        Ok(unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), size) })
    }

    /// Mutable bytes `offset..offset + size` of the mapping.
    pub fn region_mut(&mut self, offset: usize, size: usize) -> Result<&mut [u8]> {
        check_region(offset, size, self.len)?;
        // SAFETY: bounds checked; exclusive borrow of the mapping.
        Ok(unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), size) })
    }
}

impl Drop for DmaBufMapping {
    fn drop(&mut self) {
        // SAFETY: ptr/len are exactly what mmap returned.
        unsafe {
            let _ = rustix::mm::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

// SAFETY: the mapping is plain shared memory; the kernel object is thread-agnostic.
unsafe impl Send for DmaBufMapping {}
// SAFETY: shared access only hands out `&[u8]`; mutation needs `&mut self`.
unsafe impl Sync for DmaBufMapping {}

impl MemorySegment for DmaBufMapping {
    fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    fn as_mut_ptr(&self) -> Option<*mut u8> {
        Some(self.ptr.as_ptr())
    }

    fn len(&self) -> usize {
        self.len
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::DmaBuf
    }
}

impl std::fmt::Debug for DmaBufMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaBufMapping")
            .field("fd", &self.inner.fd.as_raw_fd())
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memfd(len: u64) -> OwnedFd {
        let fd = rustix::fs::memfd_create("test_dmabuf", rustix::fs::MemfdFlags::CLOEXEC).unwrap();
        rustix::fs::ftruncate(&fd, len).unwrap();
        fd
    }

    #[test]
    fn test_dmabuf_from_memfd() {
        let memory = DmaBufMemory::from_fd(memfd(4096), 4096);
        assert_eq!(memory.size(), 4096);
        assert_eq!(memory.maxsize(), 4096);
        assert!(memory.export_id().is_none());
        assert!(memory.import_record().is_none());
    }

    #[test]
    fn test_dmabuf_map_read_write() {
        let mut memory = DmaBufMemory::from_fd(memfd(1024), 1024);
        memory.set_region(100, 15).unwrap();

        let data = b"Hello, DMA-BUF!";
        {
            let mut mapping = memory.map().unwrap();
            mapping
                .region_mut(memory.offset(), memory.size())
                .unwrap()
                .copy_from_slice(data);
        }

        let mapping = memory.map().unwrap();
        assert_eq!(mapping.region(100, 15).unwrap(), data);
        assert_eq!(mapping.len(), 1024);
        assert_eq!(mapping.memory_type(), MemoryType::DmaBuf);
        assert!(mapping.region(1000, 100).is_err());
    }

    #[test]
    fn test_dmabuf_clones_share_descriptor() {
        let memory = DmaBufMemory::from_fd(memfd(256), 256);
        let mut view = memory.clone();
        view.set_region(128, 64).unwrap();

        assert!(memory.same_allocation(&view));
        assert_eq!(memory.fd().as_raw_fd(), view.fd().as_raw_fd());
        assert_eq!(memory.size(), 256);
    }

    #[test]
    fn test_dmabuf_no_share() {
        let mut memory = DmaBufMemory::from_fd(memfd(128), 128);
        assert!(memory.share().is_ok());
        memory.set_no_share(true);
        assert!(memory.share().is_err());
    }

    #[test]
    fn test_dmabuf_debug() {
        let memory = DmaBufMemory::from_fd(memfd(128), 128);
        let debug_str = format!("{:?}", memory);
        assert!(debug_str.contains("DmaBufMemory"));
        assert!(debug_str.contains("maxsize: 128"));
    }
}
