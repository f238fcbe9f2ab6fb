//! Export of hardware physical regions and import of external DMA-BUFs.

use super::{ExportGuard, ImportRecord, MemoryManager};
use crate::error::{Error, Result};
use crate::memory::DmaBufMemory;
use crate::omx::HardwareBuffer;
use crate::pool::PoolBuffer;
use std::fmt;
use std::sync::Arc;

/// Converts between hardware physical memory and DMA-BUF memory.
///
/// Exports are page aligned: the physical base is rounded down and the
/// size rounded up to the page size, and the resulting memory's visible
/// region is the caller's exact range inside the export.
///
/// # Example
///
/// ```rust,ignore
/// use omxbridge::dma::{DmaBridge, EmulatedMemoryManager};
///
/// let bridge = DmaBridge::new(Arc::new(EmulatedMemoryManager::new()));
/// let plane = bridge.export_region(0x4800_0100, 1920 * 1088)?;
/// assert_eq!(plane.offset(), 0x100);
/// ```
#[derive(Clone)]
pub struct DmaBridge {
    manager: Arc<dyn MemoryManager>,
    page_size: usize,
}

impl DmaBridge {
    /// Bridge using the system page size.
    pub fn new(manager: Arc<dyn MemoryManager>) -> Self {
        Self {
            manager,
            page_size: rustix::param::page_size(),
        }
    }

    /// Bridge using an explicit page size (a power of two).
    pub fn with_page_size(manager: Arc<dyn MemoryManager>, page_size: usize) -> Result<Self> {
        if !page_size.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "page size {page_size} is not a power of two"
            )));
        }
        Ok(Self { manager, page_size })
    }

    /// Page size used for alignment.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Underlying memory manager.
    pub fn manager(&self) -> &Arc<dyn MemoryManager> {
        &self.manager
    }

    /// Export `size` bytes at `phys_addr`.
    ///
    /// # Errors
    ///
    /// [`Error::DmaExport`] when the memory manager refuses.
    pub fn export_region(&self, phys_addr: u64, size: usize) -> Result<DmaBufMemory> {
        let page_offset = (phys_addr & (self.page_size as u64 - 1)) as usize;
        let aligned_addr = phys_addr - page_offset as u64;
        let export_size = (size + page_offset).next_multiple_of(self.page_size);

        let export = self
            .manager
            .export_start(aligned_addr, export_size)
            .map_err(|source| Error::DmaExport {
                phys_addr,
                size,
                source,
            })?;

        tracing::debug!(
            export_id = export.id.0,
            phys_addr = format_args!("{aligned_addr:#x}"),
            export_size,
            page_offset,
            size,
            "exported physical region"
        );

        let guard = ExportGuard::new(self.manager.clone(), export.id, aligned_addr, export_size);
        DmaBufMemory::from_export(export.fd, guard, page_offset, size)
    }

    /// Export the whole allocation of a hardware buffer.
    ///
    /// Uses the decode result's luma address when present, otherwise the
    /// buffer's own physical address.
    pub fn export_buffer(&self, buffer: &HardwareBuffer) -> Result<DmaBufMemory> {
        let phys_addr = buffer
            .decode_result()
            .map(|r| r.phys_y)
            .or(buffer.phys_addr())
            .ok_or(Error::NoPhysicalAddress {
                index: buffer.index(),
            })?;
        self.export_region(phys_addr, buffer.alloc_len())
    }

    /// Import every plane of `frame` so `hardware` can access it directly.
    ///
    /// Planes are located through the frame's video metadata (a frame
    /// without metadata is one plane at offset 0). The physical address of
    /// each plane is written into `hardware`, and the import is cached on
    /// the DMA-BUF memory holding the plane.
    ///
    /// # Errors
    ///
    /// [`Error::DmaImport`] when a plane is not DMA-BUF memory or the memory
    /// manager refuses the descriptor.
    pub fn import_frame(&self, hardware: &Arc<HardwareBuffer>, frame: &PoolBuffer) -> Result<()> {
        let plane_offsets: Vec<usize> = match frame.video_meta() {
            Some(meta) => meta.offset[..meta.n_planes].to_vec(),
            None => vec![0],
        };

        for (plane, &offset) in plane_offsets.iter().enumerate() {
            let (index, skip) = frame.find_memory(offset).ok_or_else(|| {
                Error::DmaImport(format!("plane {plane} offset {offset} is outside the frame"))
            })?;
            let memory = frame
                .memory(index)
                .ok_or_else(|| Error::DmaImport(format!("no memory at index {index}")))?;
            let dmabuf = memory.as_dmabuf().ok_or_else(|| {
                Error::DmaImport(format!("plane {plane} is not backed by a DMA-BUF"))
            })?;

            let record = dmabuf.import_or_insert_with(|| self.import_memory(hardware, dmabuf))?;
            let addr = record.phys_addr() + (dmabuf.offset() + skip) as u64;
            hardware.set_plane_address(plane, addr);

            tracing::trace!(
                index = hardware.index(),
                plane,
                import_id = record.id().0,
                addr = format_args!("{addr:#x}"),
                "plane imported"
            );
        }
        Ok(())
    }

    /// Whether `frame` is the buffer bound to `hardware`.
    ///
    /// The first comparison of a frame imports it on behalf of `hardware`;
    /// later comparisons reuse the cached import.
    pub fn compare_buffers(
        &self,
        hardware: &Arc<HardwareBuffer>,
        frame: &PoolBuffer,
    ) -> Result<bool> {
        let memory = frame
            .memory(0)
            .ok_or_else(|| Error::DmaImport("frame has no memory".into()))?;
        let dmabuf = memory
            .as_dmabuf()
            .ok_or_else(|| Error::DmaImport("frame is not backed by a DMA-BUF".into()))?;

        if dmabuf.import_record().is_none() {
            self.import_frame(hardware, frame)?;
        }
        Ok(dmabuf
            .import_record()
            .is_some_and(|record| record.is_bound_to(hardware)))
    }

    fn import_memory(
        &self,
        hardware: &Arc<HardwareBuffer>,
        dmabuf: &DmaBufMemory,
    ) -> Result<ImportRecord> {
        let import = self
            .manager
            .import_start(dmabuf.fd())
            .map_err(|e| Error::DmaImport(e.to_string()))?;
        Ok(ImportRecord::new(self.manager.clone(), import, hardware))
    }
}

impl fmt::Debug for DmaBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaBridge")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}
