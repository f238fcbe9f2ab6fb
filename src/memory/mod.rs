//! Memory regions behind pool buffers.
//!
//! # Architecture
//!
//! - [`MemorySegment`]: trait for raw backing storage (heap, mmap'd DMA-BUF)
//! - [`SystemMemory`]: a view onto a segment, used for buffers produced outside the pool
//! - [`HardwareMemory`]: a hardware port buffer exposed as a region; never shareable
//! - [`DmaBufMemory`]: a DMA-BUF region, optionally carrying the export mapping it came from
//! - [`Memory`]: the tagged union a [`PoolBuffer`](crate::pool::PoolBuffer) holds

mod dmabuf;
mod hardware;
mod segment;
mod system;

pub use dmabuf::{DmaBufMapping, DmaBufMemory};
pub use hardware::HardwareMemory;
pub use segment::{MemorySegment, MemoryType};
pub use system::{SystemMemory, SystemSegment};

use crate::error::{Error, Result};

/// One memory region of a pipeline buffer.
#[derive(Debug, Clone)]
pub enum Memory {
    /// View onto process memory.
    System(SystemMemory),
    /// A hardware port buffer.
    Hardware(HardwareMemory),
    /// A DMA-BUF region.
    DmaBuf(DmaBufMemory),
}

impl Memory {
    /// Kind of storage.
    pub fn memory_type(&self) -> MemoryType {
        match self {
            Memory::System(_) => MemoryType::System,
            Memory::Hardware(_) => MemoryType::Hardware,
            Memory::DmaBuf(_) => MemoryType::DmaBuf,
        }
    }

    /// Offset of the visible region.
    pub fn offset(&self) -> usize {
        match self {
            Memory::System(m) => m.offset(),
            Memory::Hardware(m) => m.offset(),
            Memory::DmaBuf(m) => m.offset(),
        }
    }

    /// Size of the visible region.
    pub fn size(&self) -> usize {
        match self {
            Memory::System(m) => m.size(),
            Memory::Hardware(m) => m.size(),
            Memory::DmaBuf(m) => m.size(),
        }
    }

    /// Size of the underlying allocation.
    pub fn maxsize(&self) -> usize {
        match self {
            Memory::System(m) => m.maxsize(),
            Memory::Hardware(m) => m.maxsize(),
            Memory::DmaBuf(m) => m.maxsize(),
        }
    }

    /// Change the visible region.
    pub fn set_region(&mut self, offset: usize, size: usize) -> Result<()> {
        match self {
            Memory::System(m) => m.set_region(offset, size),
            Memory::Hardware(m) => m.set_region(offset, size),
            Memory::DmaBuf(m) => m.set_region(offset, size),
        }
    }

    /// Whether sharing is refused. Hardware memory always refuses.
    pub fn is_no_share(&self) -> bool {
        match self {
            Memory::System(m) => m.is_no_share(),
            Memory::Hardware(_) => true,
            Memory::DmaBuf(m) => m.is_no_share(),
        }
    }

    /// Forbid or allow sharing. Has no effect on hardware memory.
    pub fn set_no_share(&mut self, no_share: bool) {
        match self {
            Memory::System(m) => m.set_no_share(no_share),
            Memory::Hardware(_) => {}
            Memory::DmaBuf(m) => m.set_no_share(no_share),
        }
    }

    /// Create a second handle to the same region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotShareable`] when the memory has the no-share flag.
    pub fn share(&self) -> Result<Memory> {
        match self {
            Memory::System(m) => m.share().map(Memory::System),
            Memory::Hardware(m) => m.share().map(Memory::Hardware),
            Memory::DmaBuf(m) => m.share().map(Memory::DmaBuf),
        }
    }

    /// DMA-BUF view, if this is DMA-BUF memory.
    pub fn as_dmabuf(&self) -> Option<&DmaBufMemory> {
        match self {
            Memory::DmaBuf(m) => Some(m),
            _ => None,
        }
    }

    /// Hardware view, if this wraps a hardware buffer.
    pub fn as_hardware(&self) -> Option<&HardwareMemory> {
        match self {
            Memory::Hardware(m) => Some(m),
            _ => None,
        }
    }

    /// Map the visible region for CPU access.
    pub fn map(&self) -> Result<MemoryMap> {
        match self {
            Memory::System(m) => {
                let base = m.segment().as_mut_ptr().ok_or_else(|| {
                    Error::NotMappable("segment is read-only".into())
                })?;
                Ok(MemoryMap {
                    // SAFETY: offset + size <= segment length (region invariant).
                    ptr: unsafe { base.add(m.offset()) },
                    len: m.size(),
                    _keep: Keep::System(m.clone()),
                })
            }
            Memory::Hardware(m) => Ok(MemoryMap {
                ptr: m.data_ptr()?,
                len: m.size(),
                _keep: Keep::Hardware(m.clone()),
            }),
            Memory::DmaBuf(m) => {
                let mut mapping = m.map()?;
                let ptr = mapping.region_mut(m.offset(), m.size())?.as_mut_ptr();
                Ok(MemoryMap {
                    ptr,
                    len: m.size(),
                    _keep: Keep::DmaBuf(mapping),
                })
            }
        }
    }
}

impl From<SystemMemory> for Memory {
    fn from(m: SystemMemory) -> Self {
        Memory::System(m)
    }
}

impl From<HardwareMemory> for Memory {
    fn from(m: HardwareMemory) -> Self {
        Memory::Hardware(m)
    }
}

impl From<DmaBufMemory> for Memory {
    fn from(m: DmaBufMemory) -> Self {
        Memory::DmaBuf(m)
    }
}

#[allow(dead_code)]
enum Keep {
    System(SystemMemory),
    Hardware(HardwareMemory),
    DmaBuf(DmaBufMapping),
}

/// CPU access to the visible region of a [`Memory`].
///
/// Holds whatever keeps the bytes alive (the segment, the hardware buffer,
/// or the mmap of a DMA-BUF).
pub struct MemoryMap {
    ptr: *mut u8,
    len: usize,
    _keep: Keep,
}

impl MemoryMap {
    /// The mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr/len describe a live region kept alive by `_keep`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// The mapped bytes, mutably.
    ///
    /// Pool buffers are uniquely owned while held, so the holder of the map
    /// is the only writer.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` makes this borrow exclusive.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Mapped length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omx::{BufferBacking, Direction, HardwareBuffer};
    use std::sync::Arc;

    #[test]
    fn test_hardware_memory_map_writes_through() {
        let segment = Arc::new(SystemSegment::new(64).unwrap());
        let hw = Arc::new(HardwareBuffer::new(
            0,
            0,
            Direction::Input,
            64,
            BufferBacking::SystemMemory(segment.clone()),
        ));
        let mut memory = Memory::from(HardwareMemory::new(hw, 0));
        memory.set_region(8, 4).unwrap();

        memory.map().unwrap().as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);

        let raw = unsafe { segment.as_slice() };
        assert_eq!(&raw[8..12], &[1, 2, 3, 4]);
        assert!(memory.is_no_share());
        assert!(memory.share().is_err());
        assert_eq!(memory.as_hardware().map(|h| h.offset()), Some(8));
    }

    #[test]
    fn test_system_memory_map() {
        let segment: Arc<dyn MemorySegment> = Arc::new(SystemSegment::new(32).unwrap());
        let memory = Memory::from(SystemMemory::region(segment, 16, 16).unwrap());
        let map = memory.map().unwrap();
        assert_eq!(map.len(), 16);
        assert_eq!(memory.memory_type(), MemoryType::System);
        assert!(memory.as_hardware().is_none());
    }
}
