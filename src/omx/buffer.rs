//! Hardware buffers owned by a port.

use super::Direction;
use crate::memory::MemorySegment;
use crate::sync::lock;
use crate::video::MAX_PLANES;
use std::fmt;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Storage behind a hardware buffer.
pub enum BufferBacking {
    /// Host-mapped memory the component reads or writes through a pointer.
    SystemMemory(Arc<dyn MemorySegment>),
    /// A DMA-BUF file descriptor handed out by the component.
    DmaBuffer {
        /// The DMA-BUF.
        fd: OwnedFd,
    },
}

impl fmt::Debug for BufferBacking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferBacking::SystemMemory(seg) => f
                .debug_struct("SystemMemory")
                .field("ptr", &seg.as_ptr())
                .field("len", &seg.len())
                .finish(),
            BufferBacking::DmaBuffer { fd } => {
                f.debug_struct("DmaBuffer").field("fd", fd).finish()
            }
        }
    }
}

/// Per-frame result attached by a decoder to an output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeResult {
    /// Physical address of the luma plane.
    pub phys_y: u64,
    /// Decoded picture width.
    pub picture_width: u32,
    /// Decoded picture height.
    pub picture_height: u32,
}

/// One fixed-size buffer bound to a hardware port.
///
/// Shared as `Arc<HardwareBuffer>`; identity (pointer equality) is what the
/// pool uses to map a buffer returned by the port back to its wrapper.
pub struct HardwareBuffer {
    index: usize,
    port_index: u32,
    direction: Direction,
    alloc_len: usize,
    backing: BufferBacking,
    phys_addr: Option<u64>,
    used: AtomicBool,
    filled_len: AtomicUsize,
    offset: AtomicUsize,
    decode_result: Mutex<Option<DecodeResult>>,
    plane_addrs: Mutex<[u64; MAX_PLANES]>,
}

impl HardwareBuffer {
    /// Create a buffer. It starts unused and empty.
    pub fn new(
        index: usize,
        port_index: u32,
        direction: Direction,
        alloc_len: usize,
        backing: BufferBacking,
    ) -> Self {
        Self {
            index,
            port_index,
            direction,
            alloc_len,
            backing,
            phys_addr: None,
            used: AtomicBool::new(false),
            filled_len: AtomicUsize::new(0),
            offset: AtomicUsize::new(0),
            decode_result: Mutex::new(None),
            plane_addrs: Mutex::new([0; MAX_PLANES]),
        }
    }

    /// Set the physical address of the buffer.
    pub fn with_phys_addr(mut self, phys_addr: u64) -> Self {
        self.phys_addr = Some(phys_addr);
        self
    }

    /// Index of the buffer on its port.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Index of the owning port.
    pub fn port_index(&self) -> u32 {
        self.port_index
    }

    /// Direction of the owning port.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Allocated size in bytes.
    pub fn alloc_len(&self) -> usize {
        self.alloc_len
    }

    /// Backing storage.
    pub fn backing(&self) -> &BufferBacking {
        &self.backing
    }

    /// Host-mapped segment, if the buffer lives in system memory.
    pub fn host_segment(&self) -> Option<&Arc<dyn MemorySegment>> {
        match &self.backing {
            BufferBacking::SystemMemory(seg) => Some(seg),
            BufferBacking::DmaBuffer { .. } => None,
        }
    }

    /// DMA-BUF descriptor, if the buffer is DMA backed.
    pub fn dma_fd(&self) -> Option<BorrowedFd<'_>> {
        match &self.backing {
            BufferBacking::DmaBuffer { fd } => Some(fd.as_fd()),
            BufferBacking::SystemMemory(_) => None,
        }
    }

    /// Physical address, if known.
    pub fn phys_addr(&self) -> Option<u64> {
        self.phys_addr
    }

    /// Whether the buffer is currently submitted to the hardware.
    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    /// Mark the buffer as submitted to (or returned from) the hardware.
    pub fn set_used(&self, used: bool) {
        self.used.store(used, Ordering::Release);
    }

    /// Number of valid payload bytes.
    pub fn filled_len(&self) -> usize {
        self.filled_len.load(Ordering::Acquire)
    }

    /// Offset of the payload within the buffer.
    pub fn offset(&self) -> usize {
        self.offset.load(Ordering::Acquire)
    }

    /// Record the payload region reported by the hardware.
    pub fn set_filled(&self, offset: usize, len: usize) {
        self.offset.store(offset, Ordering::Release);
        self.filled_len.store(len, Ordering::Release);
    }

    /// Decode result attached to the last completed frame.
    pub fn decode_result(&self) -> Option<DecodeResult> {
        *lock(&self.decode_result)
    }

    /// Attach or clear the decode result.
    pub fn set_decode_result(&self, result: Option<DecodeResult>) {
        *lock(&self.decode_result) = result;
    }

    /// Physical address the hardware uses for `plane` of an imported frame.
    pub fn plane_address(&self, plane: usize) -> u64 {
        lock(&self.plane_addrs).get(plane).copied().unwrap_or(0)
    }

    pub(crate) fn set_plane_address(&self, plane: usize, addr: u64) {
        if let Some(slot) = lock(&self.plane_addrs).get_mut(plane) {
            *slot = addr;
        }
    }
}

impl fmt::Debug for HardwareBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareBuffer")
            .field("index", &self.index)
            .field("port_index", &self.port_index)
            .field("direction", &self.direction)
            .field("alloc_len", &self.alloc_len)
            .field("used", &self.is_used())
            .field("filled_len", &self.filled_len())
            .field("phys_addr", &self.phys_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SystemSegment;

    fn make_buffer() -> HardwareBuffer {
        let seg = Arc::new(SystemSegment::new(4096).unwrap());
        HardwareBuffer::new(2, 1, Direction::Output, 4096, BufferBacking::SystemMemory(seg))
    }

    #[test]
    fn test_fill_state() {
        let buf = make_buffer();
        assert!(!buf.is_used());
        assert_eq!(buf.filled_len(), 0);

        buf.set_used(true);
        buf.set_filled(16, 1000);
        assert!(buf.is_used());
        assert_eq!(buf.offset(), 16);
        assert_eq!(buf.filled_len(), 1000);
    }

    #[test]
    fn test_backing_accessors() {
        let buf = make_buffer().with_phys_addr(0x4000_0000);
        assert!(buf.host_segment().is_some());
        assert!(buf.dma_fd().is_none());
        assert_eq!(buf.phys_addr(), Some(0x4000_0000));
    }

    #[test]
    fn test_decode_result_and_plane_addresses() {
        let buf = make_buffer();
        assert!(buf.decode_result().is_none());
        buf.set_decode_result(Some(DecodeResult {
            phys_y: 0x5000_0000,
            picture_width: 1280,
            picture_height: 720,
        }));
        assert_eq!(buf.decode_result().unwrap().picture_width, 1280);

        buf.set_plane_address(1, 0x5010_0000);
        assert_eq!(buf.plane_address(1), 0x5010_0000);
        assert_eq!(buf.plane_address(MAX_PLANES), 0);
    }
}
