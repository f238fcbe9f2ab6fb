//! Memory wrapping a hardware port buffer.

use super::system::check_region;
use crate::error::{Error, Result};
use crate::omx::HardwareBuffer;
use std::fmt;
use std::sync::Arc;

/// One hardware buffer exposed as a memory region.
///
/// The mapped address is `host base + offset`. The region never shares:
/// [`HardwareMemory::share`] always fails, so whoever holds the pool buffer
/// is the single owner and the pool can hand the hardware buffer back
/// deterministically once it returns.
#[derive(Clone)]
pub struct HardwareMemory {
    buffer: Arc<HardwareBuffer>,
    offset: usize,
    size: usize,
    align_mask: usize,
}

impl HardwareMemory {
    /// Wrap the full allocation of `buffer`.
    ///
    /// `alignment` is the port's buffer alignment in bytes. Zero means no
    /// requirement; a value that is not a power of two is ignored with a warning.
    pub fn new(buffer: Arc<HardwareBuffer>, alignment: u32) -> Self {
        let align_mask = match alignment {
            0 => 0,
            a if a.is_power_of_two() => a as usize - 1,
            a => {
                tracing::warn!(
                    alignment = a,
                    index = buffer.index(),
                    "invalid buffer alignment, ignoring"
                );
                0
            }
        };
        let size = buffer.alloc_len();
        Self {
            buffer,
            offset: 0,
            size,
            align_mask,
        }
    }

    /// Wrapped hardware buffer.
    pub fn buffer(&self) -> &Arc<HardwareBuffer> {
        &self.buffer
    }

    /// Offset within the hardware buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Visible size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Allocated size of the hardware buffer.
    pub fn maxsize(&self) -> usize {
        self.buffer.alloc_len()
    }

    /// Alignment mask (alignment - 1).
    pub fn align_mask(&self) -> usize {
        self.align_mask
    }

    /// Change the visible region.
    pub fn set_region(&mut self, offset: usize, size: usize) -> Result<()> {
        check_region(offset, size, self.maxsize())?;
        self.offset = offset;
        self.size = size;
        Ok(())
    }

    /// Always fails.
    pub fn share(&self) -> Result<Self> {
        Err(Error::NotShareable)
    }

    /// Host pointer to the start of the visible region.
    pub(crate) fn data_ptr(&self) -> Result<*mut u8> {
        let segment = self.buffer.host_segment().ok_or_else(|| {
            Error::NotMappable(format!(
                "hardware buffer {} has no host mapping",
                self.buffer.index()
            ))
        })?;
        let base = segment.as_mut_ptr().ok_or_else(|| {
            Error::NotMappable(format!("hardware buffer {} is read-only", self.buffer.index()))
        })?;
        // SAFETY: offset + size <= alloc_len <= segment length (checked by set_region).
        Ok(unsafe { base.add(self.offset) })
    }
}

impl fmt::Debug for HardwareMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareMemory")
            .field("index", &self.buffer.index())
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("align_mask", &self.align_mask)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SystemSegment;
    use crate::omx::{BufferBacking, Direction};

    fn hw_buffer(len: usize) -> Arc<HardwareBuffer> {
        let seg = Arc::new(SystemSegment::new(len).unwrap());
        Arc::new(HardwareBuffer::new(
            0,
            1,
            Direction::Output,
            len,
            BufferBacking::SystemMemory(seg),
        ))
    }

    #[test]
    fn test_alignment_conversion() {
        assert_eq!(HardwareMemory::new(hw_buffer(64), 0).align_mask(), 0);
        assert_eq!(HardwareMemory::new(hw_buffer(64), 16).align_mask(), 15);
        assert_eq!(HardwareMemory::new(hw_buffer(64), 24).align_mask(), 0);
    }

    #[test]
    fn test_pointer_is_base_plus_offset() {
        let buffer = hw_buffer(256);
        let base = buffer.host_segment().unwrap().as_ptr() as usize;
        let mut memory = HardwareMemory::new(buffer, 0);
        memory.set_region(32, 100).unwrap();
        assert_eq!(memory.data_ptr().unwrap() as usize, base + 32);
    }

    #[test]
    fn test_share_always_fails() {
        let memory = HardwareMemory::new(hw_buffer(64), 0);
        assert!(matches!(memory.share(), Err(Error::NotShareable)));
    }
}
