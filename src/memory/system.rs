//! Heap-backed memory.

use super::{MemorySegment, MemoryType};
use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// A zero-initialized heap allocation with a guaranteed alignment.
///
/// Used as host memory behind hardware buffers that live in system memory,
/// and as backing for buffers produced outside the pool.
///
/// # Example
///
/// ```rust
/// use omxbridge::memory::{MemorySegment, SystemSegment};
///
/// let segment = SystemSegment::with_alignment(4096, 64).unwrap();
/// assert_eq!(segment.len(), 4096);
/// assert_eq!(segment.as_ptr() as usize % 64, 0);
/// ```
pub struct SystemSegment {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl SystemSegment {
    /// Allocate `size` zeroed bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if size is 0 or allocation fails.
    pub fn new(size: usize) -> Result<Self> {
        Self::with_alignment(size, 1)
    }

    /// Allocate `size` zeroed bytes aligned to `align` (a power of two).
    pub fn with_alignment(size: usize, align: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::AllocationFailed(
                "size must be greater than 0".into(),
            ));
        }
        let layout = Layout::from_size_align(size, align).map_err(|_| {
            Error::AllocationFailed(format!("invalid alignment of {align} bytes"))
        })?;

        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| Error::AllocationFailed(format!("out of memory ({size} bytes)")))?;

        Ok(Self { ptr, layout })
    }

    /// Allocation alignment.
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }
}

impl Drop for SystemSegment {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// SAFETY: the allocation is exclusively owned; concurrent access goes through
// the raw-pointer accessors whose callers synchronize.
unsafe impl Send for SystemSegment {}
// SAFETY: see above.
unsafe impl Sync for SystemSegment {}

impl MemorySegment for SystemSegment {
    fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    fn as_mut_ptr(&self) -> Option<*mut u8> {
        Some(self.ptr.as_ptr())
    }

    fn len(&self) -> usize {
        self.layout.size()
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::System
    }
}

impl fmt::Debug for SystemSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemSegment")
            .field("ptr", &self.ptr)
            .field("len", &self.layout.size())
            .field("align", &self.layout.align())
            .finish()
    }
}

/// A view onto part of a [`MemorySegment`].
///
/// This is the memory type of buffers that do not come from hardware, for
/// example frames supplied by an upstream allocator or by a foreign pool.
#[derive(Clone)]
pub struct SystemMemory {
    segment: Arc<dyn MemorySegment>,
    offset: usize,
    size: usize,
    no_share: bool,
}

impl SystemMemory {
    /// View the whole segment.
    pub fn new(segment: Arc<dyn MemorySegment>) -> Self {
        let size = segment.len();
        Self {
            segment,
            offset: 0,
            size,
            no_share: false,
        }
    }

    /// View `size` bytes at `offset`.
    pub fn region(segment: Arc<dyn MemorySegment>, offset: usize, size: usize) -> Result<Self> {
        let mut memory = Self::new(segment);
        memory.set_region(offset, size)?;
        Ok(memory)
    }

    /// Underlying segment.
    pub fn segment(&self) -> &Arc<dyn MemorySegment> {
        &self.segment
    }

    /// Offset within the segment.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Visible size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size of the segment.
    pub fn maxsize(&self) -> usize {
        self.segment.len()
    }

    /// Change the visible region.
    pub fn set_region(&mut self, offset: usize, size: usize) -> Result<()> {
        check_region(offset, size, self.maxsize())?;
        self.offset = offset;
        self.size = size;
        Ok(())
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

impl fmt::Debug for SystemMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemMemory")
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("maxsize", &self.maxsize())
            .field("no_share", &self.no_share)
            .finish()
    }
}

pub(crate) fn check_region(offset: usize, size: usize, maxsize: usize) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= maxsize => Ok(()),
        _ => Err(Error::InvalidSegment(format!(
            "region {offset}+{size} exceeds {maxsize} bytes"
        ))),
    }
}
