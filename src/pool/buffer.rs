//! Pipeline-visible buffers and their ownership tag.

use crate::error::{Error, Result};
use crate::memory::{Memory, MemoryMap};
use crate::omx::HardwareBuffer;
use crate::sync::lock;
use crate::video::VideoMeta;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// An external pool that supplied buffers to an [`OmxBufferPool`](super::OmxBufferPool).
///
/// Buffers provided this way are re-parented to the hardware pool while it
/// is active and handed back through [`ForeignPool::reclaim`] when freed.
pub trait ForeignPool: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Take back ownership of a buffer.
    fn reclaim(&self, buffer: PoolBuffer);
}

/// Shared handle to a foreign pool.
pub type ForeignPoolHandle = Arc<dyn ForeignPool>;

/// Who is responsible for a buffer's lifecycle.
#[derive(Clone, Default)]
pub enum BufferOwner {
    /// Not pool-managed (e.g. an upstream frame).
    #[default]
    Unpooled,
    /// Managed by the hardware pool.
    OwnedBySelf,
    /// Managed by an external pool.
    OwnedByForeignPool(ForeignPoolHandle),
}

impl BufferOwner {
    /// Whether this tag names `pool`.
    pub fn is_foreign_pool(&self, pool: &ForeignPoolHandle) -> bool {
        match self {
            BufferOwner::OwnedByForeignPool(p) => {
                std::ptr::addr_eq(Arc::as_ptr(p), Arc::as_ptr(pool))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for BufferOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferOwner::Unpooled => write!(f, "Unpooled"),
            BufferOwner::OwnedBySelf => write!(f, "OwnedBySelf"),
            BufferOwner::OwnedByForeignPool(p) => {
                f.debug_tuple("OwnedByForeignPool").field(&p.name()).finish()
            }
        }
    }
}

#[derive(Default)]
struct BufferState {
    memories: SmallVec<[Memory; 3]>,
    video_meta: Option<VideoMeta>,
    owner: BufferOwner,
    hardware: Option<Arc<HardwareBuffer>>,
}

struct BufferInner {
    state: Mutex<BufferState>,
    outstanding: AtomicBool,
}

/// A buffer as seen by the pipeline: memory regions plus metadata.
///
/// Cheap to clone; clones are handles to the same buffer. While a pool is
/// active each of its buffers is bound to exactly one [`HardwareBuffer`].
#[derive(Clone)]
pub struct PoolBuffer {
    inner: Arc<BufferInner>,
}

impl PoolBuffer {
    /// An empty, unpooled buffer.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BufferInner {
                state: Mutex::new(BufferState::default()),
                outstanding: AtomicBool::new(false),
            }),
        }
    }

    /// Add a memory region.
    pub fn with_memory(self, memory: impl Into<Memory>) -> Self {
        self.append_memory(memory.into());
        self
    }

    /// Attach video metadata.
    pub fn with_video_meta(self, meta: VideoMeta) -> Self {
        self.set_video_meta(Some(meta));
        self
    }

    /// Set the ownership tag.
    pub fn with_owner(self, owner: BufferOwner) -> Self {
        self.set_owner(owner);
        self
    }

    /// Append a memory region.
    pub fn append_memory(&self, memory: Memory) {
        lock(&self.inner.state).memories.push(memory);
    }

    /// Number of memory regions.
    pub fn n_memory(&self) -> usize {
        lock(&self.inner.state).memories.len()
    }

    /// Handle to memory region `index`.
    pub fn memory(&self, index: usize) -> Option<Memory> {
        lock(&self.inner.state).memories.get(index).cloned()
    }

    /// Handles to all memory regions.
    pub fn memories(&self) -> SmallVec<[Memory; 3]> {
        lock(&self.inner.state).memories.clone()
    }

    /// Sum of the visible sizes of all regions.
    pub fn size(&self) -> usize {
        lock(&self.inner.state).memories.iter().map(Memory::size).sum()
    }

    /// Locate the region containing byte `offset` of the buffer.
    ///
    /// Returns the region index and the offset within that region.
    pub fn find_memory(&self, offset: usize) -> Option<(usize, usize)> {
        let state = lock(&self.inner.state);
        let mut start = 0;
        for (index, memory) in state.memories.iter().enumerate() {
            let end = start + memory.size();
            if offset < end {
                return Some((index, offset - start));
            }
            start = end;
        }
        None
    }

    /// Map region `index` for CPU access.
    pub fn map_memory(&self, index: usize) -> Result<MemoryMap> {
        self.memory(index)
            .ok_or_else(|| Error::InvalidSegment(format!("no memory at index {index}")))?
            .map()
    }

    /// Video metadata, if attached.
    pub fn video_meta(&self) -> Option<VideoMeta> {
        lock(&self.inner.state).video_meta
    }

    /// Attach or remove video metadata.
    pub fn set_video_meta(&self, meta: Option<VideoMeta>) {
        lock(&self.inner.state).video_meta = meta;
    }

    /// Ownership tag.
    pub fn owner(&self) -> BufferOwner {
        lock(&self.inner.state).owner.clone()
    }

    /// Hardware buffer this buffer is currently bound to.
    pub fn hardware_buffer(&self) -> Option<Arc<HardwareBuffer>> {
        lock(&self.inner.state).hardware.clone()
    }

    /// Whether two handles refer to the same buffer.
    pub fn ptr_eq(a: &PoolBuffer, b: &PoolBuffer) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn set_owner(&self, owner: BufferOwner) {
        lock(&self.inner.state).owner = owner;
    }

    /// Swap the ownership tag, returning the previous one.
    pub(crate) fn replace_owner(&self, owner: BufferOwner) -> BufferOwner {
        std::mem::replace(&mut lock(&self.inner.state).owner, owner)
    }

    pub(crate) fn set_hardware_buffer(&self, hardware: Option<Arc<HardwareBuffer>>) {
        lock(&self.inner.state).hardware = hardware;
    }

    pub(crate) fn is_bound_to(&self, hardware: &Arc<HardwareBuffer>) -> bool {
        lock(&self.inner.state)
            .hardware
            .as_ref()
            .is_some_and(|h| Arc::ptr_eq(h, hardware))
    }

    /// Run `f` on the memory list under the buffer lock.
    pub(crate) fn with_memories_mut<R>(
        &self,
        f: impl FnOnce(&mut SmallVec<[Memory; 3]>) -> R,
    ) -> R {
        f(&mut lock(&self.inner.state).memories)
    }

    /// Whether a consumer currently holds the buffer.
    pub(crate) fn is_outstanding(&self) -> bool {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Mark as handed to a consumer. Returns false if it already was.
    pub(crate) fn mark_outstanding(&self) -> bool {
        !self.inner.outstanding.swap(true, Ordering::AcqRel)
    }

    /// Mark as returned to the pool. Returns false if it already was.
    pub(crate) fn mark_returned(&self) -> bool {
        self.inner.outstanding.swap(false, Ordering::AcqRel)
    }
}

impl Default for PoolBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PoolBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("PoolBuffer")
            .field("memories", &state.memories)
            .field("video_meta", &state.video_meta.is_some())
            .field("owner", &state.owner)
            .field("hardware", &state.hardware.as_ref().map(|h| h.index()))
            .field("outstanding", &self.is_outstanding())
            .finish()
    }
}
