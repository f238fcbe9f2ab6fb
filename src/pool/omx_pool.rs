//! Buffer pool owning the buffer batch of one hardware port.

use super::buffer::{BufferOwner, ForeignPoolHandle, PoolBuffer};
use super::config::{AcquireParams, BUFFER_POOL_OPTION_VIDEO_META, BufferMode, DmaStrategy};
use super::{BufferPool, PoolConfig, PoolSettings, PoolStats};
use crate::caps::{CAPS_FEATURE_MEMORY_DMABUF, Caps};
use crate::error::{Error, Result};
use crate::memory::{DmaBufMemory, HardwareMemory, Memory};
use crate::observability::{self, PoolMetrics};
use crate::omx::{
    Component, Direction, HardwareBuffer, HardwarePort, PortAcquire, PortDefinition,
};
use crate::sync::lock;
use crate::video::{HardwareLayout, VideoInfo, VideoMeta};
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// The element a pool belongs to.
///
/// The pool reports to its owner instead of a global signal registry: the
/// owner allocates hardware buffers on request, receives errors, and tells
/// the pool about downstream and stream state.
pub trait PoolOwner: Send + Sync {
    /// The pool is starting and the port has no buffers. Allocate them on
    /// the port and return whether that succeeded.
    fn allocate_buffers(&self, pool: &OmxBufferPool) -> bool;

    /// A non-fatal error happened on the pool's behalf.
    fn post_error(&self, error: &Error);

    /// Whether downstream consumes the DMA-BUF descriptors directly, in which
    /// case output memory regions are not resized to the filled length.
    fn downstream_dmabuf(&self) -> bool {
        false
    }

    /// Whether the stream is in a dynamic resolution change.
    fn dynamic_change(&self) -> bool {
        false
    }
}

/// Fields guarded by the pool's object lock.
#[derive(Default)]
struct PoolState {
    component: Option<Arc<dyn Component>>,
    port: Option<Arc<dyn HardwarePort>>,
    config: Option<PoolConfig>,
    requested_max: u32,
    caps: Option<Caps>,
    video_info: Option<VideoInfo>,
    add_videometa: bool,
    need_copy: bool,
    deactivated: bool,
    foreign_pool: Option<ForeignPoolHandle>,
}

/// What `alloc_buffer` needs from the object lock, copied out once.
struct AllocContext {
    port: Arc<dyn HardwarePort>,
    definition: PortDefinition,
    video_info: Option<VideoInfo>,
    add_videometa: bool,
    dmabuf_caps: bool,
    foreign_pool: Option<ForeignPoolHandle>,
}

impl AllocContext {
    fn layout(&self) -> Option<HardwareLayout> {
        let info = self.video_info?;
        let (nstride, nslice) = match self.definition.video_format() {
            Some(v) => (v.stride.unsigned_abs() as usize, v.slice_height as usize),
            None => (info.stride[0], info.height as usize),
        };
        Some(HardwareLayout::new(info.format, nstride, nslice))
    }
}

/// A buffer pool bound to one hardware port.
///
/// The pool owns exactly `min == max` buffers while active, each bound to
/// the hardware buffer with the same index. On an output port, acquire
/// returns the buffer at the current index (set by the owner when the
/// hardware reports a fill) and release hands it back to the hardware for
/// refilling. On an input port, acquire waits for the hardware to free a
/// buffer and release makes it available to upstream again.
///
/// The binding cursor and buffer array are kept apart from the object
/// lock. Allocation happens in index order during activation, before any
/// acquire or release. Activation, deactivation and configuration are
/// serialized by a separate activation lock held for their whole duration.
pub struct OmxBufferPool {
    owner: Weak<dyn PoolOwner>,
    settings: PoolSettings,
    activation: Mutex<()>,
    state: Mutex<PoolState>,
    buffers: Mutex<Vec<PoolBuffer>>,
    cursor: AtomicUsize,
    active: AtomicBool,
    flushing: AtomicBool,
    phys_cache: Mutex<Vec<u64>>,
    acquisitions: AtomicU64,
    metrics: PoolMetrics,
}

impl OmxBufferPool {
    /// Create a pool for `port` of `component`.
    ///
    /// The pool keeps a weak reference to `owner`.
    pub fn new<O: PoolOwner + 'static>(
        owner: &Arc<O>,
        component: Arc<dyn Component>,
        port: Arc<dyn HardwarePort>,
        settings: PoolSettings,
    ) -> Arc<Self> {
        let owner: Weak<O> = Arc::downgrade(owner);
        let owner: Weak<dyn PoolOwner> = owner;
        observability::init_metrics();
        Arc::new(Self {
            owner,
            metrics: PoolMetrics::new(&settings.name),
            settings,
            activation: Mutex::new(()),
            state: Mutex::new(PoolState {
                component: Some(component),
                port: Some(port),
                ..PoolState::default()
            }),
            buffers: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            active: AtomicBool::new(false),
            flushing: AtomicBool::new(false),
            phys_cache: Mutex::new(Vec::new()),
            acquisitions: AtomicU64::new(0),
        })
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Memory strategy.
    pub fn mode(&self) -> &BufferMode {
        &self.settings.mode
    }

    /// Attached port.
    pub fn port(&self) -> Option<Arc<dyn HardwarePort>> {
        lock(&self.state).port.clone()
    }

    /// Attached component.
    pub fn component(&self) -> Option<Arc<dyn Component>> {
        lock(&self.state).component.clone()
    }

    /// Re-attach to a component and port.
    pub fn attach(&self, component: Arc<dyn Component>, port: Arc<dyn HardwarePort>) -> Result<()> {
        let _activation = lock(&self.activation);
        if self.is_active() {
            return Err(Error::PoolActive);
        }
        let mut state = lock(&self.state);
        state.component = Some(component);
        state.port = Some(port);
        Ok(())
    }

    /// Detach from the component and port. A detached pool cannot start.
    pub fn detach(&self) {
        let mut state = lock(&self.state);
        state.component = None;
        state.port = None;
    }

    /// Use buffers supplied by `pool` instead of building memory.
    ///
    /// Every buffer must be tagged as owned by `pool`. They are bound to
    /// hardware buffers in the order given. The buffers are handed back
    /// when the pool stops or fails to start, and the pool builds its own
    /// memory again unless this is called before the next activation.
    pub fn set_foreign_buffers(
        &self,
        pool: ForeignPoolHandle,
        buffers: Vec<PoolBuffer>,
    ) -> Result<()> {
        let _activation = lock(&self.activation);
        if self.is_active() {
            return Err(Error::PoolActive);
        }
        if let Some(index) = buffers.iter().position(|b| !b.owner().is_foreign_pool(&pool)) {
            return Err(Error::InvalidConfig(format!(
                "buffer {index} is not owned by pool {}",
                pool.name()
            )));
        }
        tracing::debug!(
            pool = %self.settings.name,
            foreign = pool.name(),
            count = buffers.len(),
            "using buffers of another pool"
        );
        lock(&self.state).foreign_pool = Some(pool);
        *lock(&self.buffers) = buffers;
        Ok(())
    }

    /// Whether acquired buffers need a copy to reach the natural layout.
    ///
    /// When set, every buffer carries [`VideoMeta`] describing the hardware
    /// layout.
    pub fn needs_copy(&self) -> bool {
        lock(&self.state).need_copy
    }

    /// Index of the buffer the next output acquire returns.
    pub fn current_buffer_index(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Select the buffer the next output acquire returns.
    pub fn set_current_buffer_index(&self, index: usize) {
        self.cursor.store(index, Ordering::Release);
    }

    /// Acquire the pool buffer bound to a filled output `hardware` buffer.
    pub fn acquire_for(&self, hardware: &HardwareBuffer) -> Result<PoolBuffer> {
        self.set_current_buffer_index(hardware.index());
        self.acquire_buffer(AcquireParams::default())
    }

    /// Pool buffer bound to `hardware`, if any.
    pub fn find_buffer(&self, hardware: &Arc<HardwareBuffer>) -> Option<PoolBuffer> {
        lock(&self.buffers)
            .iter()
            .find(|b| b.is_bound_to(hardware))
            .cloned()
    }

    /// Buffers currently bound to the pool, in index order.
    pub fn buffers(&self) -> Vec<PoolBuffer> {
        lock(&self.buffers).clone()
    }

    // ========================================================================
    // Start / stop
    // ========================================================================

    /// Prepare the port for activation.
    ///
    /// Requires an attached component and port and a configuration whose
    /// requested maximum does not exceed its minimum. Asks the owner to
    /// allocate hardware buffers when the port has none.
    pub fn start(&self) -> Result<()> {
        let (port, min) = {
            let state = lock(&self.state);
            let (Some(_), Some(port)) = (&state.component, &state.port) else {
                return Err(Error::NotAttached);
            };
            let config = state.config.as_ref().ok_or(Error::NotConfigured)?;
            if state.requested_max > config.min {
                tracing::warn!(
                    pool = %self.settings.name,
                    min = config.min,
                    max = state.requested_max,
                    "max cannot be higher than min as pool cannot allocate buffers on the fly"
                );
                return Err(Error::MaxExceedsMin {
                    min: config.min,
                    max: state.requested_max,
                });
            }
            if config.min == 0 {
                return Err(Error::InvalidConfig("pool needs at least one buffer".into()));
            }
            (port.clone(), config.min as usize)
        };

        port.set_using_pool(true);

        if port.buffer_count() == 0 {
            tracing::debug!(
                pool = %self.settings.name,
                port = port.index(),
                "buffers not yet allocated on port"
            );
            let allocated = self
                .owner
                .upgrade()
                .is_some_and(|owner| owner.allocate_buffers(self));
            if !allocated || port.buffer_count() == 0 {
                tracing::warn!(
                    pool = %self.settings.name,
                    "element failed to allocate buffers, can't start pool"
                );
                port.set_using_pool(false);
                return Err(Error::AllocateFailed { port: port.index() });
            }
        }

        let count = port.buffer_count();
        if count != min {
            port.set_using_pool(false);
            return Err(Error::InvalidConfig(format!(
                "pool min {min} does not match {count} buffers on port {}",
                port.index()
            )));
        }

        if !self.dynamic_change() {
            lock(&self.phys_cache).clear();
        }
        self.cursor.store(0, Ordering::Release);
        lock(&self.state).deactivated = false;
        Ok(())
    }

    /// Release every buffer and free the port's hardware buffers.
    ///
    /// Clears the configuration and hands foreign buffers back; the pool
    /// must be configured again before the next start.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        self.release_resources();

        let mut state = lock(&self.state);
        state.caps = None;
        state.config = None;
        state.requested_max = 0;
        state.video_info = None;
        state.add_videometa = false;
        state.need_copy = false;
        state.deactivated = true;
    }

    fn release_resources(&self) {
        let buffers = std::mem::take(&mut *lock(&self.buffers));
        for buffer in buffers {
            self.free_buffer(buffer);
        }
        lock(&self.state).foreign_pool = None;

        if let Some(port) = self.port() {
            tracing::debug!(pool = %self.settings.name, "deallocate hardware buffers");
            if let Err(e) = port.deallocate_buffers() {
                tracing::warn!(
                    pool = %self.settings.name,
                    error = %e,
                    "failed to deallocate buffers"
                );
            }
            port.set_using_pool(false);
        }
        self.cursor.store(0, Ordering::Release);
    }

    fn activate(&self) -> Result<()> {
        self.start()?;

        let min = lock(&self.state).config.as_ref().map_or(0, |c| c.min);
        for _ in 0..min {
            if let Err(e) = self.alloc_buffer() {
                tracing::error!(pool = %self.settings.name, error = %e, "buffer allocation failed");
                self.release_resources();
                return Err(e);
            }
        }

        self.cursor.store(0, Ordering::Release);
        self.active.store(true, Ordering::Release);
        tracing::info!(
            pool = %self.settings.name,
            buffers = min,
            need_copy = self.needs_copy(),
            "pool started"
        );
        Ok(())
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Bind the next pool buffer to the hardware buffer at the cursor.
    ///
    /// # Errors
    ///
    /// [`Error::AllocationExhausted`] once every hardware buffer is bound;
    /// DMA export and mappability failures as reported by the memory layer.
    pub fn alloc_buffer(&self) -> Result<PoolBuffer> {
        let ctx = self.alloc_context()?;
        let index = self.cursor.load(Ordering::Acquire);
        let hardware_buffers = ctx.port.buffers();
        let hardware = hardware_buffers
            .get(index)
            .cloned()
            .ok_or(Error::AllocationExhausted {
                index,
                count: hardware_buffers.len(),
            })?;

        let buffer = match &ctx.foreign_pool {
            Some(foreign) => self.adopt_foreign(index, foreign, &ctx)?,
            None => self.build_owned(index, &hardware, &ctx)?,
        };
        buffer.set_hardware_buffer(Some(hardware));

        self.cursor.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(pool = %self.settings.name, index, "buffer bound");
        Ok(buffer)
    }

    fn alloc_context(&self) -> Result<AllocContext> {
        let state = lock(&self.state);
        let port = state.port.clone().ok_or(Error::NotAttached)?;
        let caps = state.caps.as_ref().ok_or(Error::NotConfigured)?;
        Ok(AllocContext {
            definition: port.definition(),
            port,
            video_info: state.video_info,
            add_videometa: state.add_videometa,
            dmabuf_caps: caps.has_feature(CAPS_FEATURE_MEMORY_DMABUF),
            foreign_pool: state.foreign_pool.clone(),
        })
    }

    fn adopt_foreign(
        &self,
        index: usize,
        foreign: &ForeignPoolHandle,
        ctx: &AllocContext,
    ) -> Result<PoolBuffer> {
        let buffer = {
            let buffers = lock(&self.buffers);
            buffers
                .get(index)
                .cloned()
                .ok_or(Error::AllocationExhausted {
                    index,
                    count: buffers.len(),
                })?
        };

        {
            let mut state = lock(&self.state);
            let previous = buffer.replace_owner(BufferOwner::OwnedBySelf);
            if !previous.is_foreign_pool(foreign) {
                buffer.set_owner(previous);
                return Err(Error::Invariant(format!(
                    "buffer {index} does not belong to pool {}",
                    foreign.name()
                )));
            }
            state.need_copy = false;
        }

        // The pool must see the memory become unused before it can hand the
        // buffer back to the hardware.
        buffer.with_memories_mut(|memories| {
            memories.iter_mut().for_each(|m| m.set_no_share(true));
        });

        if ctx.add_videometa && buffer.video_meta().is_none() {
            if let Some(info) = &ctx.video_info {
                buffer.set_video_meta(Some(VideoMeta::from_info(info)));
            }
        }
        Ok(buffer)
    }

    fn build_owned(
        &self,
        index: usize,
        hardware: &Arc<HardwareBuffer>,
        ctx: &AllocContext,
    ) -> Result<PoolBuffer> {
        let layout = ctx.layout();
        let buffer = PoolBuffer::new().with_owner(BufferOwner::OwnedBySelf);

        match &self.settings.mode {
            BufferMode::SystemMemory => {
                buffer.append_memory(
                    HardwareMemory::new(hardware.clone(), ctx.definition.buffer_alignment).into(),
                );
            }
            BufferMode::DmaBuf(strategy) => {
                for memory in self.dma_memories(strategy, index, hardware, layout.as_ref())? {
                    let memory = Memory::from(memory);
                    if !ctx.dmabuf_caps {
                        memory.map().map_err(|e| {
                            tracing::error!(
                                pool = %self.settings.name,
                                index,
                                error = %e,
                                "dmabuf memory is not mappable but caps does not have the 'memory:DMABuf' feature"
                            );
                            Error::NotMappable(format!("buffer {index}: {e}"))
                        })?;
                    }
                    buffer.append_memory(memory);
                }
            }
        }

        if let (Some(info), Some(layout)) = (&ctx.video_info, &layout) {
            let need_copy = if ctx.add_videometa {
                false
            } else {
                let mut mismatched = false;
                for plane in layout.mismatched_planes(info) {
                    tracing::debug!(
                        pool = %self.settings.name,
                        plane,
                        stride = layout.stride[plane],
                        expected_stride = info.stride[plane],
                        offset = layout.offset[plane],
                        expected_offset = info.offset[plane],
                        "need to copy output frames because of stride/offset mismatch"
                    );
                    mismatched = true;
                }
                mismatched
            };
            lock(&self.state).need_copy = need_copy;
            if index == 0 {
                observability::record_need_copy(&self.settings.name, need_copy);
            }

            if need_copy || ctx.add_videometa {
                buffer.set_video_meta(Some(VideoMeta::from_layout(info, layout)));
            }
        }

        lock(&self.buffers).push(buffer.clone());
        Ok(buffer)
    }

    fn dma_memories(
        &self,
        strategy: &DmaStrategy,
        index: usize,
        hardware: &HardwareBuffer,
        layout: Option<&HardwareLayout>,
    ) -> Result<SmallVec<[DmaBufMemory; 3]>> {
        let mut memories = SmallVec::new();
        match strategy {
            DmaStrategy::NativeFd => {
                let fd = hardware.dma_fd().ok_or_else(|| {
                    Error::NotMappable(format!("hardware buffer {index} has no DMA-BUF descriptor"))
                })?;
                memories.push(DmaBufMemory::from_fd(
                    fd.try_clone_to_owned()?,
                    hardware.alloc_len(),
                ));
            }
            DmaStrategy::PhysicalExport {
                bridge,
                multi_plane,
            } => match layout {
                None => memories.push(bridge.export_buffer(hardware)?),
                Some(layout) => {
                    let n_planes = if *multi_plane { layout.n_planes } else { 1 };
                    for plane in 0..n_planes {
                        let size = if *multi_plane {
                            layout.plane_size(plane)
                        } else {
                            (0..layout.n_planes).map(|p| layout.plane_size(p)).sum()
                        };
                        let phys_addr =
                            self.plane_phys_addr(index, plane, n_planes, hardware, layout)?;
                        memories.push(bridge.export_region(phys_addr, size)?);
                    }
                }
            },
        }
        Ok(memories)
    }

    /// Physical address of `plane` of hardware buffer `index`.
    ///
    /// Addresses are recorded while not in a dynamic change. During one, a
    /// buffer without a decode result reuses the address recorded for its
    /// slot.
    fn plane_phys_addr(
        &self,
        index: usize,
        plane: usize,
        n_planes: usize,
        hardware: &HardwareBuffer,
        layout: &HardwareLayout,
    ) -> Result<u64> {
        let slot = n_planes * index + plane;
        let base = hardware.decode_result().map(|r| r.phys_y);
        let dynamic = self.dynamic_change();
        let mut cache = lock(&self.phys_cache);

        if dynamic && base.is_none() {
            return cache
                .get(slot)
                .copied()
                .ok_or(Error::NoPhysicalAddress { index });
        }

        let addr = base
            .or(hardware.phys_addr())
            .ok_or(Error::NoPhysicalAddress { index })?
            + layout.offset[plane] as u64;

        if !dynamic {
            if cache.len() <= slot {
                cache.resize(slot + 1, 0);
            }
            cache[slot] = addr;
        }
        Ok(addr)
    }

    /// Detach a buffer from its hardware buffer and drop it from the pool.
    ///
    /// Buffers supplied by a foreign pool are handed back to it.
    pub fn free_buffer(&self, buffer: PoolBuffer) {
        buffer.set_hardware_buffer(None);
        buffer.mark_returned();
        lock(&self.buffers).retain(|b| !PoolBuffer::ptr_eq(b, &buffer));

        let foreign = {
            let state = lock(&self.state);
            match &state.foreign_pool {
                Some(foreign) => {
                    buffer.set_owner(BufferOwner::OwnedByForeignPool(foreign.clone()));
                    Some(foreign.clone())
                }
                None => {
                    buffer.set_owner(BufferOwner::Unpooled);
                    None
                }
            }
        };

        if let Some(foreign) = foreign {
            buffer.with_memories_mut(|memories| {
                memories.iter_mut().for_each(|m| m.set_no_share(false));
            });
            foreign.reclaim(buffer);
        }
    }

    // ========================================================================
    // Acquire / release
    // ========================================================================

    fn acquire_output(&self, foreign: bool) -> Result<PoolBuffer> {
        let index = self.cursor.load(Ordering::Acquire);
        let buffer = lock(&self.buffers)
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Invariant(format!("no pool buffer at index {index}")))?;
        let hardware = buffer
            .hardware_buffer()
            .ok_or_else(|| Error::Invariant(format!("buffer {index} has no hardware buffer")))?;

        if hardware.is_used() {
            return Err(Error::Invariant(format!(
                "buffer {index} is still queued with the hardware"
            )));
        }
        if !buffer.mark_outstanding() {
            return Err(Error::Invariant(format!("buffer {index} is already held")));
        }

        if !foreign && !self.downstream_dmabuf() {
            self.refresh_filled_region(&buffer, &hardware)?;
        }
        Ok(buffer)
    }

    /// Report the hardware's filled length and offset through the memory region.
    fn refresh_filled_region(&self, buffer: &PoolBuffer, hardware: &HardwareBuffer) -> Result<()> {
        let refreshable = matches!(
            self.settings.mode,
            BufferMode::SystemMemory | BufferMode::DmaBuf(DmaStrategy::NativeFd)
        );
        if !refreshable {
            return Ok(());
        }
        buffer.with_memories_mut(|memories| match memories.first_mut() {
            Some(memory) => memory.set_region(hardware.offset(), hardware.filled_len()),
            None => Ok(()),
        })
    }

    fn acquire_input(&self, port: &dyn HardwarePort, params: AcquireParams) -> Result<PoolBuffer> {
        match port.acquire_buffer(params.wait) {
            PortAcquire::Buffer(hardware) => {
                let buffer = self.find_buffer(&hardware).ok_or_else(|| {
                    Error::Invariant(format!(
                        "hardware buffer {} has no pool buffer",
                        hardware.index()
                    ))
                })?;
                if !buffer.mark_outstanding() {
                    return Err(Error::Invariant(format!(
                        "buffer {} is already held",
                        hardware.index()
                    )));
                }
                Ok(buffer)
            }
            PortAcquire::Flushing => Err(Error::Flushing),
            PortAcquire::NoAvailable => Err(Error::WouldBlock),
            PortAcquire::Error(e) => Err(Error::Omx(e)),
        }
    }

    fn downstream_dmabuf(&self) -> bool {
        self.owner.upgrade().is_some_and(|o| o.downstream_dmabuf())
    }

    fn dynamic_change(&self) -> bool {
        self.owner.upgrade().is_some_and(|o| o.dynamic_change())
    }

    fn post_error(&self, error: &Error) {
        if let Some(owner) = self.owner.upgrade() {
            owner.post_error(error);
        }
    }
}

impl BufferPool for OmxBufferPool {
    fn options(&self) -> Vec<&'static str> {
        match self.port() {
            Some(port) if port.definition().is_raw_video() => vec![BUFFER_POOL_OPTION_VIDEO_META],
            _ => Vec::new(),
        }
    }

    fn set_config(&self, config: PoolConfig) -> Result<()> {
        let _activation = lock(&self.activation);
        if self.is_active() {
            return Err(Error::PoolActive);
        }
        let mut state = lock(&self.state);

        let Some(caps) = config.caps.clone() else {
            tracing::warn!(pool = %self.settings.name, "no caps in config");
            return Err(Error::NoCaps);
        };

        let raw_video = state
            .port
            .as_ref()
            .is_some_and(|p| p.definition().is_raw_video());
        let (video_info, add_videometa) = if raw_video {
            let info = VideoInfo::from_caps(&caps).inspect_err(|_| {
                tracing::warn!(
                    pool = %self.settings.name,
                    caps = %caps,
                    "failed getting geometry from caps"
                );
            })?;
            (Some(info), config.has_option(BUFFER_POOL_OPTION_VIDEO_META))
        } else {
            (None, false)
        };

        state.video_info = video_info;
        state.add_videometa = add_videometa;
        state.caps = Some(caps);
        state.requested_max = config.max;
        state.config = Some(PoolConfig {
            max: config.min,
            ..config
        });
        Ok(())
    }

    fn config(&self) -> Option<PoolConfig> {
        lock(&self.state).config.clone()
    }

    fn set_active(&self, active: bool) -> Result<()> {
        let _activation = lock(&self.activation);
        if active == self.is_active() {
            return Ok(());
        }
        let (port, direction) = self
            .port()
            .map(|p| (p.index(), p.definition().direction))
            .unwrap_or((u32::MAX, Direction::Output));
        let _span = observability::span_pool(&self.settings.name, port, direction).entered();

        if active {
            self.activate()
        } else {
            self.stop();
            tracing::info!(pool = %self.settings.name, "pool stopped");
            Ok(())
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn set_flushing(&self, flushing: bool) {
        self.flushing.store(flushing, Ordering::Release);
        if let Some(port) = self.port() {
            port.set_flushing(flushing);
        }
    }

    fn acquire_buffer(&self, params: AcquireParams) -> Result<PoolBuffer> {
        if self.flushing.load(Ordering::Acquire) || !self.is_active() {
            tracing::debug!(pool = %self.settings.name, "we are flushing");
            return Err(Error::Flushing);
        }

        let (port, foreign) = {
            let state = lock(&self.state);
            let port = state.port.clone().ok_or(Error::NotAttached)?;
            (port, state.foreign_pool.is_some())
        };

        let buffer = match port.definition().direction {
            Direction::Output => self.acquire_output(foreign)?,
            Direction::Input => self.acquire_input(port.as_ref(), params)?,
        };

        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_acquired();
        Ok(buffer)
    }

    fn release_buffer(&self, buffer: PoolBuffer) {
        if !buffer.mark_returned() {
            tracing::trace!(pool = %self.settings.name, "buffer already returned");
            return;
        }
        self.metrics.record_released();

        if !self.is_active() {
            return;
        }
        let (port, deactivated) = {
            let state = lock(&self.state);
            (state.port.clone(), state.deactivated)
        };
        let (Some(port), Some(hardware)) = (port, buffer.hardware_buffer()) else {
            tracing::warn!(pool = %self.settings.name, "released buffer is not bound to a port");
            return;
        };

        match port.definition().direction {
            Direction::Output if !hardware.is_used() && !deactivated => {
                if let Err(e) = port.release_buffer(&hardware) {
                    tracing::error!(
                        pool = %self.settings.name,
                        index = hardware.index(),
                        error = %e,
                        "failed to release output buffer to component"
                    );
                    self.metrics.record_release_error();
                    self.post_error(&Error::Omx(e));
                }
            }
            Direction::Input => port.requeue_buffer(&hardware),
            Direction::Output => {}
        }
    }

    fn stats(&self) -> PoolStats {
        let buffers = lock(&self.buffers);
        let in_use = buffers.iter().filter(|b| b.is_outstanding()).count();
        PoolStats {
            capacity: buffers.len(),
            available: buffers.len() - in_use,
            in_use,
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for OmxBufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OmxBufferPool")
            .field("name", &self.settings.name)
            .field("mode", &self.settings.mode)
            .field("active", &self.is_active())
            .field("cursor", &self.current_buffer_index())
            .field("buffers", &lock(&self.buffers).len())
            .finish_non_exhaustive()
    }
}
