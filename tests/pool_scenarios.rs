//! Integration tests for the hardware buffer pool.
//!
//! These tests drive an [`OmxBufferPool`] against simulated ports and verify:
//! - Buffers are bound to hardware buffers in index order
//! - Configuration limits are enforced at activation
//! - Output buffers cycle between the hardware and the consumer
//! - Input acquire blocks, fails fast, and wakes on flush as requested
//! - Buffers supplied by another pool are adopted and handed back
//! - DMA-BUF descriptors from the port are wrapped without copies
//! - Physical addresses survive a dynamic resolution change

use omxbridge::caps::{CAPS_FEATURE_MEMORY_DMABUF, Caps};
use omxbridge::dma::{DmaBridge, EmulatedMemoryManager};
use omxbridge::error::Error;
use omxbridge::memory::{MemoryType, SystemMemory, SystemSegment};
use omxbridge::omx::sim::{SimBacking, SimComponent, SimPort};
use omxbridge::omx::{
    ColorFormat, Direction, HardwarePort, OmxError, PortDefinition, VideoCoding, VideoPortFormat,
};
use omxbridge::pool::{
    AcquireParams, BUFFER_POOL_OPTION_VIDEO_META, BufferMode, BufferOwner, BufferPool,
    DmaStrategy, ForeignPool, ForeignPoolHandle, OmxBufferPool, PoolBuffer, PoolConfig,
    PoolOwner, PoolSettings,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

struct TestOwner {
    port: Arc<SimPort>,
    errors: Mutex<Vec<Option<u32>>>,
    dynamic: AtomicBool,
}

impl TestOwner {
    fn new(port: &Arc<SimPort>) -> Arc<Self> {
        Arc::new(Self {
            port: port.clone(),
            errors: Mutex::new(Vec::new()),
            dynamic: AtomicBool::new(false),
        })
    }

    fn errors(&self) -> Vec<Option<u32>> {
        self.errors.lock().unwrap().clone()
    }
}

impl PoolOwner for TestOwner {
    fn allocate_buffers(&self, _pool: &OmxBufferPool) -> bool {
        self.port.allocate_buffers().is_ok()
    }

    fn post_error(&self, error: &Error) {
        self.errors.lock().unwrap().push(error.omx_code());
    }

    fn dynamic_change(&self) -> bool {
        self.dynamic.load(Ordering::Relaxed)
    }
}

/// A pool that lends its buffers out and counts what comes back.
struct LendingPool {
    returned: Mutex<Vec<PoolBuffer>>,
}

impl ForeignPool for LendingPool {
    fn name(&self) -> &str {
        "upstream"
    }

    fn reclaim(&self, buffer: PoolBuffer) {
        self.returned.lock().unwrap().push(buffer);
    }
}

fn nv12_output(
    width: u32,
    height: u32,
    stride: i32,
    count: u32,
    backing: SimBacking,
) -> Arc<SimPort> {
    let format = VideoPortFormat {
        frame_width: width,
        frame_height: height,
        stride,
        slice_height: height,
        compression: VideoCoding::Unused,
        color_format: ColorFormat::Yuv420SemiPlanar,
        ..VideoPortFormat::default()
    };
    let size = stride.unsigned_abs() * height * 3 / 2;
    let def = PortDefinition::video(1, Direction::Output, format).with_buffers(count, size, 0);
    Arc::new(SimPort::new(def, backing))
}

fn h264_input(count: u32) -> Arc<SimPort> {
    let format = VideoPortFormat {
        frame_width: 640,
        frame_height: 480,
        compression: VideoCoding::Avc,
        ..VideoPortFormat::default()
    };
    let def = PortDefinition::video(0, Direction::Input, format).with_buffers(count, 65536, 0);
    Arc::new(SimPort::new(def, SimBacking::System))
}

fn nv12_caps(width: i32, height: i32) -> Caps {
    Caps::builder("video/x-raw")
        .field("format", "NV12")
        .field("width", width)
        .field("height", height)
        .build()
}

/// Route pool logs to the test output; `RUST_LOG` overrides the filter.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omxbridge=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn make_pool(port: &Arc<SimPort>, mode: BufferMode) -> (Arc<TestOwner>, Arc<OmxBufferPool>) {
    init_tracing();
    let owner = TestOwner::new(port);
    let pool = OmxBufferPool::new(
        &owner,
        Arc::new(SimComponent::new("OMX.RENESAS.VIDEO.DECODER.H264")),
        port.clone(),
        PoolSettings::new("omxh264dec-out").with_mode(mode),
    );
    (owner, pool)
}

/// Hand every output buffer to the hardware, as the element does after start.
fn queue_all(port: &SimPort) {
    for hw in port.buffers() {
        port.release_buffer(&hw).unwrap();
    }
}

// ============================================================================
// Activation
// ============================================================================

#[test]
fn test_buffers_bound_in_index_order() {
    let port = nv12_output(640, 480, 640, 4, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);

    let config = PoolConfig::new(nv12_caps(640, 480), 460_800, 4, 4)
        .with_option(BUFFER_POOL_OPTION_VIDEO_META);
    pool.set_config(config).unwrap();
    pool.set_active(true).unwrap();

    let buffers = pool.buffers();
    assert_eq!(buffers.len(), 4);
    for (i, buffer) in buffers.iter().enumerate() {
        let hw = buffer.hardware_buffer().unwrap();
        assert_eq!(hw.index(), i);
        assert!(Arc::ptr_eq(&hw, &port.buffer(i).unwrap()));

        let meta = buffer.video_meta().unwrap();
        assert_eq!(meta.n_planes, 2);
        assert_eq!(&meta.offset[..2], &[0, 307_200]);
        assert_eq!(&meta.stride[..2], &[640, 640]);
    }
    assert!(!pool.needs_copy());
    assert_eq!(pool.current_buffer_index(), 0);
    assert!(port.using_pool());

    let stats = pool.stats();
    assert_eq!(stats.capacity, 4);
    assert_eq!(stats.available, 4);
    assert_eq!(stats.in_use, 0);
}

#[test]
fn test_max_above_min_fails_activation() {
    let port = nv12_output(640, 480, 640, 4, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);

    pool.set_config(PoolConfig::new(nv12_caps(640, 480), 460_800, 4, 8)).unwrap();
    assert_eq!(pool.config().map(|c| (c.min, c.max)), Some((4, 4)));

    let err = pool.set_active(true).unwrap_err();
    assert!(matches!(err, Error::MaxExceedsMin { min: 4, max: 8 }));
    assert!(!pool.is_active());
    assert_eq!(pool.stats().capacity, 0);
    assert_eq!(port.buffer_count(), 0);
    assert!(!port.using_pool());
}

#[test]
fn test_config_without_caps_is_rejected() {
    let port = nv12_output(640, 480, 640, 2, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);

    let mut config = PoolConfig::new(nv12_caps(640, 480), 460_800, 2, 2);
    config.caps = None;
    assert!(matches!(pool.set_config(config), Err(Error::NoCaps)));
    assert!(pool.config().is_none());
}

#[test]
fn test_unparseable_geometry_keeps_previous_config() {
    let port = nv12_output(640, 480, 640, 2, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);

    pool.set_config(PoolConfig::new(nv12_caps(640, 480), 460_800, 2, 2)).unwrap();
    let before = pool.config();

    let no_width = Caps::builder("video/x-raw")
        .field("format", "NV12")
        .field("height", 480)
        .build();
    assert!(matches!(
        pool.set_config(PoolConfig::new(no_width, 460_800, 3, 3)),
        Err(Error::InvalidVideoCaps(_))
    ));
    assert_eq!(pool.config(), before);

    pool.set_active(true).unwrap();
    assert_eq!(pool.stats().capacity, 2);
}

#[test]
fn test_concurrent_activation_binds_each_buffer_once() {
    for _ in 0..50 {
        let port = nv12_output(64, 32, 64, 4, SimBacking::System);
        let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);
        pool.set_config(PoolConfig::new(nv12_caps(64, 32), 3072, 4, 4)).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let pool = pool.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    pool.set_active(true)
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert!(pool.is_active());
        assert_eq!(pool.stats().capacity, 4);
        assert_eq!(port.buffer_count(), 4);
        let bound: HashSet<usize> = pool
            .buffers()
            .iter()
            .map(|b| b.hardware_buffer().unwrap().index())
            .collect();
        assert_eq!(bound.len(), 4);
    }
}

#[test]
fn test_stride_mismatch_needs_copy() {
    let port = nv12_output(640, 480, 768, 2, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);

    pool.set_config(PoolConfig::new(nv12_caps(640, 480), 552_960, 2, 2)).unwrap();
    pool.set_active(true).unwrap();
    assert!(pool.needs_copy());

    let hw = port.buffer(0).unwrap();
    let buffer = pool.acquire_for(&hw).unwrap();
    let meta = buffer.video_meta().unwrap();
    assert_eq!(meta.stride[0], 768);
    assert_eq!(meta.offset[1], 768 * 480);
    pool.release_buffer(buffer);
}

#[test]
fn test_failed_allocation_keeps_port_clean() {
    let port = nv12_output(640, 480, 640, 2, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);
    port.fail_allocation(Some(OmxError::InsufficientResources));

    pool.set_config(PoolConfig::new(nv12_caps(640, 480), 460_800, 2, 2)).unwrap();
    assert!(matches!(
        pool.set_active(true),
        Err(Error::AllocateFailed { port: 1 })
    ));
    assert!(!port.using_pool());

    // The configuration survives a failed activation.
    pool.set_active(true).unwrap();
    assert_eq!(pool.stats().capacity, 2);
}

// ============================================================================
// Output cycle
// ============================================================================

#[test]
fn test_output_fill_acquire_release_cycle() {
    let port = nv12_output(640, 480, 640, 4, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);
    pool.set_config(PoolConfig::new(nv12_caps(640, 480), 460_800, 4, 4)).unwrap();
    pool.set_active(true).unwrap();
    queue_all(&port);
    let queued = port.release_count();

    port.complete_fill(2, 16, 1000).unwrap();
    let hw = port.buffer(2).unwrap();
    let buffer = pool.acquire_for(&hw).unwrap();

    let memory = buffer.memory(0).unwrap();
    assert_eq!(memory.offset(), 16);
    assert_eq!(memory.size(), 1000);
    assert_eq!(pool.stats().in_use, 1);
    assert!(pool.find_buffer(&hw).is_some_and(|b| PoolBuffer::ptr_eq(&b, &buffer)));

    pool.release_buffer(buffer);
    assert!(hw.is_used());
    assert_eq!(port.release_count(), queued + 1);
    assert_eq!(pool.stats().in_use, 0);
    assert_eq!(pool.stats().acquisitions, 1);
}

#[test]
fn test_acquire_of_queued_buffer_is_invariant_error() {
    let port = nv12_output(640, 480, 640, 2, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);
    pool.set_config(PoolConfig::new(nv12_caps(640, 480), 460_800, 2, 2)).unwrap();
    pool.set_active(true).unwrap();
    queue_all(&port);

    let err = pool.acquire_for(&port.buffer(1).unwrap()).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(pool.stats().in_use, 0);
}

#[test]
fn test_release_is_idempotent() {
    let port = nv12_output(640, 480, 640, 2, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);
    pool.set_config(PoolConfig::new(nv12_caps(640, 480), 460_800, 2, 2)).unwrap();
    pool.set_active(true).unwrap();

    let buffer = pool.acquire_for(&port.buffer(0).unwrap()).unwrap();
    pool.release_buffer(buffer.clone());
    pool.release_buffer(buffer);
    assert_eq!(port.release_count(), 1);
}

#[test]
fn test_each_buffer_has_one_holder() {
    let port = nv12_output(320, 240, 320, 4, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);
    pool.set_config(PoolConfig::new(nv12_caps(320, 240), 115_200, 4, 4)).unwrap();
    pool.set_active(true).unwrap();
    queue_all(&port);

    let mut held: Vec<PoolBuffer> = Vec::new();
    for round in 0..12 {
        let index = round % 4;
        if let Some(pos) = held
            .iter()
            .position(|b| b.hardware_buffer().is_some_and(|hw| hw.index() == index))
        {
            pool.release_buffer(held.remove(pos));
        }
        port.complete_fill(index, 0, 100).unwrap();
        held.push(pool.acquire_for(&port.buffer(index).unwrap()).unwrap());

        // A buffer is either queued with the hardware or held downstream.
        let held_indices: HashSet<usize> = held
            .iter()
            .filter_map(|b| b.hardware_buffer().map(|hw| hw.index()))
            .collect();
        assert_eq!(held_indices.len(), held.len());
        for hw in port.buffers() {
            assert_ne!(hw.is_used(), held_indices.contains(&hw.index()));
        }
        let stats = pool.stats();
        assert_eq!(stats.in_use, held.len());
        assert_eq!(stats.available + stats.in_use, stats.capacity);
    }
}

#[test]
fn test_release_failure_reaches_owner() {
    let port = nv12_output(640, 480, 640, 2, SimBacking::System);
    let (owner, pool) = make_pool(&port, BufferMode::SystemMemory);
    pool.set_config(PoolConfig::new(nv12_caps(640, 480), 460_800, 2, 2)).unwrap();
    pool.set_active(true).unwrap();

    let buffer = pool.acquire_for(&port.buffer(0).unwrap()).unwrap();
    port.fail_release(Some(OmxError::Hardware));
    pool.release_buffer(buffer);

    assert_eq!(owner.errors(), vec![Some(OmxError::Hardware.code())]);
    assert_eq!(pool.stats().in_use, 0);
}

#[test]
fn test_acquire_when_inactive_is_flushing() {
    let port = nv12_output(640, 480, 640, 2, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);
    let err = pool.acquire_buffer(AcquireParams::default()).unwrap_err();
    assert!(err.is_flushing());
}

// ============================================================================
// Input flow
// ============================================================================

fn input_pool(count: u32) -> (Arc<SimPort>, Arc<OmxBufferPool>) {
    let port = h264_input(count);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);
    let caps = Caps::builder("video/x-h264").field("stream-format", "byte-stream").build();
    pool.set_config(PoolConfig::new(caps, 65536, count, count)).unwrap();
    // The owner is only needed to allocate the port buffers.
    pool.set_active(true).unwrap();
    (port, pool)
}

#[test]
fn test_input_dont_wait_returns_immediately() {
    let (_port, pool) = input_pool(2);
    assert!(pool.options().is_empty());

    let a = pool.acquire_buffer(AcquireParams::dont_wait()).unwrap();
    let b = pool.acquire_buffer(AcquireParams::dont_wait()).unwrap();
    assert!(!PoolBuffer::ptr_eq(&a, &b));

    let err = pool.acquire_buffer(AcquireParams::dont_wait()).unwrap_err();
    assert!(matches!(err, Error::WouldBlock));
}

#[test]
fn test_input_release_requeues() {
    let (port, pool) = input_pool(2);

    let a = pool.acquire_buffer(AcquireParams::dont_wait()).unwrap();
    let index = a.hardware_buffer().unwrap().index();
    pool.release_buffer(a.clone());
    pool.release_buffer(a);
    assert_eq!(port.requeue_count(), 1);
    assert_eq!(port.ready_count(), 2);

    // The hardware consumes a buffer and hands it back.
    let b = pool.acquire_buffer(AcquireParams::dont_wait()).unwrap();
    let hw = b.hardware_buffer().unwrap();
    assert_ne!(hw.index(), index);
    hw.set_used(true);
    pool.release_buffer(b);
    assert_eq!(port.requeue_count(), 1);
    port.complete_empty(hw.index()).unwrap();
    assert_eq!(port.ready_count(), 2);
}

#[test]
fn test_blocked_input_acquire_wakes_on_release() {
    let (_port, pool) = input_pool(1);
    let held = pool.acquire_buffer(AcquireParams::default()).unwrap();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.acquire_buffer(AcquireParams::default()))
    };
    thread::sleep(Duration::from_millis(50));
    pool.release_buffer(held.clone());

    let got = waiter.join().unwrap().unwrap();
    assert!(PoolBuffer::ptr_eq(&got, &held));
}

#[test]
fn test_flush_wakes_blocked_acquire() {
    let (port, pool) = input_pool(1);
    let _held = pool.acquire_buffer(AcquireParams::default()).unwrap();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.acquire_buffer(AcquireParams::default()))
    };
    thread::sleep(Duration::from_millis(50));
    pool.set_flushing(true);

    let err = waiter.join().unwrap().unwrap_err();
    assert!(err.is_flushing());
    assert!(pool.acquire_buffer(AcquireParams::dont_wait()).unwrap_err().is_flushing());

    pool.set_flushing(false);
    assert!(matches!(
        pool.acquire_buffer(AcquireParams::dont_wait()),
        Err(Error::WouldBlock)
    ));
    assert_eq!(port.ready_count(), 0);
}

// ============================================================================
// Foreign pools
// ============================================================================

#[test]
fn test_foreign_buffers_are_adopted_and_returned() {
    let port = nv12_output(64, 32, 64, 2, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);

    let lender = Arc::new(LendingPool {
        returned: Mutex::new(Vec::new()),
    });
    let handle: ForeignPoolHandle = lender.clone();
    let lent: Vec<PoolBuffer> = (0..2)
        .map(|_| {
            let segment = Arc::new(SystemSegment::new(3072).unwrap());
            PoolBuffer::new()
                .with_memory(SystemMemory::new(segment))
                .with_owner(BufferOwner::OwnedByForeignPool(handle.clone()))
        })
        .collect();

    pool.set_foreign_buffers(handle.clone(), lent.clone()).unwrap();
    pool.set_config(PoolConfig::new(nv12_caps(64, 32), 3072, 2, 2)).unwrap();
    pool.set_active(true).unwrap();

    for (i, buffer) in pool.buffers().iter().enumerate() {
        assert!(PoolBuffer::ptr_eq(buffer, &lent[i]));
        assert!(matches!(buffer.owner(), BufferOwner::OwnedBySelf));
        assert_eq!(buffer.hardware_buffer().map(|hw| hw.index()), Some(i));
        assert!(buffer.memory(0).unwrap().is_no_share());
    }

    pool.set_active(false).unwrap();
    let returned = lender.returned.lock().unwrap();
    assert_eq!(returned.len(), 2);
    for buffer in returned.iter() {
        assert!(buffer.owner().is_foreign_pool(&handle));
        assert!(buffer.hardware_buffer().is_none());
        assert!(!buffer.memory(0).unwrap().is_no_share());
    }
}

#[test]
fn test_owned_memory_after_foreign_session() {
    let port = nv12_output(64, 32, 64, 2, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);

    let lender = Arc::new(LendingPool {
        returned: Mutex::new(Vec::new()),
    });
    let handle: ForeignPoolHandle = lender.clone();
    let lent: Vec<PoolBuffer> = (0..2)
        .map(|_| {
            let segment = Arc::new(SystemSegment::new(3072).unwrap());
            PoolBuffer::new()
                .with_memory(SystemMemory::new(segment))
                .with_owner(BufferOwner::OwnedByForeignPool(handle.clone()))
        })
        .collect();

    pool.set_foreign_buffers(handle, lent.clone()).unwrap();
    pool.set_config(PoolConfig::new(nv12_caps(64, 32), 3072, 2, 2)).unwrap();
    pool.set_active(true).unwrap();
    pool.set_active(false).unwrap();
    assert_eq!(lender.returned.lock().unwrap().len(), 2);

    // The next session builds its own memory over the hardware buffers.
    pool.set_config(PoolConfig::new(nv12_caps(64, 32), 3072, 2, 2)).unwrap();
    pool.set_active(true).unwrap();
    let buffers = pool.buffers();
    assert_eq!(buffers.len(), 2);
    for (i, buffer) in buffers.iter().enumerate() {
        assert!(!PoolBuffer::ptr_eq(buffer, &lent[i]));
        assert!(matches!(buffer.owner(), BufferOwner::OwnedBySelf));
        assert_eq!(buffer.memory(0).unwrap().memory_type(), MemoryType::Hardware);
    }

    pool.set_active(false).unwrap();
    assert_eq!(lender.returned.lock().unwrap().len(), 2);
}

// ============================================================================
// DMA-BUF descriptors
// ============================================================================

#[test]
fn test_native_descriptors_wrapped_per_buffer() {
    let port = nv12_output(64, 32, 64, 2, SimBacking::DmaFd);
    let (_owner, pool) = make_pool(&port, BufferMode::DmaBuf(DmaStrategy::NativeFd));

    pool.set_config(PoolConfig::new(nv12_caps(64, 32), 3072, 2, 2)).unwrap();
    pool.set_active(true).unwrap();

    for buffer in pool.buffers() {
        assert_eq!(buffer.n_memory(), 1);
        let memory = buffer.memory(0).unwrap();
        assert_eq!(memory.memory_type(), MemoryType::DmaBuf);
        let dmabuf = memory.as_dmabuf().unwrap();
        assert_eq!(dmabuf.maxsize(), 3072);
        // No DMA-BUF caps feature, so activation checked the memory maps.
        assert!(dmabuf.map().is_ok());
    }

    queue_all(&port);
    port.complete_fill(1, 16, 1000).unwrap();
    let buffer = pool.acquire_for(&port.buffer(1).unwrap()).unwrap();
    let memory = buffer.memory(0).unwrap();
    assert_eq!((memory.offset(), memory.size()), (16, 1000));
    let dmabuf = memory.as_dmabuf().unwrap();
    let mapping = dmabuf.map().unwrap();
    assert_eq!(mapping.region(dmabuf.offset(), dmabuf.size()).unwrap().len(), 1000);
    pool.release_buffer(buffer);
}

#[test]
fn test_native_descriptors_require_dma_backing() {
    let port = nv12_output(64, 32, 64, 2, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::DmaBuf(DmaStrategy::NativeFd));

    pool.set_config(PoolConfig::new(nv12_caps(64, 32), 3072, 2, 2)).unwrap();
    assert!(matches!(pool.set_active(true), Err(Error::NotMappable(_))));
    assert!(!pool.is_active());
    assert_eq!(pool.stats().capacity, 0);
    assert_eq!(port.buffer_count(), 0);
    assert!(!port.using_pool());
}

#[test]
fn test_foreign_buffers_must_carry_owner_tag() {
    let port = nv12_output(64, 32, 64, 2, SimBacking::System);
    let (_owner, pool) = make_pool(&port, BufferMode::SystemMemory);
    let handle: ForeignPoolHandle = Arc::new(LendingPool {
        returned: Mutex::new(Vec::new()),
    });

    let stray = PoolBuffer::new();
    assert!(matches!(
        pool.set_foreign_buffers(handle, vec![stray]),
        Err(Error::InvalidConfig(_))
    ));
}

// ============================================================================
// Dynamic resolution change
// ============================================================================

fn physical_pool(
    port: &Arc<SimPort>,
) -> (Arc<EmulatedMemoryManager>, Arc<TestOwner>, Arc<OmxBufferPool>) {
    let manager = Arc::new(EmulatedMemoryManager::with_page_size(4096));
    let bridge = DmaBridge::with_page_size(manager.clone(), 4096).unwrap();
    let (owner, pool) = make_pool(
        port,
        BufferMode::DmaBuf(DmaStrategy::PhysicalExport {
            bridge,
            multi_plane: true,
        }),
    );
    (manager, owner, pool)
}

fn dmabuf_caps() -> Caps {
    Caps::builder("video/x-raw")
        .field("format", "NV12")
        .field("width", 64)
        .field("height", 32)
        .feature(CAPS_FEATURE_MEMORY_DMABUF)
        .build()
}

fn export_bases(manager: &EmulatedMemoryManager) -> Vec<u64> {
    let mut bases: Vec<u64> = manager.export_regions().iter().map(|r| r.1).collect();
    bases.sort_unstable();
    bases
}

#[test]
fn test_dynamic_change_reuses_recorded_addresses() {
    let port = nv12_output(64, 32, 64, 2, SimBacking::Physical { base: 0x5000_0000 });
    let (manager, owner, pool) = physical_pool(&port);

    pool.set_config(PoolConfig::new(dmabuf_caps(), 3072, 2, 2)).unwrap();
    pool.set_active(true).unwrap();
    assert_eq!(manager.live_exports(), 4);
    let first = export_bases(&manager);
    assert_eq!(first, vec![0x5000_0000, 0x5000_0000, 0x5000_1000, 0x5000_1000]);

    let chroma = pool.buffers()[0].memory(1).unwrap();
    assert_eq!(chroma.offset(), 2048);
    assert_eq!(chroma.size(), 1024);
    drop(chroma);

    pool.set_active(false).unwrap();
    assert_eq!(manager.live_exports(), 0);

    owner.dynamic.store(true, Ordering::Relaxed);
    pool.set_config(PoolConfig::new(dmabuf_caps(), 3072, 2, 2)).unwrap();
    pool.set_active(true).unwrap();
    assert_eq!(export_bases(&manager), first);
}

#[test]
fn test_dynamic_change_without_record_fails() {
    let port = nv12_output(64, 32, 64, 2, SimBacking::Physical { base: 0x5000_0000 });
    let (manager, owner, pool) = physical_pool(&port);
    owner.dynamic.store(true, Ordering::Relaxed);

    pool.set_config(PoolConfig::new(dmabuf_caps(), 3072, 2, 2)).unwrap();
    assert!(matches!(
        pool.set_active(true),
        Err(Error::NoPhysicalAddress { index: 0 })
    ));
    assert!(!pool.is_active());
    assert_eq!(port.buffer_count(), 0);
    assert_eq!(manager.live_exports(), 0);
}
