//! Software component and port.
//!
//! These model the asynchronous hardware side closely enough to drive the
//! buffer pool and the format translators without a device: buffers are
//! allocated from real memory (heap or memfd), completion events are
//! injected through [`SimPort::complete_fill`] and [`SimPort::complete_empty`],
//! and a blocking acquire waits on a condition variable exactly like a port
//! waiting for its event thread.

use super::{
    BufferBacking, Component, ComponentState, DecodeResult, Direction, HardwareBuffer,
    HardwarePort, OmxError, Param, ParamIndex, PortAcquire, PortDefinition, WaitPolicy,
};
use crate::memory::SystemSegment;
use crate::sync::{lock, wait};
use rustix::fs::{MemfdFlags, ftruncate, memfd_create};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

const PHYS_BUFFER_ALIGN: u64 = 4096;

/// How a [`SimPort`] backs its buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimBacking {
    /// Heap memory, host mapped.
    System,
    /// One memfd per buffer, handed out as a DMA-BUF descriptor.
    DmaFd,
    /// Heap memory plus a physical address per buffer starting at `base`.
    Physical {
        /// Physical address of buffer 0.
        base: u64,
    },
}

#[derive(Default)]
struct PortState {
    buffers: Vec<Arc<HardwareBuffer>>,
    ready: VecDeque<usize>,
    flushing: bool,
    using_pool: bool,
    fail_allocation: Option<OmxError>,
    fail_release: Option<OmxError>,
    releases: usize,
    requeues: usize,
}

/// A software hardware port.
pub struct SimPort {
    definition: Mutex<PortDefinition>,
    backing: SimBacking,
    state: Mutex<PortState>,
    cond: Condvar,
}

impl SimPort {
    /// Create a port with the given definition. No buffers are allocated yet.
    pub fn new(definition: PortDefinition, backing: SimBacking) -> Self {
        Self {
            definition: Mutex::new(definition),
            backing,
            state: Mutex::new(PortState::default()),
            cond: Condvar::new(),
        }
    }

    /// Buffer at `index`.
    pub fn buffer(&self, index: usize) -> Option<Arc<HardwareBuffer>> {
        lock(&self.state).buffers.get(index).cloned()
    }

    /// Hardware finished filling an output buffer.
    pub fn complete_fill(&self, index: usize, offset: usize, len: usize) -> Result<(), OmxError> {
        let mut state = lock(&self.state);
        let buffer = state
            .buffers
            .get(index)
            .cloned()
            .ok_or(OmxError::BadParameter)?;
        if !buffer.is_used() {
            return Err(OmxError::IncorrectStateOperation);
        }
        buffer.set_filled(offset, len);
        buffer.set_used(false);
        state.ready.push_back(index);
        self.cond.notify_one();
        Ok(())
    }

    /// Hardware finished consuming an input buffer.
    pub fn complete_empty(&self, index: usize) -> Result<(), OmxError> {
        let mut state = lock(&self.state);
        let buffer = state
            .buffers
            .get(index)
            .cloned()
            .ok_or(OmxError::BadParameter)?;
        if !buffer.is_used() {
            return Err(OmxError::IncorrectStateOperation);
        }
        buffer.set_used(false);
        buffer.set_filled(0, 0);
        state.ready.push_back(index);
        self.cond.notify_one();
        Ok(())
    }

    /// Attach a decode result to a buffer.
    pub fn set_decode_result(&self, index: usize, result: Option<DecodeResult>) {
        if let Some(buffer) = self.buffer(index) {
            buffer.set_decode_result(result);
        }
    }

    /// Make the next `allocate_buffers` fail with `error`.
    pub fn fail_allocation(&self, error: Option<OmxError>) {
        lock(&self.state).fail_allocation = error;
    }

    /// Make every `release_buffer` fail with `error`.
    pub fn fail_release(&self, error: Option<OmxError>) {
        lock(&self.state).fail_release = error;
    }

    /// Number of successful `release_buffer` calls.
    pub fn release_count(&self) -> usize {
        lock(&self.state).releases
    }

    /// Number of `requeue_buffer` calls that made a buffer available.
    pub fn requeue_count(&self) -> usize {
        lock(&self.state).requeues
    }

    /// Number of buffers waiting to be acquired.
    pub fn ready_count(&self) -> usize {
        lock(&self.state).ready.len()
    }

    fn make_buffer(
        &self,
        index: usize,
        definition: &PortDefinition,
    ) -> crate::Result<HardwareBuffer> {
        let size = definition.buffer_size as usize;
        let align = (definition.buffer_alignment as usize).max(1);
        let buffer = match self.backing {
            SimBacking::System | SimBacking::Physical { .. } => {
                let segment = SystemSegment::with_alignment(size, align)?;
                HardwareBuffer::new(
                    index,
                    definition.index,
                    definition.direction,
                    size,
                    BufferBacking::SystemMemory(Arc::new(segment)),
                )
            }
            SimBacking::DmaFd => {
                let fd = memfd_create(format!("omx-sim-{index}"), MemfdFlags::CLOEXEC)?;
                ftruncate(&fd, size as u64)?;
                HardwareBuffer::new(
                    index,
                    definition.index,
                    definition.direction,
                    size,
                    BufferBacking::DmaBuffer { fd },
                )
            }
        };

        Ok(match self.backing {
            SimBacking::Physical { base } => {
                let pitch = (size as u64).div_ceil(PHYS_BUFFER_ALIGN) * PHYS_BUFFER_ALIGN;
                buffer.with_phys_addr(base + pitch * index as u64)
            }
            _ => buffer,
        })
    }
}

impl HardwarePort for SimPort {
    fn index(&self) -> u32 {
        lock(&self.definition).index
    }

    fn definition(&self) -> PortDefinition {
        *lock(&self.definition)
    }

    fn update_definition(&self, definition: &PortDefinition) -> Result<(), OmxError> {
        let mut current = lock(&self.definition);
        if definition.index != current.index || definition.direction != current.direction {
            return Err(OmxError::BadPortIndex);
        }
        *current = *definition;
        Ok(())
    }

    fn buffers(&self) -> Vec<Arc<HardwareBuffer>> {
        lock(&self.state).buffers.clone()
    }

    fn buffer_count(&self) -> usize {
        lock(&self.state).buffers.len()
    }

    fn acquire_buffer(&self, wait_policy: WaitPolicy) -> PortAcquire {
        let mut state = lock(&self.state);
        loop {
            if state.flushing {
                return PortAcquire::Flushing;
            }
            if let Some(index) = state.ready.pop_front() {
                return match state.buffers.get(index) {
                    Some(buffer) => PortAcquire::Buffer(buffer.clone()),
                    None => PortAcquire::Error(OmxError::Undefined),
                };
            }
            if wait_policy == WaitPolicy::DontWait {
                return PortAcquire::NoAvailable;
            }
            state = wait(&self.cond, state);
        }
    }

    fn release_buffer(&self, buffer: &Arc<HardwareBuffer>) -> Result<(), OmxError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_release {
            return Err(err);
        }
        if buffer.is_used() {
            return Err(OmxError::IncorrectStateOperation);
        }
        if buffer.direction() == Direction::Output {
            buffer.set_filled(0, 0);
        }
        buffer.set_used(true);
        state.ready.retain(|&i| i != buffer.index());
        state.releases += 1;
        Ok(())
    }

    fn requeue_buffer(&self, buffer: &Arc<HardwareBuffer>) {
        let mut state = lock(&self.state);
        let index = buffer.index();
        if buffer.is_used() || state.ready.contains(&index) {
            return;
        }
        buffer.set_filled(0, 0);
        state.ready.push_back(index);
        state.requeues += 1;
        self.cond.notify_one();
    }

    fn allocate_buffers(&self) -> Result<(), OmxError> {
        let definition = self.definition();
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_allocation.take() {
            return Err(err);
        }
        if !state.buffers.is_empty() {
            return Err(OmxError::IncorrectStateOperation);
        }

        let mut buffers = Vec::with_capacity(definition.buffer_count_actual as usize);
        for index in 0..definition.buffer_count_actual as usize {
            let buffer = self.make_buffer(index, &definition).map_err(|e| {
                tracing::error!(
                    port = definition.index,
                    index,
                    error = %e,
                    "buffer allocation failed"
                );
                OmxError::InsufficientResources
            })?;
            buffers.push(Arc::new(buffer));
        }

        state.ready = match definition.direction {
            Direction::Input => (0..buffers.len()).collect(),
            Direction::Output => VecDeque::new(),
        };
        state.buffers = buffers;
        Ok(())
    }

    fn deallocate_buffers(&self) -> Result<(), OmxError> {
        let mut state = lock(&self.state);
        state.buffers.clear();
        state.ready.clear();
        Ok(())
    }

    fn set_using_pool(&self, using: bool) {
        lock(&self.state).using_pool = using;
    }

    fn using_pool(&self) -> bool {
        lock(&self.state).using_pool
    }

    fn set_flushing(&self, flushing: bool) {
        lock(&self.state).flushing = flushing;
        self.cond.notify_all();
    }

    fn is_flushing(&self) -> bool {
        lock(&self.state).flushing
    }
}

/// A software component storing parameters in memory.
pub struct SimComponent {
    name: String,
    state: Mutex<ComponentState>,
    params: Mutex<HashMap<(ParamIndex, Option<u32>), Param>>,
    rejections: Mutex<HashMap<ParamIndex, OmxError>>,
    writes: Mutex<Vec<Param>>,
}

impl SimComponent {
    /// Create a component in the Loaded state with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(ComponentState::Loaded),
            params: Mutex::new(HashMap::new()),
            rejections: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Seed a parameter so it can be read back.
    pub fn with_parameter(self, param: Param) -> Self {
        lock(&self.params).insert((param.index(), param.port_index()), param);
        self
    }

    /// Change the component state.
    pub fn set_state(&self, state: ComponentState) {
        *lock(&self.state) = state;
    }

    /// Make writes of `index` fail with `error`, or accept them again with `None`.
    pub fn reject_parameter(&self, index: ParamIndex, error: Option<OmxError>) {
        let mut rejections = lock(&self.rejections);
        match error {
            Some(err) => rejections.insert(index, err),
            None => rejections.remove(&index),
        };
    }

    /// Stored value of a parameter.
    pub fn parameter(&self, index: ParamIndex, port_index: Option<u32>) -> Option<Param> {
        lock(&self.params).get(&(index, port_index)).copied()
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<Param> {
        lock(&self.writes).clone()
    }
}

impl Component for SimComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ComponentState {
        *lock(&self.state)
    }

    fn get_parameter(&self, param: &mut Param) -> Result<(), OmxError> {
        match lock(&self.params).get(&(param.index(), param.port_index())) {
            Some(stored) => {
                *param = *stored;
                Ok(())
            }
            None => Err(OmxError::UnsupportedIndex),
        }
    }

    fn set_parameter(&self, param: &Param) -> Result<(), OmxError> {
        if let Some(err) = lock(&self.rejections).get(&param.index()) {
            return Err(*err);
        }
        lock(&self.params).insert((param.index(), param.port_index()), *param);
        lock(&self.writes).push(*param);
        Ok(())
    }
}
