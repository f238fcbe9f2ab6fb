//! Contracts of the hardware component and its ports.

use super::{ComponentState, HardwareBuffer, OmxError, Param, PortDefinition, WaitPolicy};
use std::sync::Arc;

/// Outcome of acquiring a buffer from a port.
#[derive(Debug)]
pub enum PortAcquire {
    /// A buffer is available to the caller.
    Buffer(Arc<HardwareBuffer>),
    /// The port is flushing.
    Flushing,
    /// Nothing available and the caller asked not to wait.
    NoAvailable,
    /// The component reported an error.
    Error(OmxError),
}

/// One directional port of a hardware component.
///
/// Buffer completion happens on the component's own event thread; a port
/// implementation must make `acquire_buffer` with [`WaitPolicy::Wait`]
/// wake up when a buffer completes or the port starts flushing.
pub trait HardwarePort: Send + Sync {
    /// Port index.
    fn index(&self) -> u32;

    /// Current port definition.
    fn definition(&self) -> PortDefinition;

    /// Push a modified definition to the component.
    fn update_definition(&self, definition: &PortDefinition) -> Result<(), OmxError>;

    /// Buffers currently allocated on the port, in index order.
    fn buffers(&self) -> Vec<Arc<HardwareBuffer>>;

    /// Number of allocated buffers.
    fn buffer_count(&self) -> usize {
        self.buffers().len()
    }

    /// Acquire a buffer the hardware is done with.
    fn acquire_buffer(&self, wait: WaitPolicy) -> PortAcquire;

    /// Hand a buffer back to the hardware for filling or emptying.
    fn release_buffer(&self, buffer: &Arc<HardwareBuffer>) -> Result<(), OmxError>;

    /// Make an input buffer available to upstream again without submitting it.
    fn requeue_buffer(&self, buffer: &Arc<HardwareBuffer>);

    /// Allocate the buffer batch described by the port definition.
    fn allocate_buffers(&self) -> Result<(), OmxError>;

    /// Free all buffers.
    fn deallocate_buffers(&self) -> Result<(), OmxError>;

    /// Tell the port its buffers are managed by an external pool.
    fn set_using_pool(&self, using: bool);

    /// Whether an external pool manages the buffers.
    fn using_pool(&self) -> bool;

    /// Enter or leave flushing; entering wakes blocked acquires.
    fn set_flushing(&self, flushing: bool);

    /// Whether the port is flushing.
    fn is_flushing(&self) -> bool;
}

/// A hardware codec component.
pub trait Component: Send + Sync {
    /// Component name, e.g. `OMX.RENESAS.AUDIO.DECODER.AAC`.
    fn name(&self) -> &str;

    /// Current state.
    fn state(&self) -> ComponentState;

    /// Read a parameter. The variant and port index of `param` select what is read.
    fn get_parameter(&self, param: &mut Param) -> Result<(), OmxError>;

    /// Write a parameter.
    fn set_parameter(&self, param: &Param) -> Result<(), OmxError>;
}
