//! Hardware component side: ports, buffers, parameters.
//!
//! The component driver itself is out of reach of this crate; it is
//! consumed through two traits:
//!
//! - [`HardwarePort`]: buffer count, blocking acquire, release/requeue,
//!   batch allocation and the "using external pool" flag
//! - [`Component`]: typed parameter reads and writes
//!
//! [`sim`] provides software implementations of both.

mod buffer;
mod error;
mod params;
mod port;
pub mod sim;
mod types;

pub use buffer::{BufferBacking, DecodeResult, HardwareBuffer};
pub use error::OmxError;
pub use params::{
    AacDownmixParam, AacParam, AacStreamFormat, HwipSelectParam, OutputUnit, OutputUnitParam,
    Param, ParamIndex, PcmParam, ProfileLevelParam, Vp8MiscParam, Vp8Param, WmaParam,
};
pub use port::{Component, HardwarePort, PortAcquire};
pub use types::{
    AudioCoding, AudioPortFormat, ColorFormat, ComponentState, Direction, PortDefinition,
    PortDomain, VideoCoding, VideoPortFormat, WaitPolicy,
};
