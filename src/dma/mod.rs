//! Zero-copy bridge between hardware physical memory and DMA-BUF.
//!
//! The platform memory manager turns a physical region into a DMA-BUF
//! descriptor (export) and a DMA-BUF descriptor into the physical region
//! behind it (import). Both mappings must be ended exactly once; the guards
//! in this module tie that to the lifetime of the memory they describe:
//!
//! | Mapping | Held by | Ended when |
//! |---------|---------|------------|
//! | export  | [`ExportGuard`] inside a [`DmaBufMemory`](crate::memory::DmaBufMemory) | last clone of the memory drops |
//! | import  | [`ImportRecord`] cached on a [`DmaBufMemory`](crate::memory::DmaBufMemory) | last clone of the memory drops |
//!
//! [`DmaBridge`] performs the page-alignment arithmetic and plane lookup;
//! [`EmulatedMemoryManager`] stands in for the kernel driver.

mod bridge;
mod emulated;
mod mmngr;

pub use bridge::DmaBridge;
pub use emulated::EmulatedMemoryManager;
pub use mmngr::{
    Export, ExportGuard, ExportId, Import, ImportId, ImportRecord, MemoryManager, MmngrError,
};
