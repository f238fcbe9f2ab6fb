//! In-process memory manager for tests and hosts without the platform driver.
//!
//! Exports are backed by anonymous memfds, so the descriptors they hand out
//! behave like real DMA-BUFs as far as mmap and fd passing go. Physical
//! addresses are bookkeeping only: each export or registered region records
//! the address it stands for, and imports resolve a descriptor back to that
//! address through its inode.

use super::{Export, ExportId, Import, ImportId, MemoryManager, MmngrError};
use crate::sync::lock;
use rustix::fs::MemfdFlags;
use std::collections::HashMap;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::Mutex;

type InodeKey = (u64, u64);

#[derive(Debug, Clone, Copy)]
struct Region {
    phys_addr: u64,
    size: usize,
}

#[derive(Debug, Clone, Copy)]
struct ExportEntry {
    region: Region,
    inode: InodeKey,
}

#[derive(Debug, Default)]
struct State {
    next_id: u32,
    exports: HashMap<u32, ExportEntry>,
    imports: HashMap<u32, Region>,
    regions: HashMap<InodeKey, Region>,
    fail_exports: bool,
    fail_imports: bool,
    export_end_failures: usize,
}

impl State {
    fn next_id(&mut self) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }
}

/// A [`MemoryManager`] that emulates the platform driver with memfds.
#[derive(Debug)]
pub struct EmulatedMemoryManager {
    state: Mutex<State>,
    page_size: usize,
}

impl EmulatedMemoryManager {
    /// Manager using the system page size.
    pub fn new() -> Self {
        Self::with_page_size(rustix::param::page_size())
    }

    /// Manager that requires exports aligned to `page_size`.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size,
        }
    }

    /// Create a descriptor standing for `size` bytes at `phys_addr`.
    ///
    /// Importing the returned descriptor resolves to `phys_addr`. Used to
    /// model buffers allocated by another device.
    pub fn register_physical(&self, phys_addr: u64, size: usize) -> Result<OwnedFd, MmngrError> {
        let fd = create_backing(size)?;
        let inode = inode_of(fd.as_fd())?;
        lock(&self.state)
            .regions
            .insert(inode, Region { phys_addr, size });
        Ok(fd)
    }

    /// Number of export mappings not yet ended.
    pub fn live_exports(&self) -> usize {
        lock(&self.state).exports.len()
    }

    /// Number of import mappings not yet ended.
    pub fn live_imports(&self) -> usize {
        lock(&self.state).imports.len()
    }

    /// Live exports as `(id, phys_addr, size)`, ordered by id.
    pub fn export_regions(&self) -> Vec<(ExportId, u64, usize)> {
        let state = lock(&self.state);
        let mut regions: Vec<_> = state
            .exports
            .iter()
            .map(|(&id, e)| (ExportId(id), e.region.phys_addr, e.region.size))
            .collect();
        regions.sort_by_key(|(id, _, _)| *id);
        regions
    }

    /// Number of `export_end` calls that named an unknown mapping.
    pub fn export_end_failures(&self) -> usize {
        lock(&self.state).export_end_failures
    }

    /// Make subsequent exports fail with [`MmngrError::NoMemory`].
    pub fn fail_exports(&self, fail: bool) {
        lock(&self.state).fail_exports = fail;
    }

    /// Make subsequent imports fail with [`MmngrError::Fatal`].
    pub fn fail_imports(&self, fail: bool) {
        lock(&self.state).fail_imports = fail;
    }
}

impl Default for EmulatedMemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager for EmulatedMemoryManager {
    fn export_start(&self, phys_addr: u64, size: usize) -> Result<Export, MmngrError> {
        if phys_addr & (self.page_size as u64 - 1) != 0 || size % self.page_size != 0 || size == 0
        {
            return Err(MmngrError::ParameterError);
        }
        if lock(&self.state).fail_exports {
            return Err(MmngrError::NoMemory);
        }

        let fd = create_backing(size)?;
        let inode = inode_of(fd.as_fd())?;
        let region = Region { phys_addr, size };

        let mut state = lock(&self.state);
        let id = state.next_id();
        state.exports.insert(id, ExportEntry { region, inode });
        state.regions.insert(inode, region);
        Ok(Export {
            id: ExportId(id),
            fd,
        })
    }

    fn export_end(&self, id: ExportId) -> Result<(), MmngrError> {
        let mut state = lock(&self.state);
        match state.exports.remove(&id.0) {
            Some(entry) => {
                state.regions.remove(&entry.inode);
                Ok(())
            }
            None => {
                state.export_end_failures += 1;
                Err(MmngrError::SequenceError)
            }
        }
    }

    fn import_start(&self, fd: BorrowedFd<'_>) -> Result<Import, MmngrError> {
        let inode = inode_of(fd)?;
        let mut state = lock(&self.state);
        if state.fail_imports {
            return Err(MmngrError::Fatal);
        }
        let region = *state
            .regions
            .get(&inode)
            .ok_or(MmngrError::ParameterError)?;
        let id = state.next_id();
        state.imports.insert(id, region);
        Ok(Import {
            id: ImportId(id),
            size: region.size,
            phys_addr: region.phys_addr,
        })
    }

    fn import_end(&self, id: ImportId) -> Result<(), MmngrError> {
        lock(&self.state)
            .imports
            .remove(&id.0)
            .map(|_| ())
            .ok_or(MmngrError::SequenceError)
    }
}

fn create_backing(size: usize) -> Result<OwnedFd, MmngrError> {
    let fd = rustix::fs::memfd_create("omxbridge-mmngr", MemfdFlags::CLOEXEC).map_err(|e| {
        tracing::warn!(error = %e, "memfd_create failed");
        MmngrError::NoMemory
    })?;
    rustix::fs::ftruncate(&fd, size as u64).map_err(|e| {
        tracing::warn!(error = %e, size, "ftruncate failed");
        MmngrError::NoMemory
    })?;
    Ok(fd)
}

fn inode_of(fd: BorrowedFd<'_>) -> Result<InodeKey, MmngrError> {
    let stat = rustix::fs::fstat(fd).map_err(|_| MmngrError::ParameterError)?;
    Ok((stat.st_dev as u64, stat.st_ino as u64))
}
