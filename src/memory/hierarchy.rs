//! Three cache levels over physical memory, plus address translation

use super::cache::CacheStore;
use super::main_memory::MemoryStore;
use super::mmu::PageTable;
use super::{Access, AccessType, Storage, StorageStats};
use crate::config::{SimConfig, LEVEL_NAMES};
use crate::error::{MemoryError, MemoryErrorKind, SimulatorResult};

/// A view of the storage chain starting at `caches[0]`.
/// Built for a single request; each level borrows the rest of the
/// chain as its lower storage.
pub struct Linked<'a> {
    pub caches: &'a mut [CacheStore],
    pub memory: &'a mut MemoryStore,
}

impl Storage for Linked<'_> {
    fn handle_request(
        &mut self,
        address: u64,
        buffer: &mut [u8],
        access_type: AccessType,
    ) -> SimulatorResult<Access> {
        match self.caches.split_first_mut() {
            Some((cache, rest)) => {
                let mut lower = Linked { caches: rest, memory: &mut *self.memory };
                cache.handle_request(address, buffer, access_type, &mut lower)
            }
            None => self.memory.handle_request(address, buffer, access_type),
        }
    }

    fn stats(&self) -> StorageStats {
        match self.caches.first() {
            Some(cache) => cache.stats(),
            None => self.memory.stats(),
        }
    }
}

/// Everything the CPU sees as memory
pub struct MemorySystem {
    /// L1, L2, LLC
    pub caches: Vec<CacheStore>,
    pub memory: MemoryStore,
    pub page_table: PageTable,
}

impl MemorySystem {
    pub fn from_config(config: &SimConfig) -> SimulatorResult<Self> {
        let mut caches = Vec::with_capacity(LEVEL_NAMES.len());
        for (&name, level) in LEVEL_NAMES.iter().zip(config.levels.iter()) {
            caches.push(CacheStore::make(name, level.cache, level.latency)?);
        }
        let mut memory = MemoryStore::default();
        memory.set_latency(config.memory_latency);

        Ok(Self { caches, memory, page_table: PageTable::default() })
    }

    /// The full chain, entered at L1
    pub fn l1(&mut self) -> Linked<'_> {
        Linked { caches: &mut self.caches, memory: &mut self.memory }
    }

    pub fn translate(&self, address: u64) -> SimulatorResult<u64> {
        self.page_table.translate(address)
    }

    /// Translates `address` and serves the request through L1
    pub fn access(
        &mut self,
        address: u64,
        buffer: &mut [u8],
        access_type: AccessType,
    ) -> SimulatorResult<Access> {
        let physical = self.translate(address)?;
        self.l1().handle_request(physical, buffer, access_type)
    }

    /// Little-endian read of `size` bytes, zero-extended.
    /// Returns the value and the cycles spent.
    pub fn read(&mut self, address: u64, size: usize) -> SimulatorResult<(u64, u64)> {
        let mut buffer = [0u8; 8];
        let bytes = buffer.get_mut(..size).ok_or(MemoryError::AccessError {
            address,
            kind: MemoryErrorKind::InvalidSize(size),
        })?;
        let access = self.access(address, bytes, AccessType::Read)?;
        Ok((u64::from_le_bytes(buffer), access.cycles))
    }

    /// Little-endian write of the low `size` bytes of `value`.
    /// Returns the cycles spent.
    pub fn write(&mut self, address: u64, value: u64, size: usize) -> SimulatorResult<u64> {
        let mut buffer = value.to_le_bytes();
        let bytes = buffer.get_mut(..size).ok_or(MemoryError::AccessError {
            address,
            kind: MemoryErrorKind::InvalidSize(size),
        })?;
        let access = self.access(address, bytes, AccessType::Write)?;
        Ok(access.cycles)
    }

    /// Maps `[address, address + len)` and copies `bytes` to its start.
    /// Skips the caches and their statistics.
    pub fn load_image(&mut self, address: u64, bytes: &[u8], len: u64) -> SimulatorResult<()> {
        self.page_table.allocate_range(address, len)?;
        for (i, &byte) in bytes.iter().enumerate() {
            let virtual_address = address + i as u64;
            let physical = self.translate(virtual_address)?;
            self.memory.load(physical, &[byte])?;
        }
        Ok(())
    }

    /// Reads memory as the program sees it, without touching the caches.
    /// Dirty cache lines are not consulted.
    pub fn peek(&self, address: u64, len: usize) -> SimulatorResult<Vec<u8>> {
        (0..len as u64)
            .map(|i| -> SimulatorResult<u8> {
                let physical = self.translate(address + i)?;
                Ok(self.memory.peek(physical, 1)?[0])
            })
            .collect()
    }

    pub fn reset_stats(&mut self) {
        for cache in &mut self.caches {
            cache.reset_stats();
        }
        self.memory.reset_stats();
    }
}
