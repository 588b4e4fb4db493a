//! Flat physical memory, the bottom of every storage chain

use super::{Access, AccessType, Storage, StorageLatency, StorageStats};
use crate::error::{MemoryError, MemoryErrorKind, SimulatorResult};

pub const PAGE_WIDTH: usize = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_WIDTH;
pub const FRAME_NUM: usize = 1024;
pub const MEM_SIZE: usize = PAGE_SIZE * FRAME_NUM;

/// Zero-initialized byte array with a fixed access latency.
/// Never misses.
pub struct MemoryStore {
    data: Vec<u8>,
    latency: StorageLatency,
    stats: StorageStats,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::make(MEM_SIZE, StorageLatency::new(0, 50))
    }
}

impl MemoryStore {
    pub fn make(size: usize, latency: StorageLatency) -> Self {
        Self { data: vec![0; size], latency, stats: StorageStats::default() }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn set_latency(&mut self, latency: StorageLatency) {
        self.latency = latency;
    }

    pub fn reset_stats(&mut self) {
        self.stats = StorageStats::default();
    }

    /// Copies bytes in without charging time or touching stats.
    /// Used when placing the program image.
    pub fn load(&mut self, address: u64, bytes: &[u8]) -> SimulatorResult<()> {
        let range = self.range(address, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Reads bytes without charging time or touching stats
    pub fn peek(&self, address: u64, len: usize) -> SimulatorResult<&[u8]> {
        let range = self.range(address, len)?;
        Ok(&self.data[range])
    }

    fn range(
        &self,
        address: u64,
        len: usize,
    ) -> SimulatorResult<std::ops::Range<usize>> {
        let end = address.checked_add(len as u64);
        match end {
            Some(end) if end <= self.data.len() as u64 => {
                Ok(address as usize..end as usize)
            }
            _ => Err(MemoryError::AccessError {
                address,
                kind: MemoryErrorKind::OutOfBounds,
            }
            .into()),
        }
    }
}

impl Storage for MemoryStore {
    fn handle_request(
        &mut self,
        address: u64,
        buffer: &mut [u8],
        access_type: AccessType,
    ) -> SimulatorResult<Access> {
        let range = self.range(address, buffer.len())?;

        let time = self.latency.hit_time();
        self.stats.access_time += time;
        self.stats.access_count += 1;

        match access_type {
            AccessType::Read => buffer.copy_from_slice(&self.data[range]),
            AccessType::Write => self.data[range].copy_from_slice(buffer),
        }

        Ok(Access::hit(time))
    }

    fn stats(&self) -> StorageStats {
        self.stats
    }
}
