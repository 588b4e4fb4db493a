//! Memory structure

pub mod cache;
pub mod hierarchy;
pub mod main_memory;
pub mod mmu;

use crate::error::SimulatorResult;

/// Anything that can serve a read or write request: the flat backing
/// memory, or a cache bound to the storage below it.
pub trait Storage {
    /// Copy `buffer.len()` bytes between `buffer` and this storage at
    /// `address`. Reads fill `buffer`, writes consume it.
    fn handle_request(
        &mut self,
        address: u64,
        buffer: &mut [u8],
        access_type: AccessType,
    ) -> SimulatorResult<Access>;

    fn stats(&self) -> StorageStats;
}

/// Outcome of one storage request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Access {
    pub hit: bool,
    /// Cycles spent serving the request, including lower levels
    pub cycles: u64,
}

impl Access {
    pub fn hit(cycles: u64) -> Self {
        Self { hit: true, cycles }
    }

    pub fn miss(cycles: u64) -> Self {
        Self { hit: false, cycles }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub access_count: u64,
    pub miss_count: u64,
    pub replace_count: u64,
    /// Requests forwarded to the lower storage
    pub fetch_count: u64,
    pub prefetch_count: u64,
    pub access_time: u64,
}

impl StorageStats {
    /// Computes the miss rate, or 0 when nothing was accessed
    pub fn miss_rate(&self) -> f64 {
        if self.access_count == 0 {
            return 0.0;
        }
        self.miss_count as f64 / self.access_count as f64
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StorageLatency {
    pub hit_latency: u64,
    pub bus_latency: u64,
}

impl StorageLatency {
    pub fn new(hit_latency: u64, bus_latency: u64) -> Self {
        Self { hit_latency, bus_latency }
    }

    /// Cycles charged for a request served at this level
    pub fn hit_time(&self) -> u64 {
        self.hit_latency + self.bus_latency
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    Read,
    Write,
}

impl AccessType {
    pub fn is_read(self) -> bool {
        self == AccessType::Read
    }
}
