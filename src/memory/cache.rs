//! Cache implementation

use super::{Access, AccessType, Storage, StorageLatency, StorageStats};
use crate::error::{MemoryError, MemoryErrorKind, SimulatorResult};

/// Every cache level uses 64-byte blocks
pub const BLOCK_WIDTH: usize = 6;
pub const BLOCK_SIZE: usize = 1 << BLOCK_WIDTH;

/// Recency counters stop aging here
pub const MAX_AGE: u64 = 99_999;

pub fn get_log_2(value: u64) -> usize {
    assert!(value > 0);
    63 - value.leading_zeros() as usize
}

pub fn is_pow_2(value: u64) -> bool {
    value != 0 && value & (value - 1) == 0
}

pub fn get_mask(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Policy points consulted around every lookup.
/// The defaults never bypass, never partition and never prefetch.
pub trait CachePolicy {
    /// Send the request straight to the lower storage
    fn bypass(&mut self, _address: u64, _access_type: AccessType) -> bool {
        false
    }

    /// Called with the target set before the lookup
    fn partition(&mut self, _set_id: u64) {}

    /// Address of a block to bring in once the request is served
    fn prefetch(&mut self, _address: u64, _hit: bool) -> Option<u64> {
        None
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultPolicy;

impl CachePolicy for DefaultPolicy {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub size: usize,
    pub associativity: usize,
    pub set_num: usize,
    pub write_through: bool,
    pub write_allocate: bool,
}

impl Default for CacheConfig {
    /// 32 KiB, 8-way, write-back, no-allocate
    fn default() -> Self {
        Self {
            size: 32 * 1024,
            associativity: 8,
            set_num: 32 * 1024 / (8 * BLOCK_SIZE),
            write_through: false,
            write_allocate: false,
        }
    }
}

impl CacheConfig {
    /// Derives the set count from size and associativity
    pub fn make(
        size: usize,
        associativity: usize,
        write_through: bool,
        write_allocate: bool,
    ) -> SimulatorResult<Self> {
        let set_bytes = associativity
            .checked_mul(BLOCK_SIZE)
            .filter(|&bytes| bytes != 0 && size % bytes == 0)
            .ok_or_else(|| {
                MemoryError::CacheConfigError(format!(
                    "size {} is not a multiple of {} ways x {} bytes",
                    size, associativity, BLOCK_SIZE
                ))
            })?;
        let config = Self {
            size,
            associativity,
            set_num: size / set_bytes,
            write_through,
            write_allocate,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn entry_num(&self) -> usize {
        self.size / BLOCK_SIZE
    }

    pub fn validate(&self) -> SimulatorResult<()> {
        if self.size == 0 || self.size % BLOCK_SIZE != 0 {
            return Err(MemoryError::CacheConfigError(format!(
                "size {} is not a multiple of the block size",
                self.size
            ))
            .into());
        }
        if self.set_num == 0 || self.entry_num() % self.set_num != 0 {
            return Err(MemoryError::CacheConfigError(format!(
                "{} sets do not divide {} entries",
                self.set_num,
                self.entry_num()
            ))
            .into());
        }
        if !is_pow_2(self.set_num as u64) {
            return Err(MemoryError::CacheConfigError(format!(
                "set count {} is not a power of 2",
                self.set_num
            ))
            .into());
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct CacheEntry {
    pub tag: u64,
    pub set: u64,
    /// 0 is the most recently used
    pub recency: u64,
    pub data: [u8; BLOCK_SIZE],
    pub valid: bool,
    pub dirty: bool,
}

impl CacheEntry {
    fn empty(set: u64) -> Self {
        Self {
            tag: 0,
            set,
            recency: 0,
            data: [0; BLOCK_SIZE],
            valid: false,
            dirty: false,
        }
    }
}

/// Set-associative cache. The storage below is borrowed per request,
/// see [`super::hierarchy::Linked`].
pub struct CacheStore {
    pub name: &'static str,
    config: CacheConfig,
    latency: StorageLatency,
    stats: StorageStats,
    policy: Box<dyn CachePolicy>,

    // Constants
    index_bits: usize,
    ways: usize,

    entries: Vec<CacheEntry>,
}

// Address layout:
// | tag | index | offset |
impl CacheStore {
    /// An unconfigured cache; every request fails until `set_config`
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            config: CacheConfig::default(),
            latency: StorageLatency::default(),
            stats: StorageStats::default(),
            policy: Box::new(DefaultPolicy),
            index_bits: 0,
            ways: 0,
            entries: Vec::new(),
        }
    }

    pub fn make(
        name: &'static str,
        config: CacheConfig,
        latency: StorageLatency,
    ) -> SimulatorResult<Self> {
        let mut cache = Self::new(name);
        cache.set_latency(latency);
        cache.set_config(config)?;
        Ok(cache)
    }

    /// Allocates the entries. A cache can only be configured once.
    pub fn set_config(&mut self, config: CacheConfig) -> SimulatorResult<()> {
        if self.is_configured() {
            return Err(MemoryError::CacheConfigError(format!(
                "{} is already configured",
                self.name
            ))
            .into());
        }
        config.validate()?;

        let entry_num = config.entry_num();
        let ways = entry_num / config.set_num;
        self.entries = (0..entry_num)
            .map(|i| CacheEntry::empty((i / ways) as u64))
            .collect();
        self.index_bits = get_log_2(config.set_num as u64);
        self.ways = ways;
        self.config = config;
        Ok(())
    }

    pub fn set_latency(&mut self, latency: StorageLatency) {
        self.latency = latency;
    }

    pub fn set_policy(&mut self, policy: Box<dyn CachePolicy>) {
        self.policy = policy;
    }

    pub fn reset_stats(&mut self) {
        self.stats = StorageStats::default();
    }

    pub fn is_configured(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    pub fn stats(&self) -> StorageStats {
        self.stats
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Number of entries in each set
    pub fn ways(&self) -> usize {
        self.ways
    }

    pub fn get_offset(&self, address: u64) -> usize {
        (address & get_mask(BLOCK_WIDTH)) as usize
    }

    pub fn get_index(&self, address: u64) -> u64 {
        (address >> BLOCK_WIDTH) & get_mask(self.index_bits)
    }

    pub fn get_tag(&self, address: u64) -> u64 {
        address >> (BLOCK_WIDTH + self.index_bits)
    }

    pub fn get_address(&self, tag: u64, set_id: u64) -> u64 {
        (tag << (BLOCK_WIDTH + self.index_bits)) | (set_id << BLOCK_WIDTH)
    }

    fn set_range(&self, set_id: u64) -> std::ops::Range<usize> {
        let begin = set_id as usize * self.ways;
        begin..begin + self.ways
    }

    pub fn lookup(&self, address: u64) -> Option<usize> {
        let tag = self.get_tag(address);
        let set_id = self.get_index(address);
        self.set_range(set_id).find(|&i| {
            let entry = &self.entries[i];
            entry.valid && entry.tag == tag
        })
    }

    pub fn is_in_cache(&self, address: u64) -> bool {
        self.lookup(address).is_some()
    }

    /// Serves a request, going to `lower` on misses and write-throughs
    pub fn handle_request(
        &mut self,
        address: u64,
        buffer: &mut [u8],
        access_type: AccessType,
        lower: &mut dyn Storage,
    ) -> SimulatorResult<Access> {
        if !self.is_configured() {
            return Err(MemoryError::AccessError {
                address,
                kind: MemoryErrorKind::Unconfigured,
            }
            .into());
        }
        let offset = self.get_offset(address);
        if offset + buffer.len() > BLOCK_SIZE {
            return Err(MemoryError::AccessError {
                address,
                kind: MemoryErrorKind::CrossesBlock(buffer.len()),
            }
            .into());
        }

        self.stats.access_count += 1;

        if self.policy.bypass(address, access_type) {
            let lower_access =
                lower.handle_request(address, buffer, access_type)?;
            self.stats.fetch_count += 1;
            return Ok(Access::miss(lower_access.cycles));
        }
        self.policy.partition(self.get_index(address));

        let access = match self.lookup(address) {
            Some(hit_index) => self.handle_hit(
                hit_index,
                address,
                buffer,
                access_type,
                lower,
            )?,
            None => {
                self.stats.miss_count += 1;
                self.handle_miss(address, buffer, access_type, lower)?
            }
        };

        if let Some(prefetch_address) = self.policy.prefetch(address, access.hit)
        {
            self.prefetch_block(prefetch_address, lower)?;
        }

        Ok(access)
    }

    fn handle_hit(
        &mut self,
        index: usize,
        address: u64,
        buffer: &mut [u8],
        access_type: AccessType,
        lower: &mut dyn Storage,
    ) -> SimulatorResult<Access> {
        let mut time = self.latency.hit_time();
        self.stats.access_time += time;
        self.touch(index);

        let offset = self.get_offset(address);
        let range = offset..offset + buffer.len();
        let write_through = self.config.write_through;
        let entry = &mut self.entries[index];
        match access_type {
            AccessType::Read => buffer.copy_from_slice(&entry.data[range]),
            AccessType::Write => {
                entry.data[range].copy_from_slice(buffer);
                // Write-through blocks never turn dirty
                entry.dirty = !write_through;
                if write_through {
                    let lower_access =
                        lower.handle_request(address, buffer, AccessType::Write)?;
                    time += lower_access.cycles;
                    self.stats.fetch_count += 1;
                }
            }
        }

        Ok(Access::hit(time))
    }

    fn handle_miss(
        &mut self,
        address: u64,
        buffer: &mut [u8],
        access_type: AccessType,
        lower: &mut dyn Storage,
    ) -> SimulatorResult<Access> {
        if !access_type.is_read() && !self.config.write_allocate {
            // Written straight to the lower level
            let lower_access =
                lower.handle_request(address, buffer, AccessType::Write)?;
            self.stats.fetch_count += 1;
            return Ok(Access::miss(lower_access.cycles));
        }

        let set_id = self.get_index(address);
        let index = self.replace(set_id, lower)?;

        let mut time = 0;
        if !access_type.is_read() {
            let lower_access =
                lower.handle_request(address, buffer, AccessType::Write)?;
            time += lower_access.cycles;
        }

        let offset = self.get_offset(address);
        let tag = self.get_tag(address);
        time += self.fill(index, tag, address - offset as u64, lower)?;
        time += self.latency.bus_latency;
        self.stats.access_time += self.latency.bus_latency;
        self.stats.fetch_count += 1;

        if access_type.is_read() {
            let range = offset..offset + buffer.len();
            buffer.copy_from_slice(&self.entries[index].data[range]);
        }

        log::trace!(
            "{} miss at {:#x}: set {} entry {} filled in {} cycles",
            self.name,
            address,
            set_id,
            index,
            time
        );

        Ok(Access::miss(time))
    }

    /// Returns a free entry of the set, evicting the least recently used
    /// one if needed. A dirty victim is written back without charging
    /// its latency to the requester.
    fn replace(
        &mut self,
        set_id: u64,
        lower: &mut dyn Storage,
    ) -> SimulatorResult<usize> {
        if let Some(free) =
            self.set_range(set_id).find(|&i| !self.entries[i].valid)
        {
            return Ok(free);
        }

        let victim = self.get_index_to_replace(set_id);
        let victim_address = self.get_address(self.entries[victim].tag, set_id);
        let entry = &mut self.entries[victim];
        entry.valid = false;
        if entry.dirty {
            entry.dirty = false;
            let mut block = entry.data;
            lower.handle_request(victim_address, &mut block, AccessType::Write)?;
            log::trace!("{} flushed dirty block {:#x}", self.name, victim_address);
        }
        self.stats.replace_count += 1;

        Ok(victim)
    }

    /// Oldest entry of the set; ties go to the lowest index
    pub fn get_index_to_replace(&self, set_id: u64) -> usize {
        let range = self.set_range(set_id);
        let mut result = range.start;
        for i in range {
            if self.entries[i].recency > self.entries[result].recency {
                result = i;
            }
        }
        result
    }

    /// Loads a whole block from `lower` into entry `index`
    fn fill(
        &mut self,
        index: usize,
        tag: u64,
        block_address: u64,
        lower: &mut dyn Storage,
    ) -> SimulatorResult<u64> {
        let mut block = [0u8; BLOCK_SIZE];
        let lower_access =
            lower.handle_request(block_address, &mut block, AccessType::Read)?;

        let entry = &mut self.entries[index];
        entry.data = block;
        entry.tag = tag;
        entry.valid = true;
        entry.dirty = false;
        self.touch(index);

        Ok(lower_access.cycles)
    }

    fn prefetch_block(
        &mut self,
        address: u64,
        lower: &mut dyn Storage,
    ) -> SimulatorResult<()> {
        if self.is_in_cache(address) {
            return Ok(());
        }
        let block_address = address & !get_mask(BLOCK_WIDTH);
        let index = self.replace(self.get_index(address), lower)?;
        self.fill(index, self.get_tag(address), block_address, lower)?;
        self.stats.prefetch_count += 1;
        Ok(())
    }

    /// Marks `index` most recently used and ages every other entry of
    /// the whole cache
    fn touch(&mut self, index: usize) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if i == index {
                entry.recency = 0;
            } else if entry.recency < MAX_AGE {
                entry.recency += 1;
            }
        }
    }
}
