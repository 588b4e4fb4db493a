//! Memory management unit: a single-level page table
//! mapping virtual pages onto physical frames

use std::collections::BTreeMap;

use super::main_memory::{FRAME_NUM, PAGE_SIZE, PAGE_WIDTH};
use crate::error::{MemoryError, SimulatorResult};

/// Virtual page number to physical page number.
/// Frames are handed out first-free and never reclaimed.
pub struct PageTable {
    pages: BTreeMap<u64, u64>,
    frames: Vec<bool>,
}

impl Default for PageTable {
    fn default() -> Self {
        Self::make(FRAME_NUM)
    }
}

impl PageTable {
    pub fn make(frame_num: usize) -> Self {
        Self { pages: BTreeMap::new(), frames: vec![false; frame_num] }
    }

    pub fn get_page_number(address: u64) -> u64 {
        address >> PAGE_WIDTH
    }

    pub fn get_page_offset(address: u64) -> u64 {
        address & (PAGE_SIZE as u64 - 1)
    }

    pub fn page_exists(&self, address: u64) -> bool {
        self.pages.contains_key(&Self::get_page_number(address))
    }

    /// Maps the page containing `address` and returns its frame.
    /// Mapping an already mapped page is a no-op.
    pub fn allocate_page(&mut self, address: u64) -> SimulatorResult<u64> {
        let vpn = Self::get_page_number(address);
        if let Some(&ppn) = self.pages.get(&vpn) {
            return Ok(ppn);
        }

        let ppn = self
            .frames
            .iter()
            .position(|used| !used)
            .ok_or(MemoryError::OutOfFrames(address))? as u64;
        self.frames[ppn as usize] = true;
        self.pages.insert(vpn, ppn);
        log::debug!("mapped page {:#x} to frame {}", vpn << PAGE_WIDTH, ppn);

        Ok(ppn)
    }

    /// Maps every page overlapping `[address, address + len)`
    pub fn allocate_range(&mut self, address: u64, len: u64) -> SimulatorResult<()> {
        if len == 0 {
            return Ok(());
        }
        let first = Self::get_page_number(address);
        let last = Self::get_page_number(address + len - 1);
        for vpn in first..=last {
            self.allocate_page(vpn << PAGE_WIDTH)?;
        }
        Ok(())
    }

    pub fn translate(&self, address: u64) -> SimulatorResult<u64> {
        match self.pages.get(&Self::get_page_number(address)) {
            Some(ppn) => Ok((ppn << PAGE_WIDTH) | Self::get_page_offset(address)),
            None => Err(MemoryError::PageNotAllocated(address).into()),
        }
    }

    pub fn mapped_pages(&self) -> usize {
        self.pages.len()
    }
}
