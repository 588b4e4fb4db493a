//! Utility functions for preparing memory for execution

use crate::cpu::STACK_TOP;
use crate::elf_helper::ElfImage;
use crate::error::{ElfError, SimulatorResult};
use crate::memory::hierarchy::MemorySystem;
use crate::memory::main_memory::PAGE_SIZE;

/// Pages mapped above and below the initial stack pointer
const STACK_PAGES_ABOVE: u64 = 1;
const STACK_PAGES_BELOW: u64 = 9;

/// Maps the stack pages around `STACK_TOP`
pub fn set_stack(mem: &mut MemorySystem) -> SimulatorResult<()> {
    let page_size = PAGE_SIZE as u64;
    let top_page = STACK_TOP / page_size;
    for page in top_page - STACK_PAGES_BELOW..=top_page + STACK_PAGES_ABOVE {
        mem.page_table.allocate_page(page * page_size)?;
    }
    Ok(())
}

/// Copies every loadable segment of `image` into freshly mapped pages.
/// Returns the program entry.
pub fn load_elf(mem: &mut MemorySystem, image: &ElfImage) -> SimulatorResult<u64> {
    for segment in &image.segments {
        let address = segment.virtual_address;
        let memory_size = segment.memory_size.max(segment.file_size);
        if address.checked_add(memory_size).is_none() {
            return Err(ElfError::AddressOutOfBounds(address).into());
        }

        let bytes = image.segment_data(segment)?;
        log::debug!(
            "loading segment at {:#x}: {:#x} bytes in file, {:#x} in memory",
            address,
            segment.file_size,
            memory_size
        );
        mem.load_image(address, bytes, memory_size)?;
    }

    log::info!("loaded {} ({} segments)", image.path.display(), image.segments.len());
    Ok(image.entry)
}
