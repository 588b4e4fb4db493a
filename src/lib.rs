pub mod alu;
pub mod config;
pub mod cpu;
pub mod elf_helper;
pub mod instruction;
pub mod loader;
pub mod memory;
pub mod run_wrapper;
pub mod system_call;

pub mod pipelined;

pub mod error;
pub mod flags;
