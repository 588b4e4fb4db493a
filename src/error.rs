use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Failed to load ELF file: {0}")]
    ElfLoadError(#[from] ElfError),

    #[error("CPU execution error: {0}")]
    ExecutionError(#[from] ExecutionError),

    #[error("Memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("Invalid instruction: {0:032b} at PC={1:#018x}")]
    InvalidInstructionError(u32, u64),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Errors related to ELF file operations
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("Failed to read ELF file '{}': {}", .0.display(), .1)]
    FileReadError(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse ELF file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),

    #[error("Memory address out of bounds: {0:#018x}")]
    AddressOutOfBounds(u64),

    #[error("Segment data out of file bounds: offset {0:#x}, size {1:#x}")]
    SegmentOutOfFile(u64, u64),
}

/// Errors related to CPU execution
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Execution limit reached: {0} cycles")]
    ExecutionLimitReached(u64),

    #[error("Program has not been loaded")]
    NotLoaded,
}

/// Errors related to memory operations
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Memory access error at address {address:#018x}: {kind}")]
    AccessError { address: u64, kind: MemoryErrorKind },

    #[error("Page not allocated: {0:#018x}")]
    PageNotAllocated(u64),

    #[error("Out of physical frames while mapping {0:#018x}")]
    OutOfFrames(u64),

    #[error("Cache misconfigured: {0}")]
    CacheConfigError(String),
}

/// Specific kinds of memory errors
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryErrorKind {
    #[error("Attempted to access memory outside addressable range")]
    OutOfBounds,

    #[error("Request of {0} bytes crosses a cache block boundary")]
    CrossesBlock(usize),

    #[error("Invalid access size: {0}")]
    InvalidSize(usize),

    #[error("Cache has not been configured")]
    Unconfigured,
}

/// Type alias for Result with SimulatorError
pub type SimulatorResult<T> = Result<T, SimulatorError>;
