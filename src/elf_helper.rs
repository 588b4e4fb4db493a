//! Helper functions for parsing ELF files

use std::fs;
use std::path::{Path, PathBuf};

use object::elf;
use object::read::elf::{FileHeader, ProgramHeader};
use object::Endianness;

use crate::error::ElfError;

pub type ElfHeader = elf::FileHeader64<Endianness>;

/// A loadable segment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub virtual_address: u64,
    pub file_offset: u64,
    pub file_size: u64,
    pub memory_size: u64,
}

/// A parsed RV64 executable
#[derive(Debug)]
pub struct ElfImage {
    pub path: PathBuf,
    pub entry: u64,
    pub segments: Vec<Segment>,
    data: Vec<u8>,
}

impl ElfImage {
    /// The bytes a segment carries in the file
    pub fn segment_data(&self, segment: &Segment) -> Result<&[u8], ElfError> {
        let out_of_file = || ElfError::SegmentOutOfFile(segment.file_offset, segment.file_size);
        let start = usize::try_from(segment.file_offset).map_err(|_| out_of_file())?;
        let size = usize::try_from(segment.file_size).map_err(|_| out_of_file())?;
        let end = start.checked_add(size).ok_or_else(out_of_file)?;
        self.data.get(start..end).ok_or_else(out_of_file)
    }
}

/// Reads and parses the ELF file at `path`
pub fn parse_elf_file(path: impl AsRef<Path>) -> Result<ElfImage, ElfError> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|e| ElfError::FileReadError(path.to_path_buf(), e))?;
    parse_elf_data(path, data)
}

/// Parses an in-memory ELF file; `path` only names it in errors
pub fn parse_elf_data(path: impl AsRef<Path>, data: Vec<u8>) -> Result<ElfImage, ElfError> {
    let path = path.as_ref().to_path_buf();
    let parse_error = |message: String| ElfError::ParseError(path.clone(), message);

    let header = ElfHeader::parse(&*data).map_err(|e| parse_error(e.to_string()))?;
    let endian = header.endian().map_err(|e| parse_error(e.to_string()))?;

    let machine = header.e_machine(endian);
    if machine != elf::EM_RISCV {
        return Err(parse_error(format!("not a RISC-V executable (machine {})", machine)));
    }

    let segments = header
        .program_headers(endian, &*data)
        .map_err(|e| parse_error(e.to_string()))?
        .iter()
        .filter(|program| program.p_type(endian) == elf::PT_LOAD)
        .map(|program| Segment {
            virtual_address: program.p_vaddr(endian),
            file_offset: program.p_offset(endian),
            file_size: program.p_filesz(endian),
            memory_size: program.p_memsz(endian),
        })
        .collect();
    let entry = header.e_entry(endian);

    Ok(ElfImage { path, entry, segments, data })
}
