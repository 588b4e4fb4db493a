//! A tiny RV64 assembler and ELF writer for end-to-end programs
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;

use tempfile::NamedTempFile;

pub const BASE: u64 = 0x10000;

pub const ZERO: u32 = 0;
pub const RA: u32 = 1;
pub const SP: u32 = 2;
pub const T0: u32 = 5;
pub const T1: u32 = 6;
pub const T2: u32 = 7;
pub const A0: u32 = 10;
pub const A1: u32 = 11;
pub const A7: u32 = 17;

fn r_type(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn i_type(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    ((imm as u32 & 0xfff) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn s_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
    let imm = imm as u32 & 0xfff;
    ((imm >> 5) << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | ((imm & 0x1f) << 7) | 0x23
}

fn b_type(offset: i64, rs2: u32, rs1: u32, funct3: u32) -> u32 {
    let imm = offset as u32;
    (((imm >> 12) & 1) << 31)
        | (((imm >> 5) & 0x3f) << 25)
        | (rs2 << 20)
        | (rs1 << 15)
        | (funct3 << 12)
        | (((imm >> 1) & 0xf) << 8)
        | (((imm >> 11) & 1) << 7)
        | 0x63
}

fn j_type(offset: i64, rd: u32) -> u32 {
    let imm = offset as u32;
    (((imm >> 20) & 1) << 31)
        | (((imm >> 1) & 0x3ff) << 21)
        | (((imm >> 11) & 1) << 20)
        | (((imm >> 12) & 0xff) << 12)
        | (rd << 7)
        | 0x6f
}

pub const ECALL: u32 = 0x73;

pub fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
    i_type(imm, rs1, 0, rd, 0x13)
}
pub fn addiw(rd: u32, rs1: u32, imm: i32) -> u32 {
    i_type(imm, rs1, 0, rd, 0x1b)
}
pub fn slli(rd: u32, rs1: u32, shamt: u32) -> u32 {
    i_type(shamt as i32, rs1, 1, rd, 0x13)
}
pub fn add(rd: u32, rs1: u32, rs2: u32) -> u32 {
    r_type(0, rs2, rs1, 0, rd, 0x33)
}
pub fn sub(rd: u32, rs1: u32, rs2: u32) -> u32 {
    r_type(0x20, rs2, rs1, 0, rd, 0x33)
}
pub fn addw(rd: u32, rs1: u32, rs2: u32) -> u32 {
    r_type(0, rs2, rs1, 0, rd, 0x3b)
}
pub fn mul(rd: u32, rs1: u32, rs2: u32) -> u32 {
    r_type(1, rs2, rs1, 0, rd, 0x33)
}
pub fn div(rd: u32, rs1: u32, rs2: u32) -> u32 {
    r_type(1, rs2, rs1, 4, rd, 0x33)
}
pub fn rem(rd: u32, rs1: u32, rs2: u32) -> u32 {
    r_type(1, rs2, rs1, 6, rd, 0x33)
}
pub fn lui(rd: u32, imm20: u32) -> u32 {
    (imm20 << 12) | (rd << 7) | 0x37
}
pub fn ld(rd: u32, rs1: u32, imm: i32) -> u32 {
    i_type(imm, rs1, 3, rd, 0x03)
}
pub fn lw(rd: u32, rs1: u32, imm: i32) -> u32 {
    i_type(imm, rs1, 2, rd, 0x03)
}
pub fn lbu(rd: u32, rs1: u32, imm: i32) -> u32 {
    i_type(imm, rs1, 4, rd, 0x03)
}
pub fn sd(rs2: u32, rs1: u32, imm: i32) -> u32 {
    s_type(imm, rs2, rs1, 3)
}
pub fn sw(rs2: u32, rs1: u32, imm: i32) -> u32 {
    s_type(imm, rs2, rs1, 2)
}
/// bne with a raw byte offset, for targets outside the program
pub fn bne_offset(rs1: u32, rs2: u32, offset: i64) -> u32 {
    b_type(offset, rs2, rs1, 1)
}
pub fn jalr(rd: u32, rs1: u32, imm: i32) -> u32 {
    i_type(imm, rs1, 0, rd, 0x67)
}

enum Item {
    Word(u32),
    Branch { funct3: u32, rs1: u32, rs2: u32, label: &'static str },
    Jal { rd: u32, label: &'static str },
}

/// Straight-line assembler with forward and backward labels
#[derive(Default)]
pub struct Asm {
    items: Vec<Item>,
    labels: HashMap<&'static str, usize>,
}

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, word: u32) -> &mut Self {
        self.items.push(Item::Word(word));
        self
    }

    pub fn emit_all(&mut self, words: &[u32]) -> &mut Self {
        for &word in words {
            self.emit(word);
        }
        self
    }

    pub fn label(&mut self, name: &'static str) -> &mut Self {
        self.labels.insert(name, self.items.len());
        self
    }

    pub fn beq(&mut self, rs1: u32, rs2: u32, label: &'static str) -> &mut Self {
        self.items.push(Item::Branch { funct3: 0, rs1, rs2, label });
        self
    }

    pub fn bne(&mut self, rs1: u32, rs2: u32, label: &'static str) -> &mut Self {
        self.items.push(Item::Branch { funct3: 1, rs1, rs2, label });
        self
    }

    pub fn blt(&mut self, rs1: u32, rs2: u32, label: &'static str) -> &mut Self {
        self.items.push(Item::Branch { funct3: 4, rs1, rs2, label });
        self
    }

    pub fn jal(&mut self, rd: u32, label: &'static str) -> &mut Self {
        self.items.push(Item::Jal { rd, label });
        self
    }

    /// a7 = number; ecall
    pub fn syscall(&mut self, number: i32) -> &mut Self {
        self.emit(addi(A7, ZERO, number)).emit(ECALL)
    }

    /// Exits with `code`
    pub fn exit(&mut self, code: i32) -> &mut Self {
        self.emit(addi(A0, ZERO, code)).syscall(93)
    }

    pub fn assemble(&self) -> Vec<u8> {
        let offset = |index: usize, label: &str| {
            let target = self.labels[label];
            (target as i64 - index as i64) * 4
        };
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| match *item {
                Item::Word(word) => word,
                Item::Branch { funct3, rs1, rs2, label } => {
                    b_type(offset(index, label), rs2, rs1, funct3)
                }
                Item::Jal { rd, label } => j_type(offset(index, label), rd),
            })
            .flat_map(|word| word.to_le_bytes())
            .collect()
    }
}

/// A little-endian RV64 ELF executable with one loadable segment at
/// `BASE`, entered at its first byte
pub fn build_elf(segment: &[u8], mem_size: u64) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    data.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    data.extend_from_slice(&243u16.to_le_bytes()); // EM_RISCV
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&BASE.to_le_bytes());
    data.extend_from_slice(&64u64.to_le_bytes());
    data.extend_from_slice(&0u64.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&64u16.to_le_bytes());
    data.extend_from_slice(&56u16.to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&64u16.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());

    data.extend_from_slice(&1u32.to_le_bytes()); // PT_LOAD
    data.extend_from_slice(&7u32.to_le_bytes());
    data.extend_from_slice(&120u64.to_le_bytes());
    data.extend_from_slice(&BASE.to_le_bytes());
    data.extend_from_slice(&BASE.to_le_bytes());
    data.extend_from_slice(&(segment.len() as u64).to_le_bytes());
    data.extend_from_slice(&mem_size.max(segment.len() as u64).to_le_bytes());
    data.extend_from_slice(&0x1000u64.to_le_bytes());

    data.extend_from_slice(segment);
    data
}

/// Writes `asm` as an executable to a temporary file
pub fn write_program(asm: &Asm) -> NamedTempFile {
    write_segment(&asm.assemble())
}

/// Writes a raw segment as an executable to a temporary file
pub fn write_segment(segment: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&build_elf(segment, segment.len() as u64 + 0x100)).unwrap();
    file.flush().unwrap();
    file
}
