//! Instruction representation

use crate::alu::ALUOp;
use crate::alu::ALUSrc;
use crate::error::SimulatorResult;

pub mod decode_helper;

/// NOP: ADDI x0, x0, 0
pub(crate) const NOP: u32 = 0x13;

/// Decoded instruction, immutable once built
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instruction {
    /// Where it was fetched from
    pub pc: u64,
    /// Raw representation
    pub raw_inst: u32,
    pub opcode: Opcode,
    pub format: Format,
    pub function: Function,
    /// Subfields
    pub attributes: Attributes,
    /// Control signals
    pub controls: Controls,
}

impl Instruction {
    pub fn new(raw_inst: u32, pc: u64) -> SimulatorResult<Self> {
        let opcode = decode_helper::raw_to_opcode(raw_inst, pc)?;
        let format = decode_helper::opcode_to_format(opcode);

        let mut inst = Self {
            pc,
            raw_inst,
            opcode,
            format,
            function: Function::default(),
            attributes: Attributes::default(),
            controls: Controls::default(),
        };

        decode_helper::parse(&mut inst)?;
        Ok(inst)
    }

    pub fn rs1(&self) -> usize {
        self.attributes.rs1.unwrap_or(0) as usize
    }

    pub fn rs2(&self) -> usize {
        self.attributes.rs2.unwrap_or(0) as usize
    }

    pub fn rd(&self) -> usize {
        self.attributes.rd.unwrap_or(0) as usize
    }

    pub fn imm(&self) -> i64 {
        self.attributes.imm.unwrap_or(0)
    }

    pub fn is_ecall(&self) -> bool {
        self.function == Function::ECALL
    }
}

impl Default for Instruction {
    /// A NOP at address 0
    fn default() -> Self {
        Self {
            pc: 0,
            raw_inst: NOP,
            opcode: Opcode::OpImm,
            format: Format::I,
            function: Function::ADDI,
            attributes: Attributes {
                rs1: Some(0),
                rs2: None,
                rd: Some(0),
                imm: Some(0),
            },
            controls: Controls {
                reg_write: true,
                alu_src: ALUSrc::IMM,
                ..Controls::default()
            },
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mnemonic = self.function.mnemonic();
        match self.format {
            Format::R if self.is_ecall() => write!(f, "{}", mnemonic),
            Format::R => write!(
                f,
                "{} x{},x{},x{}",
                mnemonic,
                self.rd(),
                self.rs1(),
                self.rs2()
            ),
            Format::I if self.controls.mem_read || self.opcode == Opcode::Jalr => {
                write!(f, "{} x{},{}(x{})", mnemonic, self.rd(), self.imm(), self.rs1())
            }
            Format::I => write!(
                f,
                "{} x{},x{},{}",
                mnemonic,
                self.rd(),
                self.rs1(),
                self.imm()
            ),
            Format::S => {
                write!(f, "{} x{},{}(x{})", mnemonic, self.rs2(), self.imm(), self.rs1())
            }
            Format::B => write!(
                f,
                "{} x{},x{},{}",
                mnemonic,
                self.rs1(),
                self.rs2(),
                self.imm()
            ),
            Format::U => write!(f, "{} x{},{:#x}", mnemonic, self.rd(), self.imm() >> 12),
            Format::J => write!(f, "{} x{},{}", mnemonic, self.rd(), self.imm()),
        }
    }
}

/// rv64 opcode
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Opcode {
    Lui,
    AuiPc,
    Jal,
    Jalr,
    Branch,
    Load,
    Store,
    Op,
    OpImm,
    Op32,
    OpImm32,
    System,
}

/// rv64 instruction format
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Format {
    R,
    I,
    S,
    B,
    U,
    J,
}

/// rv64im function
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Function {
    LUI,
    AUIPC,
    JAL,
    JALR,
    BEQ,
    BNE,
    BLT,
    BGE,
    BLTU,
    BGEU,
    LB,
    LH,
    LW,
    LD,
    LBU,
    LHU,
    LWU,
    SB,
    SH,
    SW,
    SD,
    #[default]
    ADDI,
    SLTI,
    SLTIU,
    XORI,
    ORI,
    ANDI,
    SLLI,
    SRLI,
    SRAI,
    ADDIW,
    SLLIW,
    SRLIW,
    SRAIW,
    ADD,
    SUB,
    SLL,
    SLT,
    SLTU,
    XOR,
    SRL,
    SRA,
    OR,
    AND,
    MUL,
    MULH,
    MULHSU,
    MULHU,
    DIV,
    DIVU,
    REM,
    REMU,
    ADDW,
    SUBW,
    SLLW,
    SRLW,
    SRAW,
    MULW,
    DIVW,
    DIVUW,
    REMW,
    REMUW,
    ECALL,
}

impl Function {
    pub const ALL: &'static [Function] = {
        use Function::*;
        &[
            LUI, AUIPC, JAL, JALR, BEQ, BNE, BLT, BGE, BLTU, BGEU, LB, LH, LW,
            LD, LBU, LHU, LWU, SB, SH, SW, SD, ADDI, SLTI, SLTIU, XORI, ORI,
            ANDI, SLLI, SRLI, SRAI, ADDIW, SLLIW, SRLIW, SRAIW, ADD, SUB, SLL,
            SLT, SLTU, XOR, SRL, SRA, OR, AND, MUL, MULH, MULHSU, MULHU, DIV,
            DIVU, REM, REMU, ADDW, SUBW, SLLW, SRLW, SRAW, MULW, DIVW, DIVUW,
            REMW, REMUW, ECALL,
        ]
    };

    /// Assembly name, as used in configuration files
    pub fn mnemonic(self) -> &'static str {
        use Function::*;
        match self {
            LUI => "lui",
            AUIPC => "auipc",
            JAL => "jal",
            JALR => "jalr",
            BEQ => "beq",
            BNE => "bne",
            BLT => "blt",
            BGE => "bge",
            BLTU => "bltu",
            BGEU => "bgeu",
            LB => "lb",
            LH => "lh",
            LW => "lw",
            LD => "ld",
            LBU => "lbu",
            LHU => "lhu",
            LWU => "lwu",
            SB => "sb",
            SH => "sh",
            SW => "sw",
            SD => "sd",
            ADDI => "addi",
            SLTI => "slti",
            SLTIU => "sltiu",
            XORI => "xori",
            ORI => "ori",
            ANDI => "andi",
            SLLI => "slli",
            SRLI => "srli",
            SRAI => "srai",
            ADDIW => "addiw",
            SLLIW => "slliw",
            SRLIW => "srliw",
            SRAIW => "sraiw",
            ADD => "add",
            SUB => "sub",
            SLL => "sll",
            SLT => "slt",
            SLTU => "sltu",
            XOR => "xor",
            SRL => "srl",
            SRA => "sra",
            OR => "or",
            AND => "and",
            MUL => "mul",
            MULH => "mulh",
            MULHSU => "mulhsu",
            MULHU => "mulhu",
            DIV => "div",
            DIVU => "divu",
            REM => "rem",
            REMU => "remu",
            ADDW => "addw",
            SUBW => "subw",
            SLLW => "sllw",
            SRLW => "srlw",
            SRAW => "sraw",
            MULW => "mulw",
            DIVW => "divw",
            DIVUW => "divuw",
            REMW => "remw",
            REMUW => "remuw",
            ECALL => "ecall",
        }
    }

    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|function| function.mnemonic().eq_ignore_ascii_case(name))
    }
}

/// Instruction attributes
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Attributes {
    pub rs1: Option<u32>,
    pub rs2: Option<u32>,
    pub rd: Option<u32>,
    /// Sign-extended, or the shift amount for shifts
    pub imm: Option<i64>,
}

/// Control signals
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Controls {
    pub mem_read: bool,
    pub mem_write: bool,
    pub reg_write: bool,
    /// Bytes moved by a load or store
    pub mem_step: usize,
    /// Zero-extend instead of sign-extend loaded values
    pub mem_unsigned: bool,
    pub alu_op: ALUOp,
    pub alu_src: ALUSrc,
}
