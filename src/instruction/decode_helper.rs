//! Decoding helper functions.
//! Field layout follows the RV64I base and M extension encodings.

use super::Attributes;
use super::Controls;
use super::Format;
use super::Function;
use super::Instruction;
use super::Opcode;
use crate::alu::ALUOp;
use crate::alu::ALUSrc;
use crate::error::SimulatorError;
use crate::error::SimulatorResult;

/// Sign-extends the low `width` bits of `value`
pub fn sign_extend(value: u64, width: u32) -> i64 {
    assert!((1..=64).contains(&width));
    let shamt = 64 - width;
    ((value << shamt) as i64) >> shamt
}

/// Gathers bit fields of `raw` into one value, then sign-extends it
/// from `width` bits. Each slice is `(high, low, destination_low)`.
pub fn extract_signed(raw: u32, slices: &[(u32, u32, u32)], width: u32) -> i64 {
    let value = slices.iter().fold(0u64, |acc, &(high, low, dst)| {
        let len = high - low + 1;
        let field = (raw as u64 >> low) & ((1 << len) - 1);
        acc | (field << dst)
    });
    sign_extend(value, width)
}

pub const IMM_I: &[(u32, u32, u32)] = &[(31, 20, 0)];
pub const IMM_S: &[(u32, u32, u32)] = &[(31, 25, 5), (11, 7, 0)];
pub const IMM_B: &[(u32, u32, u32)] = &[(31, 31, 12), (7, 7, 11), (30, 25, 5), (11, 8, 1)];
pub const IMM_U: &[(u32, u32, u32)] = &[(31, 12, 12)];
pub const IMM_J: &[(u32, u32, u32)] =
    &[(31, 31, 20), (19, 12, 12), (20, 20, 11), (30, 21, 1)];

fn invalid(inst: &Instruction) -> SimulatorError {
    SimulatorError::InvalidInstructionError(inst.raw_inst, inst.pc)
}

/// Determines an instruction's mnemonic, e.g., JAL, XOR, or SRA
fn get_function(inst: &Instruction) -> SimulatorResult<Function> {
    use Function::*;
    use Opcode::*;
    // Opcode-determined ones
    match inst.opcode {
        Lui => return Ok(LUI),
        AuiPc => return Ok(AUIPC),
        Jal => return Ok(JAL),
        System if inst.raw_inst == 0x73 => return Ok(ECALL),
        System => return Err(invalid(inst)),
        _ => {}
    }

    let funct3 = field(inst.raw_inst, 14, 12);
    let funct7 = field(inst.raw_inst, 31, 25);
    // 64-bit immediate shifts give up the low bit of funct7 to the shamt
    let funct6 = inst.raw_inst >> 26;

    Ok(match (inst.opcode, funct3) {
        (Jalr, 0b000) => JALR,
        (Branch, 0b000) => BEQ,
        (Branch, 0b001) => BNE,
        (Branch, 0b100) => BLT,
        (Branch, 0b101) => BGE,
        (Branch, 0b110) => BLTU,
        (Branch, 0b111) => BGEU,
        (Load, 0b000) => LB,
        (Load, 0b001) => LH,
        (Load, 0b010) => LW,
        (Load, 0b011) => LD,
        (Load, 0b100) => LBU,
        (Load, 0b101) => LHU,
        (Load, 0b110) => LWU,
        (Store, 0b000) => SB,
        (Store, 0b001) => SH,
        (Store, 0b010) => SW,
        (Store, 0b011) => SD,
        (OpImm, 0b000) => ADDI,
        (OpImm, 0b010) => SLTI,
        (OpImm, 0b011) => SLTIU,
        (OpImm, 0b100) => XORI,
        (OpImm, 0b110) => ORI,
        (OpImm, 0b111) => ANDI,
        (OpImm, 0b001) if funct6 == 0 => SLLI,
        (OpImm, 0b101) if funct6 == 0 => SRLI,
        (OpImm, 0b101) if funct6 == 0b010000 => SRAI,
        (OpImm32, 0b000) => ADDIW,
        (OpImm32, 0b001) if funct7 == 0 => SLLIW,
        (OpImm32, 0b101) if funct7 == 0 => SRLIW,
        (OpImm32, 0b101) if funct7 == 0b0100000 => SRAIW,
        (Op, _) => match (funct7, funct3) {
            (0b0000000, 0b000) => ADD,
            (0b0100000, 0b000) => SUB,
            (0b0000000, 0b001) => SLL,
            (0b0000000, 0b010) => SLT,
            (0b0000000, 0b011) => SLTU,
            (0b0000000, 0b100) => XOR,
            (0b0000000, 0b101) => SRL,
            (0b0100000, 0b101) => SRA,
            (0b0000000, 0b110) => OR,
            (0b0000000, 0b111) => AND,
            (0b0000001, 0b000) => MUL,
            (0b0000001, 0b001) => MULH,
            (0b0000001, 0b010) => MULHSU,
            (0b0000001, 0b011) => MULHU,
            (0b0000001, 0b100) => DIV,
            (0b0000001, 0b101) => DIVU,
            (0b0000001, 0b110) => REM,
            (0b0000001, 0b111) => REMU,
            _ => return Err(invalid(inst)),
        },
        (Op32, _) => match (funct7, funct3) {
            (0b0000000, 0b000) => ADDW,
            (0b0100000, 0b000) => SUBW,
            (0b0000000, 0b001) => SLLW,
            (0b0000000, 0b101) => SRLW,
            (0b0100000, 0b101) => SRAW,
            (0b0000001, 0b000) => MULW,
            (0b0000001, 0b100) => DIVW,
            (0b0000001, 0b101) => DIVUW,
            (0b0000001, 0b110) => REMW,
            (0b0000001, 0b111) => REMUW,
            _ => return Err(invalid(inst)),
        },
        _ => return Err(invalid(inst)),
    })
}

pub fn get_controls(inst: &Instruction) -> Controls {
    use Function::*;
    use Opcode::*;

    Controls {
        mem_read: matches!(inst.opcode, Load),
        mem_write: matches!(inst.opcode, Store),
        reg_write: !matches!(inst.opcode, Branch | Store | System),
        mem_step: match inst.function {
            LB | LBU | SB => 1,
            LH | LHU | SH => 2,
            LW | LWU | SW => 4,
            LD | SD => 8,
            _ => 0,
        },
        mem_unsigned: matches!(inst.function, LBU | LHU | LWU),
        alu_op: match inst.function {
            BEQ => ALUOp::BEQ,
            BNE => ALUOp::BNE,
            BLT => ALUOp::BLT,
            BGE => ALUOp::BGE,
            BLTU => ALUOp::BLTU,
            BGEU => ALUOp::BGEU,
            SLTI | SLT => ALUOp::SLT,
            SLTIU | SLTU => ALUOp::SLTU,
            XORI | XOR => ALUOp::XOR,
            ORI | OR => ALUOp::OR,
            ANDI | AND => ALUOp::AND,
            SLLI | SLL => ALUOp::SLL,
            SRLI | SRL => ALUOp::SRL,
            SRAI | SRA => ALUOp::SRA,
            SUB => ALUOp::SUB,
            ADDIW | ADDW => ALUOp::ADDW,
            SLLIW | SLLW => ALUOp::SLLW,
            SRLIW | SRLW => ALUOp::SRLW,
            SRAIW | SRAW => ALUOp::SRAW,
            SUBW => ALUOp::SUBW,
            MUL => ALUOp::MUL,
            MULH => ALUOp::MULH,
            MULHSU => ALUOp::MULHSU,
            MULHU => ALUOp::MULHU,
            DIV => ALUOp::DIV,
            DIVU => ALUOp::DIVU,
            REM => ALUOp::REM,
            REMU => ALUOp::REMU,
            MULW => ALUOp::MULW,
            DIVW => ALUOp::DIVW,
            DIVUW => ALUOp::DIVUW,
            REMW => ALUOp::REMW,
            REMUW => ALUOp::REMUW,
            // Addresses, upper immediates, link values
            _ => ALUOp::ADD,
        },
        alu_src: match inst.opcode {
            Branch | Op | Op32 | System => ALUSrc::REG,
            _ => ALUSrc::IMM,
        },
    }
}

/// Returns the opcode from a raw instruction
pub fn raw_to_opcode(raw_inst: u32, pc: u64) -> SimulatorResult<Opcode> {
    let opcode = raw_inst & 0x7f_u32;
    match opcode {
        0x37 => Ok(Opcode::Lui),
        0x17 => Ok(Opcode::AuiPc),
        0x6f => Ok(Opcode::Jal),
        0x67 => Ok(Opcode::Jalr),
        0x63 => Ok(Opcode::Branch),
        0x03 => Ok(Opcode::Load),
        0x23 => Ok(Opcode::Store),
        0x33 => Ok(Opcode::Op),
        0x13 => Ok(Opcode::OpImm),
        0x3b => Ok(Opcode::Op32),
        0x1b => Ok(Opcode::OpImm32),
        0x73 => Ok(Opcode::System),
        _ => Err(SimulatorError::InvalidInstructionError(raw_inst, pc)),
    }
}

/// Returns the instruction format from an opcode
pub fn opcode_to_format(opcode: Opcode) -> Format {
    match opcode {
        Opcode::Lui | Opcode::AuiPc => Format::U,
        Opcode::Jal => Format::J,
        Opcode::Jalr | Opcode::Load | Opcode::OpImm | Opcode::OpImm32 => {
            Format::I
        }
        Opcode::Branch => Format::B,
        Opcode::Store => Format::S,
        Opcode::Op | Opcode::Op32 | Opcode::System => Format::R,
    }
}

/// Fills in attributes, function and controls
pub fn parse(inst: &mut Instruction) -> SimulatorResult<()> {
    let raw = inst.raw_inst;
    let [rs1, rs2, rd] = fields_of(inst.format);

    inst.attributes = Attributes {
        rs1: rs1.then(|| field(raw, 19, 15)),
        rs2: rs2.then(|| field(raw, 24, 20)),
        rd: rd.then(|| field(raw, 11, 7)),
        imm: immediate(inst.opcode, inst.format, raw),
    };
    inst.function = get_function(inst)?;
    inst.controls = get_controls(inst);

    Ok(())
}

/// Which of rs1, rs2 and rd a format carries
fn fields_of(format: Format) -> [bool; 3] {
    match format {
        Format::R => [true, true, true],
        Format::I => [true, false, true],
        Format::S | Format::B => [true, true, false],
        Format::U | Format::J => [false, false, true],
    }
}

fn immediate(opcode: Opcode, format: Format, raw: u32) -> Option<i64> {
    let is_shift = matches!(field(raw, 14, 12), 0b001 | 0b101);
    let imm = match format {
        Format::R => return None,
        // shamt is 6 bits wide, 5 for the word variants
        Format::I if is_shift && opcode == Opcode::OpImm => field(raw, 25, 20) as i64,
        Format::I if is_shift && opcode == Opcode::OpImm32 => field(raw, 24, 20) as i64,
        Format::I => extract_signed(raw, IMM_I, 12),
        Format::S => extract_signed(raw, IMM_S, 12),
        Format::B => extract_signed(raw, IMM_B, 13),
        Format::U => extract_signed(raw, IMM_U, 32),
        Format::J => extract_signed(raw, IMM_J, 21),
    };
    Some(imm)
}

/// Bits `hi..=lo` of `raw`, unshifted to bit 0
fn field(raw: u32, hi: u32, lo: u32) -> u32 {
    (raw >> lo) & ((1u32 << (hi - lo + 1)) - 1)
}
