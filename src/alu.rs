//! ALU implementation

use crate::instruction::Instruction;

/// Sign-extends the low word, as every *W operation does
fn sext32(value: u32) -> u64 {
    value as i32 as i64 as u64
}

/// Performs an atomic ALU operation on 64-bit operands.
/// Branch operations return 1 iff the branch is taken.
pub fn alu(inst: &Instruction, op1: u64, op2: u64) -> u64 {
    let (s1, s2) = (op1 as i64, op2 as i64);
    let (w1, w2) = (op1 as u32, op2 as u32);
    match inst.controls.alu_op {
        ALUOp::ADD => op1.wrapping_add(op2),
        ALUOp::SUB => op1.wrapping_sub(op2),
        ALUOp::AND => op1 & op2,
        ALUOp::OR => op1 | op2,
        ALUOp::XOR => op1 ^ op2,
        ALUOp::SLT => (s1 < s2) as u64,
        ALUOp::SLTU => (op1 < op2) as u64,
        ALUOp::SLL => op1 << (op2 & 0x3f),
        ALUOp::SRL => op1 >> (op2 & 0x3f),
        ALUOp::SRA => (s1 >> (op2 & 0x3f)) as u64,
        ALUOp::MUL => op1.wrapping_mul(op2),
        ALUOp::MULH => ((s1 as i128 * s2 as i128) >> 64) as u64,
        ALUOp::MULHSU => ((s1 as i128 * op2 as i128) >> 64) as u64,
        ALUOp::MULHU => ((op1 as u128 * op2 as u128) >> 64) as u64,
        // Division by zero never traps in RISC-V
        ALUOp::DIV if op2 == 0 => u64::MAX,
        ALUOp::DIV => s1.wrapping_div(s2) as u64,
        ALUOp::DIVU if op2 == 0 => u64::MAX,
        ALUOp::DIVU => op1 / op2,
        ALUOp::REM if op2 == 0 => op1,
        ALUOp::REM => s1.wrapping_rem(s2) as u64,
        ALUOp::REMU if op2 == 0 => op1,
        ALUOp::REMU => op1 % op2,
        ALUOp::ADDW => sext32(w1.wrapping_add(w2)),
        ALUOp::SUBW => sext32(w1.wrapping_sub(w2)),
        ALUOp::SLLW => sext32(w1 << (w2 & 0x1f)),
        ALUOp::SRLW => sext32(w1 >> (w2 & 0x1f)),
        ALUOp::SRAW => sext32(((w1 as i32) >> (w2 & 0x1f)) as u32),
        ALUOp::MULW => sext32(w1.wrapping_mul(w2)),
        ALUOp::DIVW if w2 == 0 => u64::MAX,
        ALUOp::DIVW => sext32((w1 as i32).wrapping_div(w2 as i32) as u32),
        ALUOp::DIVUW if w2 == 0 => u64::MAX,
        ALUOp::DIVUW => sext32(w1 / w2),
        ALUOp::REMW if w2 == 0 => sext32(w1),
        ALUOp::REMW => sext32((w1 as i32).wrapping_rem(w2 as i32) as u32),
        ALUOp::REMUW if w2 == 0 => sext32(w1),
        ALUOp::REMUW => sext32(w1 % w2),
        ALUOp::BEQ => (op1 == op2) as u64,
        ALUOp::BNE => (op1 != op2) as u64,
        ALUOp::BLT => (s1 < s2) as u64,
        ALUOp::BGE => (s1 >= s2) as u64,
        ALUOp::BLTU => (op1 < op2) as u64,
        ALUOp::BGEU => (op1 >= op2) as u64,
    }
}

/// Selector for ALU src2 input
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum ALUSrc {
    // From register
    #[default]
    REG,
    // From immediate
    IMM,
}

/// Set of ALU operations needed for rv64im
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum ALUOp {
    // Arithmetic
    #[default]
    ADD,
    SUB,
    // Logical
    AND,
    OR,
    XOR,
    // Set
    SLT,
    SLTU,
    // Shift
    SLL,
    SRL,
    SRA,
    // Multiply and divide
    MUL,
    MULH,
    MULHSU,
    MULHU,
    DIV,
    DIVU,
    REM,
    REMU,
    // Word
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
    // Branch
    BEQ,
    BNE,
    BLT,
    BGE,
    BLTU,
    BGEU,
}
