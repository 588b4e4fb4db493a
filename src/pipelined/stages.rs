//! The five pipeline stages.
//! Each reads its committed input register and writes the staged
//! input of the next stage; later stages may patch earlier outputs.

use super::branch_predictor::BranchPredictor;
use super::pipeline::{Fault, Latches, PipelineRegister, Stage};
use crate::alu::{alu, ALUSrc};
use crate::config::LatencyTable;
use crate::cpu::CPUState;
use crate::error::{SimulatorError, SimulatorResult};
use crate::instruction::decode_helper::{extract_signed, sign_extend, IMM_B, IMM_J};
use crate::instruction::{Format, Instruction, Opcode};
use crate::memory::hierarchy::MemorySystem;
use crate::system_call::{self, SyscallHost};

const OPCODE_JAL: u32 = 0x6f;
const OPCODE_BRANCH: u32 = 0x63;

/// IF stage
pub fn instruction_fetch(
    cpu: &mut CPUState,
    mem: &mut MemorySystem,
    predictor: &BranchPredictor,
    latches: &mut Latches,
) -> SimulatorResult<()> {
    let fetch = latches.committed[Stage::Fetch];
    if fetch.bubble {
        latches.staged[Stage::Decode] = PipelineRegister::bubble();
        return Ok(());
    }

    let pc = fetch.pred_pc;
    cpu.pc.write(pc);
    let (raw, cycles) = match mem.read(pc, 4) {
        Ok(read) => read,
        Err(SimulatorError::MemoryError(e)) => {
            // Wrong-path fetches may leave the mapped image
            let fault = Fault::from_fetch(&e).ok_or(e)?;
            log::debug!("IF  {:#010x}: {:?}", pc, fault);
            latches.committed[Stage::Fetch].pred_pc = pc.wrapping_add(4);
            latches.staged[Stage::Decode] =
                PipelineRegister { pc, fault: Some(fault), ..PipelineRegister::default() };
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let raw_inst = raw as u32;
    cpu.raise_ticks(cycles);

    // Only jumps and branches are looked at before decoding
    let mut predicted_taken = false;
    let pred_pc = match raw_inst & 0x7f {
        OPCODE_JAL => pc.wrapping_add(extract_signed(raw_inst, IMM_J, 21) as u64),
        OPCODE_BRANCH if predictor.predict(pc) => {
            predicted_taken = true;
            pc.wrapping_add(extract_signed(raw_inst, IMM_B, 13) as u64)
        }
        _ => pc.wrapping_add(4),
    };
    latches.committed[Stage::Fetch].pred_pc = pred_pc;

    log::debug!("IF  {:#010x}: {:#010x}, next {:#010x}", pc, raw_inst, pred_pc);

    latches.staged[Stage::Decode] = PipelineRegister {
        pc,
        raw_inst,
        predicted_taken,
        ..PipelineRegister::default()
    };
    Ok(())
}

/// ID stage
pub fn instruction_decode(cpu: &mut CPUState, latches: &mut Latches) -> SimulatorResult<()> {
    let input = latches.committed[Stage::Decode];
    if !input.is_live() {
        latches.staged[Stage::Execute] = PipelineRegister::bubble();
        return Ok(());
    }

    let mut output = PipelineRegister {
        pc: input.pc,
        raw_inst: input.raw_inst,
        predicted_taken: input.predicted_taken,
        ..PipelineRegister::default()
    };

    if input.fault.is_some() {
        output.fault = input.fault;
        latches.staged[Stage::Execute] = output;
        return Ok(());
    }

    let inst = match Instruction::new(input.raw_inst, input.pc) {
        Ok(inst) => inst,
        Err(SimulatorError::InvalidInstructionError(raw, pc)) => {
            // Possibly on a wrong path; only executing it is fatal
            log::debug!("ID  {:#010x}: undecodable {:#010x}", pc, raw);
            output.fault = Some(Fault::Undecodable);
            latches.staged[Stage::Execute] = output;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let (src_a, src_b) = match inst.format {
        Format::R | Format::S | Format::B => (inst.rs1(), inst.rs2()),
        Format::I => (inst.rs1(), 0),
        Format::U | Format::J => (0, 0),
    };
    let rd = Some(inst.rd()).filter(|&rd| rd != 0);

    output.inst = inst;
    output.src_a = src_a;
    output.src_b = src_b;
    output.val_a = cpu.read_gpr(src_a);
    output.val_b = cpu.read_gpr(src_b);
    if inst.controls.mem_read {
        output.dst_m = rd;
    } else if inst.controls.reg_write {
        output.dst_e = rd;
    }

    log::debug!("ID  {:#010x}: {}", inst.pc, inst);

    if inst.is_ecall() {
        // Nothing behind a system call may proceed until it completes
        latches.committed[Stage::Fetch].stall = true;
        latches.staged[Stage::Decode] = PipelineRegister::bubble();
    }

    latches.staged[Stage::Execute] = output;
    Ok(())
}

/// Redirects fetch to `target` and squashes the two younger instructions
fn flush(cpu: &mut CPUState, latches: &mut Latches, target: u64) {
    let fetch = &mut latches.committed[Stage::Fetch];
    fetch.pred_pc = target;
    fetch.stall = false;
    fetch.bubble = false;
    latches.staged[Stage::Decode] = PipelineRegister::bubble();
    latches.committed[Stage::Decode] = PipelineRegister::bubble();
    latches.staged[Stage::Execute] = PipelineRegister::bubble();
    cpu.history.control_hazard_count += 1;
    log::debug!("EX  flush, fetch from {:#010x}", target);
}

/// EX stage
pub fn execute(
    cpu: &mut CPUState,
    predictor: &mut BranchPredictor,
    latency: &LatencyTable,
    latches: &mut Latches,
) -> SimulatorResult<()> {
    let input = latches.committed[Stage::Execute];
    if !input.is_live() {
        latches.staged[Stage::Memory] = PipelineRegister::bubble();
        return Ok(());
    }
    if let Some(fault) = input.fault {
        return Err(fault.into_error(input.raw_inst, input.pc));
    }

    let inst = input.inst;
    let pc = input.pc;
    let imm = inst.imm() as u64;
    let mut output = input;
    cpu.raise_ticks(latency.get(inst.function));

    match inst.opcode {
        Opcode::Lui => output.val_e = imm,
        Opcode::AuiPc => output.val_e = pc.wrapping_add(imm),
        Opcode::Jal => {
            output.val_e = pc.wrapping_add(4);
            output.val_c = pc.wrapping_add(imm);
        }
        Opcode::Jalr => {
            output.val_e = pc.wrapping_add(4);
            output.val_c = input.val_a.wrapping_add(imm) & !1;
            flush(cpu, latches, output.val_c);
        }
        Opcode::Branch => {
            let taken = alu(&inst, input.val_a, input.val_b) != 0;
            output.val_c = pc.wrapping_add(imm);
            if taken != input.predicted_taken {
                let target = if taken { output.val_c } else { pc.wrapping_add(4) };
                flush(cpu, latches, target);
                cpu.history.predict_failure_count += 1;
            } else {
                cpu.history.predict_success_count += 1;
            }
            predictor.update(pc, taken);
        }
        Opcode::Load | Opcode::Store => output.val_e = input.val_a.wrapping_add(imm),
        Opcode::System => {}
        Opcode::Op | Opcode::OpImm | Opcode::Op32 | Opcode::OpImm32 => {
            let op2 = match inst.controls.alu_src {
                ALUSrc::REG => input.val_b,
                ALUSrc::IMM => imm,
            };
            output.val_e = alu(&inst, input.val_a, op2);
        }
    }

    log::debug!("EX  {:#010x}: {} -> {:#x}", pc, inst, output.val_e);
    latches.staged[Stage::Memory] = output;

    if let Some(dst) = output.dst_e {
        if latches.forward(dst, output.val_e) {
            cpu.history.data_hazard_count += 1;
        }
    }

    if let Some(dst) = output.dst_m {
        let next = latches.staged[Stage::Execute];
        if !next.bubble && (next.src_a == dst || next.src_b == dst) {
            // The loaded value arrives a cycle too late; hold the reader
            latches.committed[Stage::Fetch].stall = true;
            latches.committed[Stage::Decode].stall = true;
            latches.staged[Stage::Execute] = PipelineRegister::bubble();
            cpu.history.load_use_hazard_count += 1;
            log::debug!("EX  load-use on x{}", dst);
        }
    }

    if inst.is_ecall() {
        latches.committed[Stage::Fetch].stall = true;
        latches.committed[Stage::Decode].stall = true;
        latches.staged[Stage::Execute] = PipelineRegister::bubble();
    }

    Ok(())
}

/// MEM stage
pub fn memory_access(
    cpu: &mut CPUState,
    mem: &mut MemorySystem,
    latches: &mut Latches,
) -> SimulatorResult<()> {
    let input = latches.committed[Stage::Memory];
    if !input.is_live() {
        latches.staged[Stage::Writeback] = PipelineRegister::bubble();
        return Ok(());
    }

    let inst = input.inst;
    let controls = inst.controls;
    let mut output = input;

    if controls.mem_read {
        let (raw, cycles) = mem.read(input.val_e, controls.mem_step)?;
        cpu.raise_ticks(cycles);
        output.val_m = if controls.mem_unsigned {
            raw
        } else {
            sign_extend(raw, controls.mem_step as u32 * 8) as u64
        };
        log::debug!("MEM {:#010x}: load {:#x} from {:#x}", input.pc, output.val_m, input.val_e);
    } else if controls.mem_write {
        let cycles = mem.write(input.val_e, input.val_b, controls.mem_step)?;
        cpu.raise_ticks(cycles);
        log::debug!("MEM {:#010x}: store {:#x} to {:#x}", input.pc, input.val_b, input.val_e);
    }

    latches.staged[Stage::Writeback] = output;

    if let Some(dst) = output.dst_e {
        if latches.forward(dst, output.val_e) {
            cpu.history.data_hazard_count += 1;
        }
    }
    if let Some(dst) = output.dst_m {
        if latches.forward(dst, output.val_m) {
            cpu.history.data_hazard_count += 1;
        }
    }

    if inst.is_ecall() {
        latches.committed[Stage::Fetch].stall = true;
        latches.committed[Stage::Decode].stall = true;
        latches.committed[Stage::Execute].stall = true;
    }

    Ok(())
}

/// WB stage
pub fn write_back(
    cpu: &mut CPUState,
    mem: &mut MemorySystem,
    host: &mut impl SyscallHost,
    latches: &mut Latches,
) -> SimulatorResult<()> {
    let input = latches.committed[Stage::Writeback];
    if !input.is_live() {
        return Ok(());
    }

    if input.inst.is_ecall() {
        cpu.history.syscall_count += 1;
        let cycles = system_call::syscall(cpu, mem, host)?;
        cpu.raise_ticks(cycles);
        return Ok(());
    }

    if let Some(dst) = input.dst_m {
        cpu.write_gpr(dst, input.val_m);
        if latches.forward(dst, input.val_m) {
            cpu.history.data_hazard_count += 1;
        }
    }
    if let Some(dst) = input.dst_e {
        cpu.write_gpr(dst, input.val_e);
        if latches.forward(dst, input.val_e) {
            cpu.history.data_hazard_count += 1;
        }
    }

    cpu.history.inst_count += 1;
    Ok(())
}
