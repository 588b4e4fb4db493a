//! Pipelined implementation

use std::path::Path;

use crate::config::{LatencyTable, SimConfig};
use crate::cpu::CPUState;
use crate::elf_helper;
use crate::error::{ExecutionError, SimulatorResult};
use crate::loader;
use crate::memory::hierarchy::MemorySystem;
use crate::system_call::{ConsoleHost, SyscallHost};
use branch_predictor::{BranchPredictor, PredictorHeuristic};
use pipeline::Latches;

pub mod branch_predictor;
pub mod pipeline;
pub mod stages;

/// A whole simulated machine: CPU, memory system, predictor and pipeline
pub struct Machine<H: SyscallHost = ConsoleHost> {
    pub cpu: CPUState,
    pub mem: MemorySystem,
    pub predictor: BranchPredictor,
    pub latches: Latches,
    pub latency: LatencyTable,
    pub max_cycles: Option<u64>,
    host: H,
    loaded: bool,
}

impl Machine<ConsoleHost> {
    pub fn new(config: &SimConfig, heuristic: PredictorHeuristic) -> SimulatorResult<Self> {
        Self::with_host(config, heuristic, ConsoleHost)
    }
}

impl<H: SyscallHost> Machine<H> {
    pub fn with_host(
        config: &SimConfig,
        heuristic: PredictorHeuristic,
        host: H,
    ) -> SimulatorResult<Self> {
        Ok(Self {
            cpu: CPUState::make(0),
            mem: MemorySystem::from_config(config)?,
            predictor: BranchPredictor::new(heuristic),
            latches: Latches::new(0),
            latency: config.latency.clone(),
            max_cycles: None,
            host,
            loaded: false,
        })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Maps `bytes` at `address`, zero-filled up to `mem_size` bytes
    pub fn load_segment(
        &mut self,
        address: u64,
        bytes: &[u8],
        mem_size: u64,
    ) -> SimulatorResult<()> {
        self.mem.load_image(address, bytes, mem_size.max(bytes.len() as u64))
    }

    /// Loads an ELF executable and prepares to run it
    pub fn load_elf(&mut self, path: impl AsRef<Path>) -> SimulatorResult<()> {
        let image = elf_helper::parse_elf_file(path)?;
        let entry = loader::load_elf(&mut self.mem, &image)?;
        self.prepare(entry)
    }

    /// Maps the stack and points fetch at `entry`
    pub fn prepare(&mut self, entry: u64) -> SimulatorResult<()> {
        loader::set_stack(&mut self.mem)?;
        self.cpu = CPUState::make(entry);
        self.latches = Latches::new(entry);
        self.loaded = true;
        log::info!("entry point {:#x}", entry);
        Ok(())
    }

    /// Simulates one cycle
    pub fn step(&mut self) -> SimulatorResult<()> {
        if !self.loaded {
            return Err(ExecutionError::NotLoaded.into());
        }

        let Self { cpu, mem, predictor, latches, latency, host, .. } = self;
        cpu.cycle_ticks = 1;

        stages::instruction_fetch(cpu, mem, predictor, latches)?;
        stages::instruction_decode(cpu, latches)?;
        stages::execute(cpu, predictor, latency, latches)?;
        stages::memory_access(cpu, mem, latches)?;
        stages::write_back(cpu, mem, host, latches)?;

        if latches.commit(cpu.pc.read()) {
            cpu.history.fetch_stall_count += 1;
        }
        cpu.history.cycle_count += 1;
        cpu.history.tick_count += cpu.cycle_ticks;
        Ok(())
    }

    /// Runs until the program exits. Returns its exit code.
    pub fn run(&mut self) -> SimulatorResult<i64> {
        loop {
            if let Some(max_cycles) = self.max_cycles {
                if self.cpu.history.cycle_count >= max_cycles {
                    return Err(ExecutionError::ExecutionLimitReached(max_cycles).into());
                }
            }
            self.step()?;
            if let Some(exit_code) = self.cpu.exit_code {
                return Ok(exit_code);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{SP, STACK_TOP};
    use crate::memory::main_memory::PAGE_SIZE;
    use crate::memory::AccessType;
    use crate::system_call::BufferHost;

    const ENTRY: u64 = 0x1000;

    // Hand-assembled helpers
    fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
        ((imm as u32 & 0xfff) << 20) | (rs1 << 15) | (rd << 7) | 0x13
    }
    fn add(rd: u32, rs1: u32, rs2: u32) -> u32 {
        (rs2 << 20) | (rs1 << 15) | (rd << 7) | 0x33
    }
    fn ld(rd: u32, rs1: u32, imm: i32) -> u32 {
        ((imm as u32 & 0xfff) << 20) | (rs1 << 15) | (0b011 << 12) | (rd << 7) | 0x03
    }
    fn sd(rs2: u32, rs1: u32, imm: i32) -> u32 {
        let imm = imm as u32 & 0xfff;
        ((imm >> 5) << 25) | (rs2 << 20) | (rs1 << 15) | (0b011 << 12) | ((imm & 0x1f) << 7) | 0x23
    }
    fn beq(rs1: u32, rs2: u32, imm: i32) -> u32 {
        let imm = imm as u32;
        (((imm >> 12) & 1) << 31)
            | (((imm >> 5) & 0x3f) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (((imm >> 1) & 0xf) << 8)
            | (((imm >> 11) & 1) << 7)
            | 0x63
    }
    const ECALL: u32 = 0x73;

    fn machine(program: &[u32]) -> Machine<BufferHost> {
        let mut machine = Machine::with_host(
            &SimConfig::default(),
            PredictorHeuristic::AlwaysNotTaken,
            BufferHost::default(),
        )
        .unwrap();
        let bytes: Vec<u8> = program.iter().flat_map(|inst| inst.to_le_bytes()).collect();
        machine.load_segment(ENTRY, &bytes, bytes.len() as u64 + 64).unwrap();
        machine.prepare(ENTRY).unwrap();
        machine
    }

    fn exit_sequence() -> [u32; 3] {
        [addi(10, 0, 0), addi(17, 0, 93), ECALL]
    }

    #[test]
    fn test_not_loaded() {
        let mut machine = Machine::with_host(
            &SimConfig::default(),
            PredictorHeuristic::Bimodal,
            BufferHost::default(),
        )
        .unwrap();
        assert!(machine.step().is_err());
    }

    #[test]
    fn test_stack_is_mapped() {
        let mut machine = machine(&exit_sequence());
        assert_eq!(machine.cpu.read_gpr(SP), STACK_TOP);
        let mut buffer = [0u8; 8];
        machine.mem.access(STACK_TOP - 8, &mut buffer, AccessType::Write).unwrap();
        machine.mem.access(STACK_TOP + 8, &mut buffer, AccessType::Read).unwrap();
        assert!(machine.mem.translate(STACK_TOP - 10 * PAGE_SIZE as u64).is_err());
    }

    #[test]
    fn test_back_to_back_forwarding() {
        let mut program = vec![addi(5, 0, 7), add(6, 5, 5), add(7, 6, 5)];
        program.extend(exit_sequence());
        let mut machine = machine(&program);
        assert_eq!(machine.run().unwrap(), 0);
        assert_eq!(machine.cpu.read_gpr(6), 14);
        assert_eq!(machine.cpu.read_gpr(7), 21);
        assert!(machine.cpu.history.data_hazard_count >= 3);
        assert_eq!(machine.cpu.history.inst_count, 5);
        assert_eq!(machine.cpu.history.syscall_count, 1);
    }

    #[test]
    fn test_load_use_stalls_one_cycle() {
        let prefix = [addi(2, 0, 0x7f0), addi(1, 0, 99), sd(1, 2, 0), addi(1, 0, 5)];
        let run = |tail: &[u32]| {
            let mut program = prefix.to_vec();
            program.extend_from_slice(tail);
            program.extend(exit_sequence());
            let mut machine = machine(&program);
            machine.mem.page_table.allocate_page(0x7f0).unwrap();
            machine.run().unwrap();
            machine
        };

        let dependent = run(&[ld(1, 2, 0), add(3, 1, 1)]);
        let independent = run(&[ld(1, 2, 0), add(3, 4, 4)]);

        // Never the stale 5 from the older ALU write
        assert_eq!(dependent.cpu.read_gpr(3), 198);
        assert_eq!(dependent.cpu.history.load_use_hazard_count, 1);
        assert_eq!(independent.cpu.history.load_use_hazard_count, 0);
        assert_eq!(
            dependent.cpu.history.cycle_count,
            independent.cpu.history.cycle_count + 1
        );
    }

    #[test]
    fn test_misprediction_squashes_younger_instructions() {
        // beq x0, x0 skips two instructions that must never write back
        let mut program =
            vec![addi(5, 0, 1), beq(0, 0, 12), addi(5, 0, 2), addi(6, 0, 3), addi(7, 0, 4)];
        program.extend(exit_sequence());
        let mut machine = machine(&program);
        machine.run().unwrap();

        assert_eq!(machine.cpu.read_gpr(5), 1);
        assert_eq!(machine.cpu.read_gpr(6), 0);
        assert_eq!(machine.cpu.read_gpr(7), 4);
        let history = machine.cpu.history;
        assert_eq!(history.control_hazard_count, 1);
        assert_eq!(history.predict_failure_count, 1);
        assert_eq!(history.predict_success_count, 0);
        // addi, beq, addi x7, and the exit sequence minus the ecall
        assert_eq!(history.inst_count, 5);
    }

    #[test]
    fn test_correct_prediction_costs_nothing() {
        let mut program = vec![addi(5, 0, 1), beq(5, 0, 8), addi(6, 0, 3)];
        program.extend(exit_sequence());
        let mut machine = machine(&program);
        machine.run().unwrap();

        assert_eq!(machine.cpu.read_gpr(6), 3);
        assert_eq!(machine.cpu.history.control_hazard_count, 0);
        assert_eq!(machine.cpu.history.predict_success_count, 1);
    }

    #[test]
    fn test_cycle_limit() {
        // beq x0, x0, 0 spins forever
        let mut machine = machine(&[beq(0, 0, 0)]);
        machine.max_cycles = Some(200);
        assert!(matches!(
            machine.run(),
            Err(crate::error::SimulatorError::ExecutionError(
                ExecutionError::ExecutionLimitReached(200)
            ))
        ));
        assert_eq!(machine.cpu.history.cycle_count, 200);
    }

    #[test]
    fn test_ticks_follow_latency_table() {
        let mut config = SimConfig::default();
        config.latency.set(crate::instruction::Function::ADD, 1000);
        let mut program = vec![add(5, 0, 0)];
        program.extend(exit_sequence());

        let mut slow =
            Machine::with_host(&config, PredictorHeuristic::AlwaysNotTaken, BufferHost::default())
                .unwrap();
        let mut fast = machine(&program);
        let bytes: Vec<u8> = program.iter().flat_map(|inst| inst.to_le_bytes()).collect();
        slow.load_segment(ENTRY, &bytes, bytes.len() as u64 + 64).unwrap();
        slow.prepare(ENTRY).unwrap();

        slow.run().unwrap();
        fast.run().unwrap();
        assert_eq!(slow.cpu.history.cycle_count, fast.cpu.history.cycle_count);
        assert!(slow.cpu.history.tick_count >= 1000);
        assert!(slow.cpu.history.tick_count > fast.cpu.history.tick_count + 500);
    }
}
