//! A simulator wrapper

use std::fmt;
use std::path::Path;
use std::time::Instant;

use crate::config::SimConfig;
use crate::cpu::CPUHistory;
use crate::error::SimulatorResult;
use crate::memory::{Storage, StorageStats};
use crate::pipelined::branch_predictor::PredictorHeuristic;
use crate::pipelined::Machine;
use crate::system_call::SyscallHost;

/// Everything printed once a program exits
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub exit_code: i64,
    pub heuristic: PredictorHeuristic,
    pub history: CPUHistory,
    /// One entry per cache level, L1 first
    pub caches: Vec<(&'static str, StorageStats)>,
    pub memory: StorageStats,
    /// Wall-clock seconds spent simulating
    pub elapsed: f64,
}

impl RunReport {
    pub fn from_machine<H: SyscallHost>(
        machine: &Machine<H>,
        exit_code: i64,
        elapsed: f64,
    ) -> Self {
        Self {
            exit_code,
            heuristic: machine.predictor.heuristic(),
            history: machine.cpu.history,
            caches: machine.mem.caches.iter().map(|cache| (cache.name, cache.stats())).collect(),
            memory: machine.mem.memory.stats(),
            elapsed,
        }
    }

    pub fn cpi(&self) -> f64 {
        self.history.cpi()
    }

    pub fn l1_miss_rate(&self) -> f64 {
        self.caches.first().map_or(0.0, |(_, stats)| stats.miss_rate())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let history = &self.history;
        writeln!(f, "------------ STATISTICS -----------")?;
        writeln!(f, "Number of Pipeline Cycles: {}", history.cycle_count)?;
        writeln!(f, "Number of Ticks: {}", history.tick_count)?;
        writeln!(f, "Number of Instructions: {}", history.inst_count)?;
        writeln!(f, "Avg Ticks per Instruction: {:.4}", history.cpi())?;
        writeln!(f, "Wall Time: {:.3}s", self.elapsed)?;
        writeln!(f, "Number of Data Hazards (forwarded): {}", history.data_hazard_count)?;
        writeln!(f, "Number of Load-Use Hazards: {}", history.load_use_hazard_count)?;
        writeln!(f, "Number of Control Hazards: {}", history.control_hazard_count)?;
        writeln!(
            f,
            "Branch Prediction: {}, accuracy {:.4} ({} correct, {} wrong)",
            self.heuristic.name(),
            history.prediction_accuracy(),
            history.predict_success_count,
            history.predict_failure_count
        )?;
        writeln!(f, "Number of System Calls: {}", history.syscall_count)?;
        writeln!(f, "Number of Fetch Stalls: {}", history.fetch_stall_count)?;
        for (name, stats) in &self.caches {
            writeln!(
                f,
                "{}: {} accesses, miss rate {:.2}%, access time {}, {} prefetches",
                name,
                stats.access_count,
                stats.miss_rate() * 100.0,
                stats.access_time,
                stats.prefetch_count
            )?;
        }
        writeln!(
            f,
            "Memory: {} accesses, access time {}",
            self.memory.access_count, self.memory.access_time
        )?;
        write!(f, "Exit code: {}", self.exit_code)
    }
}

/// Runs the ELF program at `elf_file` until it exits
pub fn run<H: SyscallHost>(
    elf_file: impl AsRef<Path>,
    config: &SimConfig,
    heuristic: PredictorHeuristic,
    max_cycles: Option<u64>,
    host: H,
) -> SimulatorResult<RunReport> {
    let mut machine = Machine::with_host(config, heuristic, host)?;
    machine.max_cycles = max_cycles;
    machine.load_elf(elf_file)?;

    let start = Instant::now();
    let exit_code = machine.run()?;
    let elapsed = start.elapsed().as_secs_f64();

    Ok(RunReport::from_machine(&machine, exit_code, elapsed))
}
