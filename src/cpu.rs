//! rv64 CPU state

/// Stack grows down from here
pub const STACK_TOP: u64 = 0x8000_0000;

pub const SP: usize = 2;
pub const A0: usize = 10;
pub const A7: usize = 17;

/// Architectural state plus the counters the run report is built from
#[derive(Clone, Debug, Default)]
pub struct CPUState {
    /// Address of the instruction fetched this cycle
    pub pc: Register,
    /// General purpose registers
    pub gpr: [Register; 32],
    /// Set by the exit system call
    pub exit_code: Option<i64>,
    /// Ticks the current cycle takes, at least 1
    pub cycle_ticks: u64,

    /// History of execution
    pub history: CPUHistory,
}

impl CPUState {
    pub fn make(entry: u64) -> Self {
        let mut cpu = Self::default();
        cpu.pc.write(entry);
        cpu.gpr[SP].write(STACK_TOP);
        cpu
    }

    pub fn read_gpr(&self, index: usize) -> u64 {
        self.gpr[index].read()
    }

    /// x0 is hardwired to zero
    pub fn write_gpr(&mut self, index: usize, value: u64) {
        if index != 0 {
            self.gpr[index].write(value);
        }
    }

    /// Makes the current cycle take at least `ticks`
    pub fn raise_ticks(&mut self, ticks: u64) {
        self.cycle_ticks = self.cycle_ticks.max(ticks);
    }

    pub fn has_exited(&self) -> bool {
        self.exit_code.is_some()
    }
}

/// Register file simulation
#[derive(Clone, Copy, Debug, Default)]
pub struct Register {
    /// Current data in the register
    data: u64,
}

impl Register {
    /// Reads the register
    pub fn read(&self) -> u64 {
        self.data
    }

    /// Writes to register
    pub fn write(&mut self, value: u64) {
        self.data = value;
    }
}

/// History module
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CPUHistory {
    /// Pipeline cycles
    pub cycle_count: u64,
    /// Sum of every cycle's ticks
    pub tick_count: u64,
    /// Retired instructions, system calls excluded
    pub inst_count: u64,
    pub data_hazard_count: u64,
    pub load_use_hazard_count: u64,
    pub control_hazard_count: u64,
    pub syscall_count: u64,
    pub fetch_stall_count: u64,
    pub predict_success_count: u64,
    pub predict_failure_count: u64,
}

impl CPUHistory {
    /// Ticks per retired instruction
    pub fn cpi(&self) -> f64 {
        if self.inst_count == 0 {
            return 0.0;
        }
        self.tick_count as f64 / self.inst_count as f64
    }

    /// Correct predictions over resolved branches
    pub fn prediction_accuracy(&self) -> f64 {
        let resolved = self.predict_success_count + self.predict_failure_count;
        if resolved == 0 {
            return 0.0;
        }
        self.predict_success_count as f64 / resolved as f64
    }
}
