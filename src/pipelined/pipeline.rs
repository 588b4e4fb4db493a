//! Pipeline registers

use std::ops::{Index, IndexMut};

use crate::error::{MemoryError, MemoryErrorKind, SimulatorError};
use crate::instruction::Instruction;

/// Pipeline stages, each named after the stage its register feeds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Decode,
    Execute,
    Memory,
    Writeback,
}

impl Stage {
    pub const ALL: [Stage; 5] =
        [Stage::Fetch, Stage::Decode, Stage::Execute, Stage::Memory, Stage::Writeback];
}

/// Why the held instruction can never execute
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    Undecodable,
    /// Fetching it missed in the page table
    PageFault(u64),
    /// Fetching it was rejected below the page table
    Access { address: u64, kind: MemoryErrorKind },
}

impl Fault {
    /// The fetch failures an instruction carries; anything else is fatal at once
    pub fn from_fetch(error: &MemoryError) -> Option<Self> {
        match *error {
            MemoryError::PageNotAllocated(address) => Some(Fault::PageFault(address)),
            MemoryError::AccessError { address, kind } => Some(Fault::Access { address, kind }),
            MemoryError::OutOfFrames(_) | MemoryError::CacheConfigError(_) => None,
        }
    }

    /// The error raised once the instruction reaches Execute
    pub fn into_error(self, raw_inst: u32, pc: u64) -> SimulatorError {
        match self {
            Fault::Undecodable => SimulatorError::InvalidInstructionError(raw_inst, pc),
            Fault::PageFault(address) => MemoryError::PageNotAllocated(address).into(),
            Fault::Access { address, kind } => MemoryError::AccessError { address, kind }.into(),
        }
    }
}

/// The input register of one stage
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PipelineRegister {
    /// Next address to fetch; only meaningful in front of Fetch
    pub pred_pc: u64,

    /// Address of the instruction held
    pub pc: u64,
    pub raw_inst: u32,
    pub inst: Instruction,
    /// Set when fetch or decode failed; raised if it ever executes
    pub fault: Option<Fault>,

    pub src_a: usize,
    pub src_b: usize,
    pub val_a: u64,
    pub val_b: u64,
    /// ALU result
    pub val_e: u64,
    /// Loaded value
    pub val_m: u64,
    /// Branch or jump target
    pub val_c: u64,
    /// Destination written with `val_e`
    pub dst_e: Option<usize>,
    /// Destination written with `val_m`
    pub dst_m: Option<usize>,

    pub predicted_taken: bool,

    pub bubble: bool,
    pub stall: bool,
}

impl PipelineRegister {
    pub fn bubble() -> Self {
        Self { bubble: true, ..Self::default() }
    }

    /// Whether an instruction flows through this register
    pub fn is_live(&self) -> bool {
        !self.bubble && !self.stall
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageRegisters([PipelineRegister; 5]);

impl Index<Stage> for StageRegisters {
    type Output = PipelineRegister;

    fn index(&self, stage: Stage) -> &PipelineRegister {
        &self.0[stage as usize]
    }
}

impl IndexMut<Stage> for StageRegisters {
    fn index_mut(&mut self, stage: Stage) -> &mut PipelineRegister {
        &mut self.0[stage as usize]
    }
}

/// Double-buffered pipeline registers.
/// Stages read `committed` and write `staged`; `commit` moves
/// staged values forward at the end of the cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Latches {
    pub committed: StageRegisters,
    pub staged: StageRegisters,
    /// Operands of `staged[Execute]` already forwarded this cycle
    pub forwarded_a: bool,
    pub forwarded_b: bool,
}

impl Latches {
    /// Fetch starts at `entry`; every other stage holds a bubble
    pub fn new(entry: u64) -> Self {
        let mut committed = StageRegisters([PipelineRegister::bubble(); 5]);
        committed[Stage::Fetch] =
            PipelineRegister { pred_pc: entry, ..PipelineRegister::default() };
        Self {
            committed,
            staged: StageRegisters([PipelineRegister::bubble(); 5]),
            forwarded_a: false,
            forwarded_b: false,
        }
    }

    /// Delivers `value` for `register` to the instruction about to
    /// execute, unless a younger producer already did
    pub fn forward(&mut self, register: usize, value: u64) -> bool {
        let next = &mut self.staged[Stage::Execute];
        if register == 0 || next.bubble {
            return false;
        }
        let mut hit = false;
        if !self.forwarded_a && next.src_a == register {
            next.val_a = value;
            self.forwarded_a = true;
            hit = true;
        }
        if !self.forwarded_b && next.src_b == register {
            next.val_b = value;
            self.forwarded_b = true;
            hit = true;
        }
        hit
    }

    /// Ends the cycle. Returns whether Fetch was stalled.
    pub fn commit(&mut self, pc: u64) -> bool {
        let fetch = &mut self.committed[Stage::Fetch];
        let fetch_stalled = fetch.stall;
        if fetch_stalled {
            fetch.stall = false;
            fetch.pred_pc = pc;
        }

        for stage in &Stage::ALL[1..] {
            let stage = *stage;
            if self.committed[stage].stall {
                self.committed[stage].stall = false;
            } else {
                self.committed[stage] = self.staged[stage];
            }
        }

        self.forwarded_a = false;
        self.forwarded_b = false;
        fetch_stalled
    }
}
