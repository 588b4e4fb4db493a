use std::path::PathBuf;
use std::str::FromStr;

use crate::pipelined::branch_predictor::PredictorHeuristic;

/// Configuration file read when none is given
pub const DEFAULT_CONFIG: &str = "default.cfg";

xflags::xflags! {
    /// Cycle-approximate RISC-V RV64IM pipeline simulator.
    cmd SimArgs {
        /// Path to the ELF file to simulate.
        required elf_file: PathBuf

        /// Cache and latency configuration file (default.cfg if omitted).
        optional -c, --config path: PathBuf

        /// Specifies the branch prediction heuristic.
        /// AT: Always taken
        /// ANT: Always not taken (default)
        /// BI: Bimodal 2-bit counters
        /// SA: Self-adjusting, history-indexed counters
        optional -p, --prediction heuristic: HeuristicArg

        /// Prints a per-cycle pipeline trace.
        optional -v, --verbose

        /// Gives up after this many pipeline cycles.
        optional --max-cycles limit: u64
    }
}

impl SimArgs {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
    }

    pub fn heuristic(&self) -> PredictorHeuristic {
        self.prediction.map(PredictorHeuristic::from).unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeuristicArg(PredictorHeuristic);

impl FromStr for HeuristicArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.to_uppercase();
        PredictorHeuristic::ALL
            .iter()
            .find(|heuristic| heuristic.code() == code)
            .map(|&heuristic| HeuristicArg(heuristic))
            .ok_or_else(|| {
                format!(
                    "Invalid branch prediction heuristic: '{}'. Expected AT, ANT, BI or SA.",
                    s
                )
            })
    }
}

impl From<HeuristicArg> for PredictorHeuristic {
    fn from(val: HeuristicArg) -> Self {
        val.0
    }
}
