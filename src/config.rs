//! Simulator configuration: cache geometry, storage latencies
//! and per-instruction execution latencies

use std::collections::HashMap;
use std::path::Path;

use crate::error::{SimulatorError, SimulatorResult};
use crate::instruction::Function;
use crate::memory::cache::CacheConfig;
use crate::memory::StorageLatency;

pub const LEVEL_NAMES: [&str; 3] = ["L1", "L2", "LLC"];

/// Geometry and timing of one cache level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelConfig {
    pub cache: CacheConfig,
    pub latency: StorageLatency,
}

/// Ticks each instruction spends in Execute; 1 unless overridden
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LatencyTable {
    overrides: HashMap<Function, u64>,
}

impl LatencyTable {
    pub fn get(&self, function: Function) -> u64 {
        self.overrides.get(&function).copied().unwrap_or(1)
    }

    pub fn set(&mut self, function: Function, ticks: u64) {
        self.overrides.insert(function, ticks);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimConfig {
    pub memory_latency: StorageLatency,
    /// L1, L2, LLC
    pub levels: [LevelConfig; 3],
    pub latency: LatencyTable,
}

impl Default for SimConfig {
    fn default() -> Self {
        let level = |hit_latency| LevelConfig {
            cache: CacheConfig::default(),
            latency: StorageLatency::new(hit_latency, 0),
        };
        Self {
            memory_latency: StorageLatency::new(0, 50),
            levels: [level(1), level(1), level(20)],
            latency: LatencyTable::default(),
        }
    }
}

fn parse_numbers(
    fields: &[&str],
    count: usize,
    line_num: usize,
) -> SimulatorResult<Vec<u64>> {
    if fields.len() < count {
        return Err(SimulatorError::ConfigError(format!(
            "line {}: expected {} numbers, found {}",
            line_num + 1,
            count,
            fields.len()
        )));
    }
    fields[..count]
        .iter()
        .map(|field| {
            field.parse::<u64>().map_err(|_| {
                SimulatorError::ConfigError(format!(
                    "line {}: '{}' is not a number",
                    line_num + 1,
                    field
                ))
            })
        })
        .collect()
}

fn level_index(name: &str) -> Option<usize> {
    LEVEL_NAMES.iter().position(|&level| level == name)
}

impl SimConfig {
    /// Reads a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> SimulatorResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        log::info!("reading configuration from {}", path.as_ref().display());
        Self::parse(&content)
    }

    /// Parses configuration text on top of the defaults.
    /// Lines starting with '/', '*' or a space are comments.
    pub fn parse(content: &str) -> SimulatorResult<Self> {
        let mut config = Self::default();

        for (line_num, line) in content.lines().enumerate() {
            if line.trim().is_empty() || line.starts_with(&['/', '*', ' '][..]) {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            let key = fields[0];
            let args = &fields[1..];

            if key == "Mem_Latency" {
                let n = parse_numbers(args, 2, line_num)?;
                config.memory_latency = StorageLatency::new(n[0], n[1]);
                continue;
            }

            if let Some((level, setting)) = key.split_once('_') {
                if let Some(index) = level_index(level) {
                    match setting {
                        "Latency" => {
                            let n = parse_numbers(args, 2, line_num)?;
                            config.levels[index].latency =
                                StorageLatency::new(n[0], n[1]);
                            continue;
                        }
                        "Config" => {
                            let n = parse_numbers(args, 4, line_num)?;
                            config.levels[index].cache = CacheConfig::make(
                                n[0] as usize,
                                n[1] as usize,
                                n[2] != 0,
                                n[3] != 0,
                            )?;
                            continue;
                        }
                        _ => {}
                    }
                }
            }

            match Function::from_mnemonic(key) {
                Some(function) => {
                    let n = parse_numbers(args, 1, line_num)?;
                    config.latency.set(function, n[0]);
                }
                None => log::warn!(
                    "line {}: unknown instruction '{}' ignored",
                    line_num + 1,
                    key
                ),
            }
        }

        Ok(config)
    }
}
