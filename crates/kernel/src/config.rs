use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::warn;
use thiserror::Error;
use types::{MAX_MEMORY_SIZE, MIN_MEMORY_SIZE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot open config file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
    #[error("unknown scheduler '{0}' (expected \"fcfs\" or \"rr\")")]
    UnknownScheduler(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Fcfs,
    RoundRobin,
}

/// Immutable tunables read from the whitespace key/value config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub num_cpu: usize,
    pub scheduler: SchedulerKind,
    pub quantum_cycles: u32,
    /// Milliseconds between generator batches.
    pub batch_process_freq: u64,
    pub min_ins: usize,
    pub max_ins: usize,
    /// Milliseconds between instruction steps on a core.
    pub delay_per_exec: u64,
    /// Total simulated memory, MiB.
    pub max_overall_mem: usize,
    /// Frame size, KiB.
    pub mem_per_frame: usize,
    /// Per-process memory bounds for generated processes, KiB.
    pub min_mem_per_proc: usize,
    pub max_mem_per_proc: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_cpu: 4,
            scheduler: SchedulerKind::Fcfs,
            quantum_cycles: 5,
            batch_process_freq: 1,
            min_ins: 1000,
            max_ins: 2000,
            delay_per_exec: 0,
            max_overall_mem: 16,
            mem_per_frame: 1,
            min_mem_per_proc: 4,
            max_mem_per_proc: 64,
        }
    }
}

impl Config {
    /// Parse `key value` lines; values may be double-quoted. Unknown keys
    /// are skipped with a warning so newer config files stay loadable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Config::default();
        for line in text.lines() {
            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else { continue };
            let Some(value) = tokens.next() else { continue };
            let value = value.trim_matches('"');
            match key {
                "num-cpu" => config.num_cpu = parse_value(key, value)?,
                "scheduler" => {
                    config.scheduler = match value {
                        "fcfs" => SchedulerKind::Fcfs,
                        "rr" => SchedulerKind::RoundRobin,
                        other => return Err(ConfigError::UnknownScheduler(other.to_string())),
                    }
                }
                "quantum-cycles" => config.quantum_cycles = parse_value(key, value)?,
                "batch-process-freq" => config.batch_process_freq = parse_value(key, value)?,
                "min-ins" => config.min_ins = parse_value(key, value)?,
                "max-ins" => config.max_ins = parse_value(key, value)?,
                "delay-per-exec" => config.delay_per_exec = parse_value(key, value)?,
                "max-overall-mem" => config.max_overall_mem = parse_value(key, value)?,
                "mem-per-frame" => config.mem_per_frame = parse_value(key, value)?,
                "min-mem-per-proc" => config.min_mem_per_proc = parse_value(key, value)?,
                "max-mem-per-proc" => config.max_mem_per_proc = parse_value(key, value)?,
                other => warn!("ignoring unknown config key '{other}'"),
            }
        }
        Ok(config)
    }

    pub fn total_memory_bytes(&self) -> usize {
        self.max_overall_mem * 1024 * 1024
    }

    pub fn page_size_bytes(&self) -> usize {
        self.mem_per_frame.max(1) * 1024
    }

    pub fn max_mem_per_proc_bytes(&self) -> usize {
        (self.max_mem_per_proc * 1024).clamp(MIN_MEMORY_SIZE, MAX_MEMORY_SIZE)
    }

    pub fn min_mem_per_proc_bytes(&self) -> usize {
        (self.min_mem_per_proc * 1024).clamp(MIN_MEMORY_SIZE, self.max_mem_per_proc_bytes())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
