pub mod clock;
pub mod config;
pub mod scheduler;
pub mod status;
pub mod table;

use std::sync::Arc;

use log::info;
use memory::{MemoryManager, BACKING_STORE_FILE};
use process::{next_pid, parse_program, random_process, Pcb, Process};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

pub use clock::CpuClock;
pub use config::{Config, ConfigError, SchedulerKind};
pub use scheduler::{run_slice, Disposition, Scheduler, SchedulerMode};
pub use status::{
    memory_report, process_detail, system_snapshot, MemoryReport, ProcessDetail, SystemSnapshot,
};
pub use table::{ProcessTable, TableError};

/// Limits on `screen -c` programs.
pub const MIN_USER_INSTRUCTIONS: usize = 1;
pub const MAX_USER_INSTRUCTIONS: usize = 50;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Memory(#[from] memory::MemoryError),
    #[error(transparent)]
    Parse(#[from] process::ParseError),
    #[error("instruction count {0} outside 1..=50")]
    InstructionCount(usize),
}

/// The simulated-OS context: config, clock, memory manager, process table
/// and the scheduler, built by `initialize` and threaded explicitly through
/// everything that needs them.
pub struct Kernel {
    config: Config,
    clock: Arc<CpuClock>,
    memory: Arc<MemoryManager>,
    table: Arc<ProcessTable>,
    scheduler: Scheduler,
}

impl Kernel {
    /// Build the memory manager from the config and start the scheduler.
    pub fn initialize(config: Config) -> Self {
        let memory = Arc::new(MemoryManager::new(
            config.total_memory_bytes(),
            config.page_size_bytes(),
            Some(config.max_mem_per_proc_bytes()),
            BACKING_STORE_FILE,
        ));
        let clock = Arc::new(CpuClock::new());
        let table = Arc::new(ProcessTable::new());
        let mut scheduler = Scheduler::new(
            config.clone(),
            Arc::clone(&clock),
            Arc::clone(&memory),
            Arc::clone(&table),
        );
        scheduler.start(SchedulerMode::Batch);
        info!(
            "kernel initialized: {} cores, {:?} scheduler",
            config.num_cpu, config.scheduler
        );
        Self {
            config,
            clock,
            memory,
            table,
            scheduler,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &CpuClock {
        &self.clock
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub fn scheduler_active(&self) -> bool {
        self.scheduler.is_active()
    }

    pub fn start_scheduler(&mut self, mode: SchedulerMode) {
        self.scheduler.start(mode);
    }

    pub fn stop_scheduler(&mut self) {
        self.scheduler.stop();
    }

    /// `screen -s`: a randomly-programmed process with the given memory.
    pub fn create_random_process(&self, name: &str, bytes: usize) -> Result<(), KernelError> {
        let mut rng = StdRng::from_entropy();
        let pcb = random_process(
            name.to_string(),
            bytes,
            self.config.min_ins,
            self.config.max_ins,
            &mut rng,
        );
        self.admit(pcb, bytes)
    }

    /// `screen -c`: parse a user program and admit it. Returns the
    /// instruction count on success.
    pub fn create_user_process(
        &self,
        name: &str,
        bytes: usize,
        source: &str,
    ) -> Result<usize, KernelError> {
        let instructions = parse_program(source)?;
        let count = instructions.len();
        if !(MIN_USER_INSTRUCTIONS..=MAX_USER_INSTRUCTIONS).contains(&count) {
            return Err(KernelError::InstructionCount(count));
        }
        let mut pcb = Pcb::new(Process {
            pid: next_pid(),
            name: name.to_string(),
            instructions,
            memory_size: bytes,
        });
        pcb.initialize_memory();
        self.admit(pcb, bytes)?;
        Ok(count)
    }

    fn admit(&self, pcb: Pcb, bytes: usize) -> Result<(), KernelError> {
        let pid = pcb.process.pid;
        self.memory.allocate_process(pid, bytes)?;
        if let Err(err) = self.table.admit(pcb) {
            self.memory.deallocate_process(pid);
            return Err(err.into());
        }
        Ok(())
    }

    /// Cooperative shutdown: stop and join every scheduler thread.
    pub fn shutdown(&mut self) {
        self.scheduler.stop();
    }
}
