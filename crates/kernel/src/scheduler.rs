use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use memory::MemoryManager;
use process::{random_process, PcbHandle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use types::{log_format, ProcessState, MAX_MEMORY_SIZE, MIN_MEMORY_SIZE};

use crate::clock::CpuClock;
use crate::config::{Config, SchedulerKind};
use crate::table::ProcessTable;

/// How long a worker waits on the ready condvar before re-checking flags.
const READY_WAIT: Duration = Duration::from_millis(10);

/// Sleep-watcher cadence.
const WATCHER_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    Batch,
    Test,
}

/// What a worker does with a PCB after its execution slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Terminated: retire to the finished list and release its pages.
    Finished,
    /// Still Ready (quantum expired or scheduler stopping): re-enqueue.
    Preempted,
    /// Blocked on sleep: the watcher will re-enqueue it.
    Blocked,
}

/// Owns the generator, sleep-watcher and core-worker threads.
///
/// `start` is idempotent; `stop` flips the shared flag, pokes the condvar
/// and joins everything. All loops poll the flag at least once per
/// iteration and every sleep is short, so shutdown latency stays bounded.
pub struct Scheduler {
    config: Config,
    clock: Arc<CpuClock>,
    memory: Arc<MemoryManager>,
    table: Arc<ProcessTable>,
    active: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(
        config: Config,
        clock: Arc<CpuClock>,
        memory: Arc<MemoryManager>,
        table: Arc<ProcessTable>,
    ) -> Self {
        Self {
            config,
            clock,
            memory,
            table,
            active: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Launch the generator, the sleep watcher and `num_cpu` workers.
    /// A second start while running is a no-op.
    pub fn start(&mut self, mode: SchedulerMode) {
        if self.active.swap(true, Ordering::SeqCst) {
            debug!("scheduler already running, ignoring start");
            return;
        }
        info!(
            "starting scheduler: {} cores, {:?}, mode {:?}",
            self.config.num_cpu, self.config.scheduler, mode
        );

        self.threads.push(self.spawn_generator(mode));
        self.threads.push(self.spawn_sleep_watcher());
        for core_id in 0..self.config.num_cpu.max(1) {
            self.threads.push(self.spawn_worker(core_id));
        }
    }

    /// Signal every thread and join them. A stop without a start is a no-op.
    pub fn stop(&mut self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.table.notify_all();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("scheduler thread exited by panic");
            }
        }
        info!("scheduler stopped");
    }

    fn spawn_generator(&self, mode: SchedulerMode) -> JoinHandle<()> {
        let config = self.config.clone();
        let active = Arc::clone(&self.active);
        let clock = Arc::clone(&self.clock);
        let memory = Arc::clone(&self.memory);
        let table = Arc::clone(&self.table);
        thread::spawn(move || {
            let mut rng = StdRng::from_entropy();
            debug!("generator up in {mode:?} mode");
            while active.load(Ordering::SeqCst) {
                let name = next_process_name();
                let memory_size = random_memory_size(&mut rng, &config);
                let pcb = random_process(
                    name.clone(),
                    memory_size,
                    config.min_ins,
                    config.max_ins,
                    &mut rng,
                );
                let pid = pcb.process.pid;
                match memory.allocate_process(pid, memory_size) {
                    Ok(()) => {
                        if let Err(err) = table.admit(pcb) {
                            warn!("generator skipped {name}: {err}");
                            memory.deallocate_process(pid);
                        }
                    }
                    Err(err) => warn!("generator could not allocate {name}: {err}"),
                }
                // Batch pause, sliced into 1 ms ticks so stop stays prompt.
                for _ in 0..config.batch_process_freq.max(1) {
                    if !active.load(Ordering::SeqCst) {
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                    clock.tick();
                }
            }
        })
    }

    fn spawn_sleep_watcher(&self) -> JoinHandle<()> {
        let active = Arc::clone(&self.active);
        let table = Arc::clone(&self.table);
        thread::spawn(move || {
            while active.load(Ordering::SeqCst) {
                table.wake_sleepers();
                thread::sleep(WATCHER_TICK);
            }
        })
    }

    fn spawn_worker(&self, core_id: usize) -> JoinHandle<()> {
        let config = self.config.clone();
        let active = Arc::clone(&self.active);
        let clock = Arc::clone(&self.clock);
        let memory = Arc::clone(&self.memory);
        let table = Arc::clone(&self.table);
        thread::spawn(move || {
            while active.load(Ordering::SeqCst) {
                let Some(handle) = table.pop_ready(READY_WAIT) else {
                    memory.update_cpu_ticks(true);
                    continue;
                };
                match run_slice(core_id, &handle, &config, &active, &clock, &memory) {
                    Disposition::Finished => {
                        let pid = handle
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .process
                            .pid;
                        memory.deallocate_process(pid);
                        table.finish(&handle);
                    }
                    Disposition::Preempted => table.enqueue(handle),
                    Disposition::Blocked => {}
                }
            }
        })
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One scheduling slice on a dequeued PCB.
///
/// FCFS runs until the PCB blocks or terminates (or the scheduler stops);
/// round robin caps the slice at `max(1, quantum_cycles)` steps. Each step
/// is fenced with `catch_unwind` so an unexpected panic retires only the
/// affected PCB.
pub fn run_slice(
    core_id: usize,
    handle: &PcbHandle,
    config: &Config,
    active: &AtomicBool,
    clock: &CpuClock,
    memory: &MemoryManager,
) -> Disposition {
    let quantum = match config.scheduler {
        SchedulerKind::Fcfs => None,
        SchedulerKind::RoundRobin => Some(config.quantum_cycles.max(1)),
    };
    let mut steps = 0u32;
    loop {
        let state = {
            let mut pcb = handle.lock().unwrap_or_else(PoisonError::into_inner);
            if pcb.state == ProcessState::Blocked || pcb.sleep_ticks > 0 {
                return Disposition::Blocked;
            }
            let step = catch_unwind(AssertUnwindSafe(|| {
                vm::execute(&mut pcb, core_id, Some(memory));
            }));
            if step.is_err() {
                let message = log_format(core_id, "Unexpected failure during execution");
                pcb.logs.push(message);
                let address = pcb.program_counter.max(0) as usize;
                pcb.mark_violation(address);
            }
            pcb.state
        };
        clock.tick();
        memory.update_cpu_ticks(false);

        match state {
            ProcessState::Terminated => return Disposition::Finished,
            ProcessState::Blocked => return Disposition::Blocked,
            _ => {}
        }

        steps += 1;
        if let Some(quantum) = quantum {
            if steps >= quantum {
                return Disposition::Preempted;
            }
        }
        if !active.load(Ordering::SeqCst) {
            return Disposition::Preempted;
        }
        thread::sleep(Duration::from_millis(config.delay_per_exec.max(1)));
    }
}

static NEXT_PROCESS_NUMBER: AtomicU32 = AtomicU32::new(1);

/// Deterministic generator names: p01, p02, …
fn next_process_name() -> String {
    let n = NEXT_PROCESS_NUMBER.fetch_add(1, Ordering::SeqCst);
    format!("p{n:02}")
}

/// Random power-of-two size within the configured per-process band.
fn random_memory_size(rng: &mut impl Rng, config: &Config) -> usize {
    let min = config
        .min_mem_per_proc_bytes()
        .clamp(MIN_MEMORY_SIZE, MAX_MEMORY_SIZE)
        .next_power_of_two();
    let max = config
        .max_mem_per_proc_bytes()
        .clamp(min, MAX_MEMORY_SIZE);
    let low = min.trailing_zeros();
    let high = prev_power_of_two(max).trailing_zeros().max(low);
    1usize << rng.gen_range(low..=high)
}

fn prev_power_of_two(value: usize) -> usize {
    if value.is_power_of_two() {
        value
    } else {
        value.next_power_of_two() >> 1
    }
}
