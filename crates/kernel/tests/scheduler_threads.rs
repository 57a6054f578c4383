use std::sync::Arc;
use std::time::{Duration, Instant};

use kernel::{Config, CpuClock, ProcessTable, Scheduler, SchedulerKind, SchedulerMode};
use memory::MemoryManager;
use process::{next_pid, parse_program, Pcb, Process};
use types::ProcessState;

fn small_config(scheduler: SchedulerKind) -> Config {
    Config {
        num_cpu: 2,
        scheduler,
        quantum_cycles: 2,
        batch_process_freq: 20,
        min_ins: 1,
        max_ins: 5,
        delay_per_exec: 0,
        ..Config::default()
    }
}

fn build(
    config: &Config,
    dir: &tempfile::TempDir,
) -> (Arc<CpuClock>, Arc<MemoryManager>, Arc<ProcessTable>, Scheduler) {
    let clock = Arc::new(CpuClock::new());
    let memory = Arc::new(MemoryManager::new(
        1024 * 1024,
        1024,
        None,
        dir.path().join("store.txt"),
    ));
    let table = Arc::new(ProcessTable::new());
    let scheduler = Scheduler::new(
        config.clone(),
        Arc::clone(&clock),
        Arc::clone(&memory),
        Arc::clone(&table),
    );
    (clock, memory, table, scheduler)
}

fn admit_user_process(
    table: &ProcessTable,
    memory: &MemoryManager,
    name: &str,
    source: &str,
) -> i32 {
    let mut pcb = Pcb::new(Process {
        pid: next_pid(),
        name: name.to_string(),
        instructions: parse_program(source).unwrap(),
        memory_size: 256,
    });
    pcb.initialize_memory();
    let pid = pcb.process.pid;
    memory.allocate_process(pid, 256).unwrap();
    table.admit(pcb).unwrap();
    pid
}

fn wait_until_finished(table: &ProcessTable, name: &str, deadline: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if let Some((handle, finished)) = table.find(name) {
            if finished {
                return true;
            }
            drop(handle);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn fcfs_retires_a_user_process() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = small_config(SchedulerKind::Fcfs);
    let (clock, memory, table, mut scheduler) = build(&config, &dir);

    scheduler.start(SchedulerMode::Batch);
    admit_user_process(&table, &memory, "job", "DECLARE a 1; DECLARE b 2; ADD c a b");

    assert!(
        wait_until_finished(&table, "job", Duration::from_secs(5)),
        "process never finished"
    );
    let (handle, _) = table.find("job").unwrap();
    let pcb = handle.lock().unwrap();
    assert_eq!(pcb.state, ProcessState::Terminated);
    assert_eq!(pcb.read_variable("c"), 3);
    drop(pcb);

    scheduler.stop();
    assert!(!scheduler.is_active());
    assert!(clock.cycles() > 0);
    assert!(memory.stats().active_ticks > 0);
}

#[test]
fn round_robin_retires_processes_too() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = small_config(SchedulerKind::RoundRobin);
    let (_clock, memory, table, mut scheduler) = build(&config, &dir);

    scheduler.start(SchedulerMode::Batch);
    let statements: Vec<String> = (0..10).map(|i| format!("DECLARE v{i} {i}")).collect();
    admit_user_process(&table, &memory, "rrjob", &statements.join("; "));

    assert!(
        wait_until_finished(&table, "rrjob", Duration::from_secs(5)),
        "process never finished under round robin"
    );
    scheduler.stop();
}

#[test]
fn sleeping_process_stays_live_and_parked() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = small_config(SchedulerKind::Fcfs);
    let (_clock, memory, table, mut scheduler) = build(&config, &dir);

    scheduler.start(SchedulerMode::Batch);
    // Sleep re-runs after every wake (it does not advance the PC), so this
    // process never terminates; it must keep cycling Blocked/Ready instead.
    admit_user_process(&table, &memory, "sleeper", "SLEEP 3");

    std::thread::sleep(Duration::from_millis(300));
    let (handle, finished) = table.find("sleeper").expect("sleeper disappeared");
    assert!(!finished);
    let state = handle.lock().unwrap().state;
    assert_ne!(state, ProcessState::Terminated);
    scheduler.stop();
}

#[test]
fn generator_populates_the_table() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = small_config(SchedulerKind::Fcfs);
    let (_clock, _memory, table, mut scheduler) = build(&config, &dir);

    scheduler.start(SchedulerMode::Batch);
    let start = Instant::now();
    let mut seen_any = false;
    while start.elapsed() < Duration::from_secs(5) {
        if table.live_count() > 0 || !table.finished_handles().is_empty() {
            seen_any = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    scheduler.stop();
    assert!(seen_any, "generator produced no processes");
}

#[test]
fn start_and_stop_are_idempotent() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = small_config(SchedulerKind::Fcfs);
    let (_clock, _memory, _table, mut scheduler) = build(&config, &dir);

    scheduler.start(SchedulerMode::Batch);
    scheduler.start(SchedulerMode::Test);
    assert!(scheduler.is_active());
    scheduler.stop();
    scheduler.stop();
    assert!(!scheduler.is_active());
}
