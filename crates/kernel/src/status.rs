use std::sync::PoisonError;

use memory::MemoryManager;
use process::PcbHandle;
use types::{timestamp, ProcessState};

use crate::table::ProcessTable;

/// One live process line of the status panel.
#[derive(Debug, Clone)]
pub struct ProcessRow {
    pub name: String,
    pub timestamp: String,
    pub core: i32,
    pub current_line: i32,
    pub total_lines: usize,
}

/// One finished process line.
#[derive(Debug, Clone)]
pub struct FinishedRow {
    pub name: String,
    pub timestamp: String,
    pub total_lines: usize,
}

/// Snapshot behind `screen -ls` and `report-util`.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    pub utilization: usize,
    pub cores_used: usize,
    pub cores_available: usize,
    pub running: Vec<ProcessRow>,
    pub finished: Vec<FinishedRow>,
}

/// Per-process view used by the attach screen.
#[derive(Debug, Clone)]
pub struct ProcessDetail {
    pub name: String,
    pub pid: i32,
    pub logs: Vec<String>,
    pub current_line: i32,
    pub total_lines: usize,
    pub finished: bool,
    pub violation: Option<ViolationRecord>,
}

#[derive(Debug, Clone)]
pub struct ViolationRecord {
    pub time: String,
    pub address: usize,
}

/// Memory and paging numbers behind `process-smi` and `vmstat`.
#[derive(Debug, Clone)]
pub struct MemoryReport {
    pub timestamp: String,
    pub utilization: usize,
    pub total_mib: usize,
    pub used_mib: usize,
    pub free_mib: usize,
    pub idle_ticks: u64,
    pub active_ticks: u64,
    pub paged_in: usize,
    pub paged_out: usize,
    /// Name and displayed MiB per registered process; any non-zero usage
    /// shows as at least 1 MiB.
    pub per_process: Vec<(String, usize)>,
}

/// Legacy utilization metric kept for output compatibility:
/// `min(live, num_cpu) * 100 / num_cpu`.
fn utilization(live: usize, num_cpu: usize, scheduler_active: bool) -> (usize, usize) {
    if !scheduler_active {
        return (0, 0);
    }
    let used = live.min(num_cpu);
    (used, used * 100 / num_cpu.max(1))
}

/// Build the live/finished listing under a brief table lock.
pub fn system_snapshot(
    table: &ProcessTable,
    num_cpu: usize,
    scheduler_active: bool,
) -> SystemSnapshot {
    let live = table.live_handles();
    let (cores_used, utilization) = utilization(live.len(), num_cpu, scheduler_active);

    let mut running: Vec<ProcessRow> = live.iter().map(|handle| live_row(handle, num_cpu)).collect();
    running.sort_by(|a, b| a.name.cmp(&b.name));

    let finished = table
        .finished_handles()
        .iter()
        .map(|handle| {
            let pcb = handle.lock().unwrap_or_else(PoisonError::into_inner);
            FinishedRow {
                name: pcb.process.name.clone(),
                timestamp: timestamp(),
                total_lines: pcb.flattened.len(),
            }
        })
        .collect();

    SystemSnapshot {
        utilization,
        cores_used,
        cores_available: num_cpu.saturating_sub(cores_used),
        running,
        finished,
    }
}

fn live_row(handle: &PcbHandle, num_cpu: usize) -> ProcessRow {
    let pcb = handle.lock().unwrap_or_else(PoisonError::into_inner);
    ProcessRow {
        name: pcb.process.name.clone(),
        timestamp: timestamp(),
        core: pcb.process.pid % num_cpu.max(1) as i32,
        current_line: pcb.program_counter,
        total_lines: pcb.total_lines(),
    }
}

/// Detail for one process, searching live then finished.
pub fn process_detail(table: &ProcessTable, name: &str) -> Option<ProcessDetail> {
    let (handle, from_finished) = table.find(name)?;
    let pcb = handle.lock().unwrap_or_else(PoisonError::into_inner);
    let violation = pcb.has_memory_violation.then(|| ViolationRecord {
        time: pcb.violation_time.clone(),
        address: pcb.violation_address,
    });
    Some(ProcessDetail {
        name: pcb.process.name.clone(),
        pid: pcb.process.pid,
        logs: pcb.logs.clone(),
        current_line: pcb.program_counter,
        total_lines: pcb.total_lines(),
        finished: from_finished || pcb.state == ProcessState::Terminated,
        violation,
    })
}

const MIB: usize = 1024 * 1024;

/// Memory summary with the display rounding the panels use: MiB floored,
/// except that any non-zero per-process usage shows as at least 1 MiB.
pub fn memory_report(
    table: &ProcessTable,
    memory: &MemoryManager,
    num_cpu: usize,
    scheduler_active: bool,
) -> MemoryReport {
    let stats = memory.stats();
    let (_, utilization) = utilization(table.live_count(), num_cpu, scheduler_active);

    let per_process = memory
        .all_process_memory()
        .into_iter()
        .map(|(pid, bytes)| {
            let name = find_name(table, pid).unwrap_or_else(|| format!("process{pid}"));
            let mut mib = bytes / MIB;
            if mib == 0 && bytes > 0 {
                mib = 1;
            }
            (name, mib)
        })
        .collect();

    MemoryReport {
        timestamp: timestamp(),
        utilization,
        total_mib: stats.total / MIB,
        used_mib: stats.used / MIB,
        free_mib: stats.free / MIB,
        idle_ticks: stats.idle_ticks,
        active_ticks: stats.active_ticks,
        paged_in: stats.paged_in,
        paged_out: stats.paged_out,
        per_process,
    }
}

fn find_name(table: &ProcessTable, pid: i32) -> Option<String> {
    table.live_handles().into_iter().find_map(|handle| {
        let pcb = handle.lock().unwrap_or_else(PoisonError::into_inner);
        (pcb.process.pid == pid).then(|| pcb.process.name.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use process::{Pcb, Process};

    fn table_with(names: &[&str]) -> ProcessTable {
        let table = ProcessTable::new();
        for (i, name) in names.iter().enumerate() {
            table
                .admit(Pcb::new(Process {
                    pid: i as i32,
                    name: name.to_string(),
                    instructions: Vec::new(),
                    memory_size: 256,
                }))
                .unwrap();
        }
        table
    }

    #[test]
    fn utilization_is_zero_when_scheduler_is_off() {
        let table = table_with(&["a", "b"]);
        let snapshot = system_snapshot(&table, 4, false);
        assert_eq!(snapshot.utilization, 0);
        assert_eq!(snapshot.cores_used, 0);
        assert_eq!(snapshot.cores_available, 4);
    }

    #[test]
    fn utilization_saturates_at_core_count() {
        let table = table_with(&["a", "b", "c", "d", "e"]);
        let snapshot = system_snapshot(&table, 4, true);
        assert_eq!(snapshot.utilization, 100);
        assert_eq!(snapshot.cores_used, 4);
        assert_eq!(snapshot.cores_available, 0);
        assert_eq!(snapshot.running.len(), 5);
    }

    #[test]
    fn detail_reports_violations() {
        let table = table_with(&["v"]);
        let (handle, _) = table.find("v").unwrap();
        handle.lock().unwrap().mark_violation(0x200);

        let detail = process_detail(&table, "v").unwrap();
        assert!(detail.finished);
        let violation = detail.violation.unwrap();
        assert_eq!(violation.address, 0x200);
        assert!(!violation.time.is_empty());
    }

    #[test]
    fn unknown_processes_have_no_detail() {
        let table = table_with(&[]);
        assert!(process_detail(&table, "ghost").is_none());
    }
}
