use std::fmt::Write;

use kernel::{MemoryReport, ProcessDetail, SystemSnapshot};

/// The `screen -ls` / `report-util` panel.
pub fn snapshot_panel(snapshot: &SystemSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "CPU utilization: {}%", snapshot.utilization);
    let _ = writeln!(out, "Cores used: {}", snapshot.cores_used);
    let _ = writeln!(out, "Cores available: {}", snapshot.cores_available);
    let _ = writeln!(out);
    let _ = writeln!(out, "Running processes:");
    for row in &snapshot.running {
        let _ = writeln!(
            out,
            "{}    {}    Core: {}    {} / {}",
            row.name, row.timestamp, row.core, row.current_line, row.total_lines
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Finished processes:");
    for row in &snapshot.finished {
        let _ = writeln!(
            out,
            "{}    {}    Finished    {} / {}",
            row.name, row.timestamp, row.total_lines, row.total_lines
        );
    }
    out
}

/// Per-process view printed by `process-smi` inside an attach session.
pub fn detail_panel(detail: &ProcessDetail) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Process name: {}", detail.name);
    let _ = writeln!(out, "ID: {}", detail.pid);
    let _ = writeln!(out, "Logs:");
    for line in &detail.logs {
        let _ = writeln!(out, "{line}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Current instruction line: {}", detail.current_line);
    let _ = writeln!(out, "Lines of code: {}", detail.total_lines);
    if detail.finished {
        let _ = writeln!(out);
        let _ = writeln!(out, "Finished!");
    }
    out
}

const RULE: &str = "=============================================";
const THIN_RULE: &str = "---------------------------------------------";

/// The global `process-smi` summary panel.
pub fn smi_panel(report: &MemoryReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, " PROCESS-SMI {}", report.timestamp);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "CPU-Util: {}%", report.utilization);
    let _ = writeln!(
        out,
        "Memory Usage: {}MiB / {}MiB",
        report.used_mib, report.total_mib
    );
    let memory_util = if report.total_mib > 0 {
        report.used_mib * 100 / report.total_mib
    } else {
        0
    };
    let _ = writeln!(out, "Memory Util: {memory_util}%");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Running processes and memory usage:");
    let _ = writeln!(out, "{THIN_RULE}");
    if report.per_process.is_empty() {
        let _ = writeln!(out, "No processes currently allocated in memory.");
    } else {
        for (name, mib) in &report.per_process {
            let _ = writeln!(out, "{name:<15}{mib:>10}MiB");
        }
    }
    let _ = writeln!(out, "{RULE}");
    out
}

/// The `vmstat` panel.
pub fn vmstat_panel(report: &MemoryReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, " VMSTAT {}", report.timestamp);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Total memory: {} MiB", report.total_mib);
    let _ = writeln!(out, "Used memory:  {} MiB", report.used_mib);
    let _ = writeln!(out, "Free memory:  {} MiB", report.free_mib);
    let _ = writeln!(out, "Idle cpu ticks: {}", report.idle_ticks);
    let _ = writeln!(out, "Active cpu ticks: {}", report.active_ticks);
    let _ = writeln!(
        out,
        "Total cpu ticks: {}",
        report.idle_ticks + report.active_ticks
    );
    let _ = writeln!(out, "Num paged in: {}", report.paged_in);
    let _ = writeln!(out, "Num paged out: {}", report.paged_out);
    let _ = writeln!(out, "{RULE}");
    out
}

pub fn help_text() -> &'static str {
    "Available commands:\n\
     initialize - read the config file and start the scheduler\n\
     screen -s <name> [mem_size] - create process (mem_size: 64-65536, power of 2)\n\
     screen -c <name> <mem_size> \"<instructions>\" - create process with custom instructions\n\
     screen -ls - list processes\n\
     screen -r <name> - attach to process\n\
     scheduler-start - start scheduler\n\
     scheduler-test - start scheduler in test mode\n\
     scheduler-stop - stop scheduler\n\
     report-util - generate report\n\
     process-smi - show memory and process info\n\
     vmstat - show virtual memory statistics\n\
     help - show this message\n\
     exit - quit program"
}
