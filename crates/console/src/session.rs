use std::fs;
use std::path::PathBuf;

use kernel::{
    memory_report, process_detail, system_snapshot, Config, Kernel, KernelError, ProcessDetail,
    SchedulerKind, SchedulerMode,
};
use log::info;

use crate::command::{parse, Command};
use crate::render;

/// What the REPL should do after handling one line.
#[derive(Debug)]
pub enum Outcome {
    None,
    Message(String),
    /// Enter the interactive attach sub-loop for this process.
    Attach(String),
    Exit,
}

/// Console state: the kernel once `initialize` has run, plus file paths
/// from the command line.
pub struct Session {
    config_path: PathBuf,
    report_path: PathBuf,
    kernel: Option<Kernel>,
}

impl Session {
    pub fn new(config_path: PathBuf, report_path: PathBuf) -> Self {
        Self {
            config_path,
            report_path,
            kernel: None,
        }
    }

    pub fn handle_line(&mut self, line: &str) -> Outcome {
        match parse(line) {
            Ok(None) => Outcome::None,
            Ok(Some(command)) => self.dispatch(command),
            Err(err) => Outcome::Message(err.to_string()),
        }
    }

    /// Detail lookup for the attach sub-loop.
    pub fn process_detail(&self, name: &str) -> Option<ProcessDetail> {
        let kernel = self.kernel.as_ref()?;
        process_detail(kernel.table(), name)
    }

    fn dispatch(&mut self, command: Command) -> Outcome {
        // Only help and exit work before initialize.
        match command {
            Command::Help => return Outcome::Message(render::help_text().to_string()),
            Command::Exit => {
                if let Some(kernel) = self.kernel.as_mut() {
                    kernel.shutdown();
                }
                return Outcome::Exit;
            }
            Command::Initialize => return self.initialize(),
            _ => {}
        }
        let Some(kernel) = self.kernel.as_mut() else {
            return Outcome::Message("Please run 'initialize' first.".to_string());
        };

        match command {
            Command::ScreenCreate { name, bytes } => {
                match kernel.create_random_process(&name, bytes) {
                    Ok(()) => Outcome::Message(format!("Process {name} created with {bytes} bytes.")),
                    Err(err) => Outcome::Message(err.to_string()),
                }
            }
            Command::ScreenCustom {
                name,
                bytes,
                program,
            } => match kernel.create_user_process(&name, bytes, &program) {
                Ok(count) => Outcome::Message(format!(
                    "Process {name} created with {count} user-defined instructions."
                )),
                Err(KernelError::Parse(_)) | Err(KernelError::InstructionCount(_)) => {
                    Outcome::Message("invalid command".to_string())
                }
                Err(err) => Outcome::Message(err.to_string()),
            },
            Command::ScreenList => {
                let snapshot =
                    system_snapshot(kernel.table(), kernel.config().num_cpu, kernel.scheduler_active());
                Outcome::Message(render::snapshot_panel(&snapshot))
            }
            Command::ScreenAttach { name } => match process_detail(kernel.table(), &name) {
                None => Outcome::Message(format!("Process {name} not found.")),
                Some(detail) => match detail.violation {
                    Some(violation) => Outcome::Message(format!(
                        "Process {} shut down due to memory access violation error that occurred at {}. 0x{:X} invalid",
                        name, violation.time, violation.address
                    )),
                    None => Outcome::Attach(name),
                },
            },
            Command::SchedulerStart => {
                kernel.start_scheduler(SchedulerMode::Batch);
                Outcome::Message("Scheduler started.".to_string())
            }
            Command::SchedulerTest => {
                kernel.start_scheduler(SchedulerMode::Test);
                Outcome::Message("Scheduler test mode started.".to_string())
            }
            Command::SchedulerStop => {
                kernel.stop_scheduler();
                Outcome::Message("Scheduler stopped.".to_string())
            }
            Command::ReportUtil => {
                let snapshot =
                    system_snapshot(kernel.table(), kernel.config().num_cpu, kernel.scheduler_active());
                match fs::write(&self.report_path, render::snapshot_panel(&snapshot)) {
                    Ok(()) => Outcome::Message(format!(
                        "Report generated at {}",
                        self.report_path.display()
                    )),
                    Err(_) => Outcome::Message("Failed to write report file.".to_string()),
                }
            }
            Command::ProcessSmi => {
                let report = memory_report(
                    kernel.table(),
                    kernel.memory(),
                    kernel.config().num_cpu,
                    kernel.scheduler_active(),
                );
                Outcome::Message(render::smi_panel(&report))
            }
            Command::VmStat => {
                let report = memory_report(
                    kernel.table(),
                    kernel.memory(),
                    kernel.config().num_cpu,
                    kernel.scheduler_active(),
                );
                Outcome::Message(render::vmstat_panel(&report))
            }
            Command::Initialize | Command::Help | Command::Exit => unreachable!("handled above"),
        }
    }

    fn initialize(&mut self) -> Outcome {
        if self.kernel.is_some() {
            return Outcome::Message("Already initialized.".to_string());
        }
        match Config::load(&self.config_path) {
            Err(err) => Outcome::Message(err.to_string()),
            Ok(config) => {
                let scheduler_name = match config.scheduler {
                    SchedulerKind::Fcfs => "fcfs",
                    SchedulerKind::RoundRobin => "rr",
                };
                let message = format!(
                    "Initialized with {} CPUs, scheduler: {}",
                    config.num_cpu, scheduler_name
                );
                info!("console initializing kernel from {}", self.config_path.display());
                self.kernel = Some(Kernel::initialize(config));
                Outcome::Message(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            PathBuf::from("/nonexistent/config.txt"),
            PathBuf::from("/nonexistent/report.txt"),
        )
    }

    fn message(outcome: Outcome) -> String {
        match outcome {
            Outcome::Message(m) => m,
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn commands_are_gated_on_initialize() {
        let mut session = session();
        for line in ["screen -ls", "vmstat", "process-smi", "scheduler-start", "screen -s a"] {
            let reply = message(session.handle_line(line));
            assert_eq!(reply, "Please run 'initialize' first.", "line: {line}");
        }
    }

    #[test]
    fn help_and_exit_work_uninitialized() {
        let mut session = session();
        assert!(message(session.handle_line("help")).contains("Available commands"));
        assert!(matches!(session.handle_line("exit"), Outcome::Exit));
    }

    #[test]
    fn initialize_with_missing_config_stays_uninitialized() {
        let mut session = session();
        let reply = message(session.handle_line("initialize"));
        assert!(reply.contains("cannot open config file"));
        assert_eq!(
            message(session.handle_line("vmstat")),
            "Please run 'initialize' first."
        );
    }

    #[test]
    fn parse_errors_become_messages() {
        let mut session = session();
        assert_eq!(
            message(session.handle_line("frobnicate")),
            "Unknown command. Type 'help' for commands."
        );
        assert_eq!(
            message(session.handle_line("screen -s bad 100")),
            "invalid memory allocation"
        );
    }

    #[test]
    fn blank_lines_do_nothing() {
        let mut session = session();
        assert!(matches!(session.handle_line(""), Outcome::None));
    }
}
