mod command;
mod render;
mod session;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::session::{Outcome, Session};

/// Interactive console for the multi-core OS emulator.
#[derive(Debug, Parser)]
#[command(name = "osemu")]
struct Args {
    /// Key/value configuration file read by `initialize`.
    #[arg(long, default_value = "config.txt")]
    config: PathBuf,

    /// Destination of the `report-util` snapshot.
    #[arg(long, default_value = "csopesy-log.txt")]
    log_file: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut session = Session::new(args.config, args.log_file);

    println!("Welcome to the OS emulator console. Type 'help' for commands.");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        prompt("> ")?;
        let Some(line) = lines.next() else { break };
        let line = line.context("reading command input")?;
        match session.handle_line(&line) {
            Outcome::None => {}
            Outcome::Message(message) => println!("{message}"),
            Outcome::Attach(name) => attach_loop(&session, &name, &mut lines)?,
            Outcome::Exit => {
                println!("Exiting console.");
                break;
            }
        }
    }
    Ok(())
}

fn prompt(text: &str) -> Result<()> {
    print!("{text}");
    io::stdout().flush().context("flushing prompt")?;
    Ok(())
}

/// `screen -r` sub-loop: only `process-smi` and `exit` are understood.
fn attach_loop(
    session: &Session,
    name: &str,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<()> {
    println!("Attached to {name}. Type 'process-smi' or 'exit'.");
    loop {
        prompt(&format!("{name}> "))?;
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let line = line.context("reading screen input")?;
        match line.trim().to_lowercase().as_str() {
            "process-smi" => match session.process_detail(name) {
                Some(detail) => println!("{}", render::detail_panel(&detail)),
                None => println!("Process {name} not found."),
            },
            "exit" => {
                println!("Detached from {name}");
                return Ok(());
            }
            "" => {}
            _ => println!("Unknown command in screen. Use 'process-smi' or 'exit'."),
        }
    }
}
