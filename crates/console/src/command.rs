use thiserror::Error;
use types::{is_valid_memory_size, DEFAULT_PROCESS_MEMORY};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command. Type 'help' for commands.")]
    Unknown,
    #[error("Usage: screen -s <name> [mem_size] | screen -c <name> <mem_size> \"<instructions>\" | screen -ls | screen -r <name>")]
    ScreenUsage,
    #[error("invalid memory allocation")]
    InvalidMemorySize,
}

/// Structured requests delivered over the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Initialize,
    ScreenCreate { name: String, bytes: usize },
    ScreenCustom { name: String, bytes: usize, program: String },
    ScreenList,
    ScreenAttach { name: String },
    SchedulerStart,
    SchedulerTest,
    SchedulerStop,
    ReportUtil,
    ProcessSmi,
    VmStat,
    Help,
    Exit,
}

/// Tokenize one input line into a command. Memory sizes are validated here
/// (power of two in [64, 65536]); everything semantic happens later.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        return Ok(None);
    };

    let command = match first.to_lowercase().as_str() {
        "initialize" => Command::Initialize,
        "screen" => parse_screen(line, &tokens)?,
        "scheduler-start" => Command::SchedulerStart,
        "scheduler-test" => Command::SchedulerTest,
        "scheduler-stop" => Command::SchedulerStop,
        "report-util" => Command::ReportUtil,
        "process-smi" => Command::ProcessSmi,
        "vmstat" => Command::VmStat,
        "help" => Command::Help,
        "exit" => Command::Exit,
        _ => return Err(CommandError::Unknown),
    };
    Ok(Some(command))
}

fn parse_screen(line: &str, tokens: &[&str]) -> Result<Command, CommandError> {
    match tokens.get(1).copied() {
        Some("-ls") => Ok(Command::ScreenList),
        Some("-r") => {
            let name = tokens.get(2).ok_or(CommandError::ScreenUsage)?;
            Ok(Command::ScreenAttach {
                name: name.to_string(),
            })
        }
        Some("-s") => {
            let name = tokens.get(2).ok_or(CommandError::ScreenUsage)?;
            let bytes = match tokens.get(3) {
                Some(raw) => parse_memory_size(raw)?,
                None => DEFAULT_PROCESS_MEMORY,
            };
            Ok(Command::ScreenCreate {
                name: name.to_string(),
                bytes,
            })
        }
        Some("-c") => {
            let name = tokens.get(2).ok_or(CommandError::ScreenUsage)?;
            let bytes = parse_memory_size(tokens.get(3).ok_or(CommandError::ScreenUsage)?)?;
            let program = extract_program(line, tokens).ok_or(CommandError::ScreenUsage)?;
            Ok(Command::ScreenCustom {
                name: name.to_string(),
                bytes,
                program,
            })
        }
        _ => Err(CommandError::ScreenUsage),
    }
}

fn parse_memory_size(raw: &str) -> Result<usize, CommandError> {
    let bytes: usize = raw.parse().map_err(|_| CommandError::InvalidMemorySize)?;
    if !is_valid_memory_size(bytes) {
        return Err(CommandError::InvalidMemorySize);
    }
    Ok(bytes)
}

/// The instruction string is everything between the outermost quotes, or
/// the bare remainder after the memory size when the caller skipped them.
fn extract_program(line: &str, tokens: &[&str]) -> Option<String> {
    if let Some(open) = line.find('"') {
        let close = line.rfind('"')?;
        if close > open {
            let program = line[open + 1..close].trim();
            return (!program.is_empty()).then(|| program.to_string());
        }
        return None;
    }
    // Unquoted fallback: join whatever follows the size token.
    let rest = tokens.get(4..)?.join(" ");
    let rest = rest.trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_lines_are_silent() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn bare_commands_parse() {
        assert_eq!(parse("initialize").unwrap(), Some(Command::Initialize));
        assert_eq!(parse("scheduler-start").unwrap(), Some(Command::SchedulerStart));
        assert_eq!(parse("VMSTAT").unwrap(), Some(Command::VmStat));
        assert_eq!(parse("exit").unwrap(), Some(Command::Exit));
    }

    #[test]
    fn screen_create_defaults_to_256_bytes() {
        assert_eq!(
            parse("screen -s worker").unwrap(),
            Some(Command::ScreenCreate {
                name: "worker".to_string(),
                bytes: 256
            })
        );
        assert_eq!(
            parse("screen -s worker 1024").unwrap(),
            Some(Command::ScreenCreate {
                name: "worker".to_string(),
                bytes: 1024
            })
        );
    }

    #[test]
    fn screen_create_rejects_bad_sizes() {
        assert_eq!(parse("screen -s w 100"), Err(CommandError::InvalidMemorySize));
        assert_eq!(parse("screen -s w 32"), Err(CommandError::InvalidMemorySize));
        assert_eq!(parse("screen -s w lots"), Err(CommandError::InvalidMemorySize));
        assert_eq!(parse("screen -s w 131072"), Err(CommandError::InvalidMemorySize));
    }

    #[test]
    fn screen_custom_extracts_the_quoted_program() {
        let parsed = parse("screen -c calc 256 \"DECLARE x 5; PRINT \"x\"\"").unwrap();
        match parsed {
            Some(Command::ScreenCustom { name, bytes, program }) => {
                assert_eq!(name, "calc");
                assert_eq!(bytes, 256);
                assert_eq!(program, "DECLARE x 5; PRINT \"x\"");
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn screen_attach_and_list() {
        assert_eq!(
            parse("screen -r p01").unwrap(),
            Some(Command::ScreenAttach {
                name: "p01".to_string()
            })
        );
        assert_eq!(parse("screen -ls").unwrap(), Some(Command::ScreenList));
    }

    #[test]
    fn malformed_screen_commands_show_usage() {
        assert_eq!(parse("screen"), Err(CommandError::ScreenUsage));
        assert_eq!(parse("screen -r"), Err(CommandError::ScreenUsage));
        assert_eq!(parse("screen -c name 256"), Err(CommandError::ScreenUsage));
    }

    #[test]
    fn unknown_commands_are_flagged() {
        assert_eq!(parse("format c:"), Err(CommandError::Unknown));
    }
}
