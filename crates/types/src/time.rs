use chrono::Local;

/// Wall-clock timestamp in the console's display format,
/// e.g. `08/02/2026, 10:15:30 AM`.
pub fn timestamp() -> String {
    Local::now().format("%m/%d/%Y, %I:%M:%S %p").to_string()
}

/// Wrap a process log message with its timestamp and executing core.
pub fn log_format(core_id: usize, message: &str) -> String {
    format!("({}) Core:{} \"{}\"", timestamp(), core_id, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_lines_carry_core_and_message() {
        let line = log_format(3, "Hello world from p01!");
        assert!(line.contains("Core:3"));
        assert!(line.contains("\"Hello world from p01!\""));
    }
}
