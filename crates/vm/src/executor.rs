use log::trace;
use memory::MemoryManager;
use process::{flatten, Pcb};
use types::{clamp_u16, log_format, Instruction, Operand, ProcessState};

use crate::print;

/// Advance `pcb` by exactly one flattened instruction on core `core_id`.
///
/// No-op when the PCB is Blocked or still holds sleep ticks. The first call
/// flattens the program; an over-deep loop nest leaves the flattened
/// sequence empty, which the bounds check below turns into termination.
/// On exit the PCB is Ready, Blocked (Sleep) or Terminated (end of program
/// or memory violation). Sleep does not advance the program counter.
pub fn execute(pcb: &mut Pcb, core_id: usize, memory: Option<&MemoryManager>) {
    if pcb.state == ProcessState::Blocked || pcb.sleep_ticks > 0 {
        return;
    }

    if !pcb.is_flattened {
        match flatten(&pcb.process.instructions) {
            Ok(flat) => pcb.flattened = flat,
            Err(_) => {
                pcb.flattened.clear();
                pcb.logs
                    .push("Error: Maximum FOR_LOOP nesting depth exceeded.".to_string());
            }
        }
        pcb.is_flattened = true;
        pcb.program_counter = 0;
    }

    let pc = pcb.program_counter;
    if pc < 0 || pc as usize >= pcb.flattened.len() {
        pcb.state = ProcessState::Terminated;
        return;
    }

    let instruction = pcb.flattened[pc as usize].clone();
    pcb.state = ProcessState::Running;
    trace!("pid {} core {} pc {}: {:?}", pcb.process.pid, core_id, pc, instruction);

    match instruction {
        Instruction::Print { text } => exec_print(pcb, core_id, &text),
        Instruction::Declare { var, value } => exec_declare(pcb, core_id, &var, value, memory),
        Instruction::Add { dst, lhs, rhs } => exec_arithmetic(pcb, core_id, &dst, &lhs, &rhs, false),
        Instruction::Sub { dst, lhs, rhs } => exec_arithmetic(pcb, core_id, &dst, &lhs, &rhs, true),
        Instruction::Sleep { ticks } => {
            pcb.sleep_ticks = ticks;
            pcb.state = ProcessState::Blocked;
        }
        // Never present after flattening; skipped if one slips through.
        Instruction::For { .. } => {}
        Instruction::ReadMem { dst, address } => exec_read_mem(pcb, core_id, &dst, &address, memory),
        Instruction::WriteMem { address, src } => {
            exec_write_mem(pcb, core_id, &address, &src, memory)
        }
    }

    if pcb.state == ProcessState::Blocked || pcb.state == ProcessState::Terminated {
        return;
    }

    pcb.program_counter += 1;
    if pcb.program_counter as usize >= pcb.flattened.len() {
        pcb.state = ProcessState::Terminated;
    } else {
        pcb.state = ProcessState::Ready;
    }
}

fn exec_print(pcb: &mut Pcb, core_id: usize, text: &str) {
    let output = if pcb.uses_symbol_table() && !text.is_empty() {
        print::evaluate(text, pcb)
    } else {
        // Legacy greeting for generator-made processes; an optional
        // `Value from: <var>` suffix resolves against the legacy map.
        let mut output = format!("Hello world from {}!", pcb.process.name);
        if !text.is_empty() {
            match text.strip_prefix("Value from: ") {
                Some(var) if pcb.legacy_memory.contains_key(var) => {
                    output.push_str(&format!(" Value from: {}", pcb.legacy_memory[var]));
                }
                _ => {
                    output.push_str(&format!(" {text}"));
                }
            }
        }
        output
    };
    pcb.logs.push(log_format(core_id, &output));
}

fn exec_declare(pcb: &mut Pcb, core_id: usize, var: &str, value: u16, memory: Option<&MemoryManager>) {
    if pcb.uses_symbol_table() {
        // The symbol table lives on the first page; declaring demand-pages it.
        if let Some(memory) = memory {
            if memory.access(pcb.process.pid, 0, true).is_err() {
                pcb.mark_violation(0);
                pcb.logs.push(log_format(
                    core_id,
                    "Symbol table page fault - cannot declare variable",
                ));
                return;
            }
        }
        if !pcb.write_variable(var, value) {
            pcb.logs.push(log_format(
                core_id,
                &format!("Error: Symbol table full, cannot create variable {var}"),
            ));
        }
    } else {
        pcb.legacy_memory.insert(var.to_string(), value);
    }
}

fn exec_arithmetic(
    pcb: &mut Pcb,
    core_id: usize,
    dst: &str,
    lhs: &Operand,
    rhs: &Operand,
    subtract: bool,
) {
    if pcb.uses_symbol_table() {
        let a = resolve_user(pcb, lhs) as i32;
        let b = resolve_user(pcb, rhs) as i32;
        let value = clamp_u16(if subtract { a - b } else { a + b });
        if !pcb.write_variable(dst, value) {
            pcb.logs.push(log_format(
                core_id,
                "Error: Symbol table full, cannot store result",
            ));
        }
    } else {
        let a = resolve_legacy(pcb, lhs) as i32;
        let b = resolve_legacy(pcb, rhs) as i32;
        let value = clamp_u16(if subtract { a - b } else { a + b });
        pcb.legacy_memory.insert(dst.to_string(), value);
    }
}

/// User-program operands name variables; undeclared ones read 0.
fn resolve_user(pcb: &Pcb, operand: &Operand) -> u16 {
    match operand {
        Operand::Literal(value) => *value,
        Operand::Var(name) => pcb.read_variable(name),
    }
}

/// Legacy operands may be literals; a missing variable is declared as 0
/// on first read.
fn resolve_legacy(pcb: &mut Pcb, operand: &Operand) -> u16 {
    match operand {
        Operand::Literal(value) => *value,
        Operand::Var(name) => *pcb.legacy_memory.entry(name.clone()).or_insert(0),
    }
}

fn exec_read_mem(
    pcb: &mut Pcb,
    core_id: usize,
    dst: &str,
    address: &str,
    memory: Option<&MemoryManager>,
) {
    let Some(addr) = parse_address(address) else {
        pcb.logs.push(log_format(
            core_id,
            &format!("Error: Invalid address format {address}"),
        ));
        return;
    };
    if addr + 1 >= pcb.memory_bytes.len() {
        pcb.mark_violation(addr);
        pcb.logs.push(log_format(
            core_id,
            &format!("Memory access violation at 0x{addr:X}"),
        ));
        return;
    }
    if let Some(memory) = memory {
        if memory.access(pcb.process.pid, addr, false).is_err() {
            pcb.mark_violation(addr);
            pcb.logs.push(log_format(core_id, "Memory access failed"));
            return;
        }
    }
    let value = pcb.read_mem_u16(addr);
    if !pcb.write_variable(dst, value) {
        pcb.logs.push(log_format(
            core_id,
            &format!("Error: Symbol table full, cannot create variable {dst}"),
        ));
    }
}

fn exec_write_mem(
    pcb: &mut Pcb,
    core_id: usize,
    address: &str,
    src: &str,
    memory: Option<&MemoryManager>,
) {
    let Some(addr) = parse_address(address) else {
        pcb.logs.push(log_format(
            core_id,
            &format!("Error: Invalid address format {address}"),
        ));
        return;
    };
    if addr + 1 >= pcb.memory_bytes.len() {
        pcb.mark_violation(addr);
        pcb.logs.push(log_format(
            core_id,
            &format!("Memory access violation at 0x{addr:X}"),
        ));
        return;
    }
    if let Some(memory) = memory {
        if memory.access(pcb.process.pid, addr, true).is_err() {
            pcb.mark_violation(addr);
            pcb.logs.push(log_format(core_id, "Memory access failed"));
            return;
        }
    }
    let value = pcb.read_variable(src);
    if !pcb.write_mem_u16(addr, value) {
        pcb.mark_violation(addr);
        pcb.logs.push(log_format(
            core_id,
            &format!("Memory write failed at 0x{addr:X}"),
        ));
    }
}

/// Addresses come in as `0x…` hex or plain decimal.
fn parse_address(text: &str) -> Option<usize> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex_digits) => usize::from_str_radix(hex_digits, 16).ok(),
        None => text.parse::<usize>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parsing_accepts_hex_and_decimal() {
        assert_eq!(parse_address("0x100"), Some(256));
        assert_eq!(parse_address("0X2a"), Some(42));
        assert_eq!(parse_address("64"), Some(64));
        assert_eq!(parse_address("notanaddress"), None);
        assert_eq!(parse_address("-4"), None);
    }
}
