use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use types::{timestamp, Instruction, ProcessState, SYMBOL_TABLE_SIZE};

/// Static description of a simulated process.
#[derive(Debug, Clone)]
pub struct Process {
    pub pid: i32,
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub memory_size: usize,
}

/// Shared handle: the live table and the ready queue both hold one while a
/// PCB is Ready; whichever worker dequeues it becomes the sole mutator.
pub type PcbHandle = Arc<Mutex<Pcb>>;

/// Process control block: everything the scheduler and executor know about
/// one process.
///
/// Two storage paths exist for variables. Processes created from
/// user-written programs get a byte-addressed memory buffer whose first 64
/// bytes hold the symbol table; generator-made processes keep the older
/// name-to-value map and never initialize the buffer. `memory_bytes` being
/// empty is what selects the legacy path.
#[derive(Debug)]
pub struct Pcb {
    pub process: Process,
    pub state: ProcessState,
    pub program_counter: i32,
    pub sleep_ticks: u8,
    pub logs: Vec<String>,
    pub flattened: Vec<Instruction>,
    pub is_flattened: bool,
    pub memory_bytes: Vec<u8>,
    pub symbol_table: HashMap<String, usize>,
    pub next_symbol_offset: usize,
    pub legacy_memory: HashMap<String, u16>,
    pub has_memory_violation: bool,
    pub violation_time: String,
    pub violation_address: usize,
}

impl Pcb {
    pub fn new(process: Process) -> Self {
        Self {
            process,
            state: ProcessState::Ready,
            program_counter: 0,
            sleep_ticks: 0,
            logs: Vec::new(),
            flattened: Vec::new(),
            is_flattened: false,
            memory_bytes: Vec::new(),
            symbol_table: HashMap::new(),
            next_symbol_offset: 0,
            legacy_memory: HashMap::new(),
            has_memory_violation: false,
            violation_time: String::new(),
            violation_address: 0,
        }
    }

    /// Zero-fill the process memory buffer and reset the symbol table,
    /// switching the PCB onto the byte-addressed storage path.
    pub fn initialize_memory(&mut self) {
        self.memory_bytes = vec![0; self.process.memory_size];
        self.symbol_table.clear();
        self.next_symbol_offset = 0;
    }

    pub fn into_handle(self) -> PcbHandle {
        Arc::new(Mutex::new(self))
    }

    /// Whether variables go through the symbol-table segment.
    pub fn uses_symbol_table(&self) -> bool {
        !self.memory_bytes.is_empty()
    }

    /// Lines shown in status panels: the flattened program once it exists,
    /// the original instruction count before first execution.
    pub fn total_lines(&self) -> usize {
        if self.flattened.is_empty() {
            self.process.instructions.len()
        } else {
            self.flattened.len()
        }
    }

    /// Offset of `var` in the symbol-table segment, allocating the next
    /// 2-byte slot for a new name. `None` once all 32 slots are taken.
    pub fn get_or_create_variable(&mut self, var: &str) -> Option<usize> {
        if let Some(offset) = self.symbol_table.get(var) {
            return Some(*offset);
        }
        if self.next_symbol_offset >= SYMBOL_TABLE_SIZE {
            return None;
        }
        let offset = self.next_symbol_offset;
        self.symbol_table.insert(var.to_string(), offset);
        self.next_symbol_offset += 2;
        Some(offset)
    }

    /// Undeclared variables read as 0.
    pub fn read_variable(&self, var: &str) -> u16 {
        match self.symbol_table.get(var) {
            Some(&offset) => self.read_mem_u16(offset),
            None => 0,
        }
    }

    /// False when the symbol-table segment is full; the value is dropped.
    pub fn write_variable(&mut self, var: &str, value: u16) -> bool {
        match self.get_or_create_variable(var) {
            Some(offset) => self.write_mem_u16(offset, value),
            None => false,
        }
    }

    /// Little-endian u16 at `address` in the process buffer; 0 when the
    /// two bytes do not fit.
    pub fn read_mem_u16(&self, address: usize) -> u16 {
        if address + 1 >= self.memory_bytes.len() {
            return 0;
        }
        u16::from_le_bytes([self.memory_bytes[address], self.memory_bytes[address + 1]])
    }

    pub fn write_mem_u16(&mut self, address: usize, value: u16) -> bool {
        if address + 1 >= self.memory_bytes.len() {
            return false;
        }
        let bytes = value.to_le_bytes();
        self.memory_bytes[address] = bytes[0];
        self.memory_bytes[address + 1] = bytes[1];
        true
    }

    /// Record a fatal memory fault and retire the PCB.
    pub fn mark_violation(&mut self, address: usize) {
        self.has_memory_violation = true;
        self.violation_time = timestamp();
        self.violation_address = address;
        self.state = ProcessState::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::MAX_VARIABLES;

    fn user_pcb(memory_size: usize) -> Pcb {
        let mut pcb = Pcb::new(Process {
            pid: 1,
            name: "t".to_string(),
            instructions: Vec::new(),
            memory_size,
        });
        pcb.initialize_memory();
        pcb
    }

    #[test]
    fn variables_are_little_endian_in_the_buffer() {
        let mut pcb = user_pcb(256);
        assert!(pcb.write_variable("x", 0x1234));
        let offset = pcb.symbol_table["x"];
        assert_eq!(pcb.memory_bytes[offset], 0x34);
        assert_eq!(pcb.memory_bytes[offset + 1], 0x12);
        assert_eq!(pcb.read_variable("x"), 0x1234);
    }

    #[test]
    fn undeclared_variables_read_zero() {
        let pcb = user_pcb(256);
        assert_eq!(pcb.read_variable("nothing"), 0);
    }

    #[test]
    fn symbol_table_holds_exactly_32_variables() {
        let mut pcb = user_pcb(256);
        for i in 0..MAX_VARIABLES {
            assert!(pcb.write_variable(&format!("v{i}"), i as u16));
        }
        assert!(!pcb.write_variable("v32", 99));
        assert_eq!(pcb.read_variable("v32"), 0);
        assert_eq!(pcb.read_variable("v31"), 31);
    }

    #[test]
    fn offsets_step_by_two_and_never_overlap() {
        let mut pcb = user_pcb(256);
        for i in 0..MAX_VARIABLES {
            pcb.write_variable(&format!("v{i}"), 1);
        }
        let mut offsets: Vec<usize> = pcb.symbol_table.values().copied().collect();
        offsets.sort_unstable();
        let expected: Vec<usize> = (0..MAX_VARIABLES).map(|i| i * 2).collect();
        assert_eq!(offsets, expected);
    }

    #[test]
    fn violation_marks_and_terminates() {
        let mut pcb = user_pcb(64);
        pcb.mark_violation(0x100);
        assert!(pcb.has_memory_violation);
        assert_eq!(pcb.violation_address, 0x100);
        assert_eq!(pcb.state, ProcessState::Terminated);
        assert!(!pcb.violation_time.is_empty());
    }
}
