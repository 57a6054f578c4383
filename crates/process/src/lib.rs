pub mod flatten;
pub mod generator;
pub mod parser;
pub mod pcb;

pub use flatten::{flatten, FlattenError};
pub use generator::{next_pid, random_process};
pub use parser::{parse_program, ParseError};
pub use pcb::{Pcb, PcbHandle, Process};
