pub mod instruction;
pub use instruction::{Instruction, Operand};

pub mod state;
pub use state::ProcessState;

pub mod limits;
pub use limits::*;

pub mod time;
pub use time::{log_format, timestamp};
