use std::sync::atomic::{AtomicI32, Ordering};

use rand::Rng;
use types::{Instruction, Operand, MAX_LOOP_DEPTH};

use crate::pcb::{Pcb, Process};

static NEXT_PID: AtomicI32 = AtomicI32::new(1);

/// Monotonic process id, shared by the generator and the console.
pub fn next_pid() -> i32 {
    NEXT_PID.fetch_add(1, Ordering::SeqCst)
}

/// Synthesize a PCB with a random program over the classic instruction
/// kinds (Print, Declare, Add, Sub, Sleep, For).
///
/// Generated processes keep the legacy name-to-value variable map and never
/// initialize the byte buffer; their memory size only drives paging
/// bookkeeping. Arithmetic operands are literals drawn from the full u16
/// range.
pub fn random_process(
    name: String,
    memory_size: usize,
    min_ins: usize,
    max_ins: usize,
    rng: &mut impl Rng,
) -> Pcb {
    let count = rng.gen_range(min_ins.min(max_ins)..=max_ins.max(min_ins)).max(1);
    let mut declared = Vec::new();
    let instructions = random_instructions(rng, count, 0, &mut declared);
    Pcb::new(Process {
        pid: next_pid(),
        name,
        instructions,
        memory_size,
    })
}

fn random_instructions(
    rng: &mut impl Rng,
    count: usize,
    depth: usize,
    declared: &mut Vec<String>,
) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(count);
    for _ in 0..count {
        // For is only sampled while another nesting level is still legal.
        let kinds = if depth < MAX_LOOP_DEPTH { 6 } else { 5 };
        let instruction = match rng.gen_range(0..kinds) {
            0 => random_print(rng, declared),
            1 => {
                let var = fresh_var(rng);
                declared.push(var.clone());
                Instruction::Declare {
                    var,
                    value: rng.gen::<u16>(),
                }
            }
            2 => Instruction::Add {
                dst: fresh_var(rng),
                lhs: Operand::Literal(rng.gen::<u16>()),
                rhs: Operand::Literal(rng.gen::<u16>()),
            },
            3 => Instruction::Sub {
                dst: fresh_var(rng),
                lhs: Operand::Literal(rng.gen::<u16>()),
                rhs: Operand::Literal(rng.gen::<u16>()),
            },
            4 => Instruction::Sleep {
                ticks: rng.gen::<u8>(),
            },
            _ => {
                let iterations = rng.gen_range(1..=5);
                let body_len = rng.gen_range(1..=3);
                Instruction::For {
                    iterations,
                    body: random_instructions(rng, body_len, depth + 1, declared),
                }
            }
        };
        instructions.push(instruction);
    }
    instructions
}

/// Half the prints are bare greetings; the rest reference a declared
/// variable through the `Value from:` form when one exists.
fn random_print(rng: &mut impl Rng, declared: &[String]) -> Instruction {
    let text = if !declared.is_empty() && rng.gen_bool(0.5) {
        let var = &declared[rng.gen_range(0..declared.len())];
        format!("Value from: {var}")
    } else {
        String::new()
    };
    Instruction::Print { text }
}

fn fresh_var(rng: &mut impl Rng) -> String {
    format!("var{}", rng.gen::<u16>())
}
