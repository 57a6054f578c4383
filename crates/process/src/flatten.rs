use thiserror::Error;
use types::{Instruction, MAX_LOOP_DEPTH};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FlattenError {
    #[error("maximum FOR_LOOP nesting depth exceeded")]
    DepthExceeded,
}

/// Expand every `For` in place, repeating its body `iterations` times and
/// recursing into nested loops. Bodies deeper than [`MAX_LOOP_DEPTH`] abort
/// the whole expansion.
///
/// Flattening is idempotent: a loop-free sequence flattens to itself.
pub fn flatten(instructions: &[Instruction]) -> Result<Vec<Instruction>, FlattenError> {
    let mut flat = Vec::new();
    flatten_into(instructions, &mut flat, 0)?;
    Ok(flat)
}

fn flatten_into(
    instructions: &[Instruction],
    flat: &mut Vec<Instruction>,
    depth: usize,
) -> Result<(), FlattenError> {
    if depth > MAX_LOOP_DEPTH {
        return Err(FlattenError::DepthExceeded);
    }
    for instruction in instructions {
        match instruction {
            Instruction::For { body, iterations } => {
                if depth == MAX_LOOP_DEPTH {
                    return Err(FlattenError::DepthExceeded);
                }
                for _ in 0..*iterations {
                    flatten_into(body, flat, depth + 1)?;
                }
            }
            other => flat.push(other.clone()),
        }
    }
    Ok(())
}
