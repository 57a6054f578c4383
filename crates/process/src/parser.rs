use thiserror::Error;
use types::{Instruction, Operand};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty program")]
    Empty,
    #[error("unknown statement '{0}'")]
    UnknownStatement(String),
    #[error("{keyword} is missing an argument")]
    MissingArgument { keyword: &'static str },
    #[error("invalid numeric value '{0}'")]
    InvalidValue(String),
}

/// Parse a `;`-separated user program into instructions.
///
/// Statements: `PRINT <expr>`, `DECLARE <var> <u16>`,
/// `ADD|SUBTRACT <dst> <a> <b>`, `READ <var> <addr>`, `WRITE <addr> <var>`,
/// `SLEEP <u8>`. Arithmetic operands always name variables for user
/// programs, so they are kept as variable references here; addresses stay
/// textual and are interpreted (hex or decimal) at execution time.
pub fn parse_program(source: &str) -> Result<Vec<Instruction>, ParseError> {
    let mut instructions = Vec::new();
    for statement in source.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        instructions.push(parse_statement(statement)?);
    }
    if instructions.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(instructions)
}

fn parse_statement(statement: &str) -> Result<Instruction, ParseError> {
    let mut tokens = statement.split_whitespace();
    let keyword = tokens.next().ok_or(ParseError::Empty)?;

    match keyword.to_ascii_uppercase().as_str() {
        "PRINT" => {
            let expr = statement[keyword.len()..].trim();
            if expr.is_empty() {
                return Err(ParseError::MissingArgument { keyword: "PRINT" });
            }
            Ok(Instruction::Print {
                text: expr.to_string(),
            })
        }
        "DECLARE" => {
            let var = next_token(&mut tokens, "DECLARE")?;
            let value = parse_u16(next_token(&mut tokens, "DECLARE")?)?;
            Ok(Instruction::Declare {
                var: var.to_string(),
                value,
            })
        }
        "ADD" | "SUBTRACT" => {
            let is_add = keyword.eq_ignore_ascii_case("ADD");
            let kw: &'static str = if is_add { "ADD" } else { "SUBTRACT" };
            let dst = next_token(&mut tokens, kw)?.to_string();
            let lhs = Operand::Var(next_token(&mut tokens, kw)?.to_string());
            let rhs = Operand::Var(next_token(&mut tokens, kw)?.to_string());
            Ok(if is_add {
                Instruction::Add { dst, lhs, rhs }
            } else {
                Instruction::Sub { dst, lhs, rhs }
            })
        }
        "READ" => {
            let dst = next_token(&mut tokens, "READ")?.to_string();
            let address = next_token(&mut tokens, "READ")?.to_string();
            Ok(Instruction::ReadMem { dst, address })
        }
        "WRITE" => {
            let address = next_token(&mut tokens, "WRITE")?.to_string();
            let src = next_token(&mut tokens, "WRITE")?.to_string();
            Ok(Instruction::WriteMem { address, src })
        }
        "SLEEP" => {
            let ticks = parse_u16(next_token(&mut tokens, "SLEEP")?)?.min(255) as u8;
            Ok(Instruction::Sleep { ticks })
        }
        _ => Err(ParseError::UnknownStatement(keyword.to_string())),
    }
}

fn next_token<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    keyword: &'static str,
) -> Result<&'a str, ParseError> {
    tokens.next().ok_or(ParseError::MissingArgument { keyword })
}

fn parse_u16(token: &str) -> Result<u16, ParseError> {
    token
        .parse::<u16>()
        .map_err(|_| ParseError::InvalidValue(token.to_string()))
}
