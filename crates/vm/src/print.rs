use process::Pcb;

/// Evaluate a user print expression against a PCB's symbol table.
///
/// The grammar is a flat concatenation of double-quoted string literals and
/// bare variable names joined by `+`; variables substitute as decimal
/// strings, undeclared ones as `0`. An optional outer pair of parentheses
/// is tolerated.
pub fn evaluate(expression: &str, pcb: &Pcb) -> String {
    let mut expr = expression.trim();
    if expr.len() >= 2 && expr.starts_with('(') && expr.ends_with(')') {
        expr = &expr[1..expr.len() - 1];
    }

    let chars: Vec<char> = expr.chars().collect();
    let mut output = String::new();
    let mut current = String::new();
    let mut in_quote = false;

    for i in 0..chars.len() {
        let c = chars[i];
        if c == '"' {
            if in_quote {
                output.push_str(&current);
                current.clear();
                in_quote = false;
            } else {
                in_quote = true;
            }
        } else if c == '+' && !in_quote {
            continue;
        } else if in_quote {
            current.push(c);
        } else if !c.is_whitespace() {
            current.push(c);
            let at_boundary = i + 1 >= chars.len()
                || chars[i + 1] == '+'
                || chars[i + 1] == '"'
                || chars[i + 1].is_whitespace();
            if at_boundary {
                output.push_str(&pcb.read_variable(&current).to_string());
                current.clear();
            }
        }
    }

    if !current.is_empty() {
        if in_quote {
            output.push_str(&current);
        } else {
            output.push_str(&pcb.read_variable(&current).to_string());
        }
    }
    output
}
