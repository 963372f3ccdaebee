//! Parses one command-body line into a [`Command`].

use crate::types::{ScriptError, RESERVED_NAMES};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `find(VAR = PATTERN)`
    Find { var: String, pattern: String },
    /// `set(VAR = EXPR)`
    Set { var: String, expr: String },
    /// `check ADDR_EXPR : BYTES`
    Check { addr_expr: String, bytes: String },
    /// `ADDR_EXPR : PAYLOAD`
    Write { addr_expr: String, payload: String },
}

fn check_reserved(var: &str) -> Result<(), ScriptError> {
    if RESERVED_NAMES.contains(&var) {
        Err(ScriptError::ReservedName(var.to_string()))
    } else {
        Ok(())
    }
}

pub fn parse_command(line: &str) -> Result<Command, ScriptError> {
    let line = line.trim();

    if let Some(inner) = line.strip_prefix("find(").and_then(|s| s.strip_suffix(')')) {
        let (var, pattern) = split_assignment(inner, line)?;
        check_reserved(&var)?;
        return Ok(Command::Find { var, pattern });
    }

    if let Some(inner) = line.strip_prefix("set(").and_then(|s| s.strip_suffix(')')) {
        let (var, expr) = split_assignment(inner, line)?;
        check_reserved(&var)?;
        return Ok(Command::Set { var, expr });
    }

    if let Some(rest) = line.strip_prefix("check ") {
        let (addr_expr, bytes) = split_colon(rest, line)?;
        return Ok(Command::Check { addr_expr, bytes });
    }

    let (addr_expr, payload) = split_colon(line, line)?;
    Ok(Command::Write { addr_expr, payload })
}

fn split_assignment(inner: &str, whole_line: &str) -> Result<(String, String), ScriptError> {
    let mut parts = inner.splitn(2, '=');
    let var = parts
        .next()
        .ok_or_else(|| ScriptError::MalformedCommand(whole_line.to_string()))?
        .trim()
        .to_string();
    let rhs = parts
        .next()
        .ok_or_else(|| ScriptError::MalformedCommand(whole_line.to_string()))?
        .trim()
        .to_string();
    if var.is_empty() || rhs.is_empty() {
        return Err(ScriptError::MalformedCommand(whole_line.to_string()));
    }
    Ok((var, rhs))
}

fn split_colon(text: &str, whole_line: &str) -> Result<(String, String), ScriptError> {
    let mut parts = text.splitn(2, ':');
    let lhs = parts
        .next()
        .ok_or_else(|| ScriptError::MalformedCommand(whole_line.to_string()))?
        .trim()
        .to_string();
    let rhs = parts
        .next()
        .ok_or_else(|| ScriptError::MalformedCommand(whole_line.to_string()))?
        .trim()
        .to_string();
    if lhs.is_empty() || rhs.is_empty() {
        return Err(ScriptError::MalformedCommand(whole_line.to_string()));
    }
    Ok((lhs, rhs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_find() {
        assert_eq!(
            parse_command("find(X = DE AD BE EF)").unwrap(),
            Command::Find { var: "X".to_string(), pattern: "DE AD BE EF".to_string() }
        );
    }

    #[test]
    fn parses_set() {
        assert_eq!(
            parse_command("set(Y = X + 4)").unwrap(),
            Command::Set { var: "Y".to_string(), expr: "X + 4".to_string() }
        );
    }

    #[test]
    fn parses_check() {
        assert_eq!(
            parse_command("check X : 90 90").unwrap(),
            Command::Check { addr_expr: "X".to_string(), bytes: "90 90".to_string() }
        );
    }

    #[test]
    fn parses_write() {
        assert_eq!(
            parse_command("X : nop").unwrap(),
            Command::Write { addr_expr: "X".to_string(), payload: "nop".to_string() }
        );
    }

    #[test]
    fn reserved_variable_names_are_rejected() {
        assert_eq!(
            parse_command("find(find = DE AD)"),
            Err(ScriptError::ReservedName("find".to_string()))
        );
    }

    #[test]
    fn malformed_write_without_colon_is_rejected() {
        assert!(parse_command("just some text").is_err());
    }
}
