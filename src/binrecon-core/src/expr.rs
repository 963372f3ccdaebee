//! A recursive-descent integer expression evaluator with `INVALID`
//! propagation.
//!
//! ```text
//! expr    := add
//! add     := mul (('+'|'-') mul)*
//! mul     := unary (('*'|'/'|'%') unary)*
//! unary   := ('+'|'-')? atom
//! atom    := '(' expr ')' | hex | dec | ident
//! hex     := '0x' [0-9A-Fa-f]+
//! dec     := [0-9]+
//! ident   := [A-Za-z_][A-Za-z0-9_.]*
//! ```
//!
//! All arithmetic is 64-bit signed, two's complement, wrapping. Division and
//! modulo by zero yield 0. `.` and `()` as the whole expression resolve to a
//! caller-supplied `last_address`. The sentinel [`INVALID`] propagates
//! through arithmetic: if any identifier in an expression is `INVALID`, the
//! whole result is `INVALID` — the mechanism by which a failed `find(...)`
//! causes every dependent write to be skipped.

use std::collections::HashMap;
use thiserror::Error;

/// The reserved value that flows through arithmetic unchanged to signal "a
/// required signature was not located."
pub const INVALID: i64 = i64::MIN;

pub type Scope = HashMap<String, i64>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected character {0:?} at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unbalanced parentheses")]
    UnbalancedParens,
}

/// Evaluates expressions over the union of a local and global variable
/// scope.
pub struct ExprEvaluator<'a> {
    local: &'a Scope,
    global: &'a Scope,
    last_address: i64,
}

impl<'a> ExprEvaluator<'a> {
    pub fn new(local: &'a Scope, global: &'a Scope, last_address: i64) -> Self {
        ExprEvaluator {
            local,
            global,
            last_address,
        }
    }

    pub fn eval(&self, text: &str) -> Result<i64, ExprError> {
        let tokens: Vec<char> = text.chars().collect();
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            eval: self,
        };
        let value = parser.parse_expr()?;
        parser.skip_ws();
        if parser.pos != tokens.len() {
            return Err(ExprError::UnbalancedParens);
        }
        Ok(value)
    }

    fn resolve(&self, ident: &str) -> i64 {
        if ident == "." {
            return self.last_address;
        }
        self.local
            .get(ident)
            .or_else(|| self.global.get(ident))
            .copied()
            .unwrap_or(0)
    }
}

struct Parser<'a, 'b> {
    tokens: &'a [char],
    pos: usize,
    eval: &'a ExprEvaluator<'b>,
}

fn wrapping_add(a: i64, b: i64) -> i64 {
    if a == INVALID || b == INVALID {
        INVALID
    } else {
        a.wrapping_add(b)
    }
}

fn wrapping_sub(a: i64, b: i64) -> i64 {
    if a == INVALID || b == INVALID {
        INVALID
    } else {
        a.wrapping_sub(b)
    }
}

fn wrapping_mul(a: i64, b: i64) -> i64 {
    if a == INVALID || b == INVALID {
        INVALID
    } else {
        a.wrapping_mul(b)
    }
}

fn wrapping_div(a: i64, b: i64) -> i64 {
    if a == INVALID || b == INVALID {
        INVALID
    } else if b == 0 {
        0
    } else {
        a.wrapping_div(b)
    }
}

fn wrapping_rem(a: i64, b: i64) -> i64 {
    if a == INVALID || b == INVALID {
        INVALID
    } else if b == 0 {
        0
    } else {
        a.wrapping_rem(b)
    }
}

impl<'a, 'b> Parser<'a, 'b> {
    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn parse_expr(&mut self) -> Result<i64, ExprError> {
        self.parse_add()
    }

    fn parse_add(&mut self) -> Result<i64, ExprError> {
        let mut value = self.parse_mul()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some('+') => {
                    self.pos += 1;
                    value = wrapping_add(value, self.parse_mul()?);
                }
                Some('-') => {
                    self.pos += 1;
                    value = wrapping_sub(value, self.parse_mul()?);
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_mul(&mut self) -> Result<i64, ExprError> {
        let mut value = self.parse_unary()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    value = wrapping_mul(value, self.parse_unary()?);
                }
                Some('/') => {
                    self.pos += 1;
                    value = wrapping_div(value, self.parse_unary()?);
                }
                Some('%') => {
                    self.pos += 1;
                    value = wrapping_rem(value, self.parse_unary()?);
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_unary(&mut self) -> Result<i64, ExprError> {
        self.skip_ws();
        match self.peek() {
            Some('+') => {
                self.pos += 1;
                self.parse_unary()
            }
            Some('-') => {
                self.pos += 1;
                let value = self.parse_unary()?;
                Ok(if value == INVALID { INVALID } else { value.wrapping_neg() })
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<i64, ExprError> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                self.skip_ws();
                if self.peek() == Some(')') {
                    self.pos += 1;
                    return Ok(self.eval.last_address);
                }
                let value = self.parse_expr()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return Err(ExprError::UnbalancedParens);
                }
                self.pos += 1;
                Ok(value)
            }
            Some('.') if self.is_lone_dot() => {
                self.pos += 1;
                Ok(self.eval.last_address)
            }
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.parse_ident(),
            Some(c) => Err(ExprError::UnexpectedChar(c, self.pos)),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn is_lone_dot(&self) -> bool {
        !self
            .tokens
            .get(self.pos + 1)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
    }

    fn parse_number(&mut self) -> Result<i64, ExprError> {
        let start = self.pos;
        if self.tokens[self.pos..].starts_with(&['0', 'x']) {
            self.pos += 2;
            let digit_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let text: String = self.tokens[digit_start..self.pos].iter().collect();
            if text.is_empty() {
                return Err(ExprError::UnexpectedChar('x', start));
            }
            return i64::from_str_radix(&text, 16).map_err(|_| ExprError::UnexpectedChar('x', start));
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text: String = self.tokens[start..self.pos].iter().collect();
        text.parse::<i64>()
            .map_err(|_| ExprError::UnexpectedChar('0', start))
    }

    fn parse_ident(&mut self) -> Result<i64, ExprError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            self.pos += 1;
        }
        let ident: String = self.tokens[start..self.pos].iter().collect();
        Ok(self.eval.resolve(&ident))
    }
}
