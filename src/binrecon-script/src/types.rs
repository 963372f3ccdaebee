//! Shared types for the `.euv` lexer and interpreter.

use thiserror::Error;

/// Keywords the DSL reserves; a variable may not bind one of these names.
pub const RESERVED_NAMES: &[&str] = &["find", "set", "check", "start", "end", "public", "private", "clink"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Private,
}

/// A parsed `_createMethod` block: its access modifier, raw command lines,
/// and the set of local-scope names that are copied to `global` as
/// `NAME.exportName` once the body finishes.
#[derive(Debug, Clone)]
pub struct MethodContainer {
    pub name: String,
    pub access: Access,
    pub body: Vec<String>,
    pub exports: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("reached end of input before `start;`")]
    MissingStart,
    #[error("reached end of input before `end;`")]
    MissingEnd,
    #[error("expected `{{` to open the body of method {0:?}")]
    ExpectedOpenBrace(String),
    #[error("malformed _createMethod declaration: {0:?}")]
    MalformedMethodDeclaration(String),
    #[error("variable name {0:?} is reserved")]
    ReservedName(String),
    #[error("malformed command: {0:?}")]
    MalformedCommand(String),
}
