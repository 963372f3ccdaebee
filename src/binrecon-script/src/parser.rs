//! Lexes a `.euv` program into a sequence of [`MethodContainer`]s.
//!
//! Lines are comment-stripped (`#` or `//` to end of line) and
//! whitespace-collapsed before the state machine below ever sees them. The
//! state machine itself never looks past the current line.

use crate::types::{Access, MethodContainer, ScriptError};

#[derive(Debug)]
enum State {
    OutsideBody,
    /// `end;` has been consumed; any further non-empty line is ignored.
    Done,
    /// Inside `start; ... end;`, not currently inside a method body.
    BodyIdle { pending_access: Access },
    /// `_createMethod(NAME)` seen; the next non-empty line must be `{`.
    AwaitingBrace { name: String, access: Access },
    InsideMethod {
        name: String,
        access: Access,
        body: Vec<String>,
        exports: Vec<String>,
    },
    /// Accumulating a `clink: [ ... ]` export list across lines.
    InsideExportList {
        name: String,
        access: Access,
        body: Vec<String>,
        exports: Vec<String>,
        pending: Vec<String>,
    },
}

pub fn parse(source: &str) -> Result<Vec<MethodContainer>, ScriptError> {
    let mut state = State::OutsideBody;
    let mut methods = Vec::new();

    for raw_line in source.lines() {
        let line = normalize(raw_line);
        if line.is_empty() {
            continue;
        }
        state = step(state, &line, &mut methods)?;
    }

    match state {
        State::OutsideBody => Err(ScriptError::MissingStart),
        State::Done => Ok(methods),
        State::BodyIdle { .. } | State::AwaitingBrace { .. } | State::InsideMethod { .. } | State::InsideExportList { .. } => {
            Err(ScriptError::MissingEnd)
        }
    }
}

fn step(state: State, line: &str, methods: &mut Vec<MethodContainer>) -> Result<State, ScriptError> {
    match state {
        State::OutsideBody => {
            if line == "start;" {
                Ok(State::BodyIdle { pending_access: Access::Private })
            } else {
                Ok(State::OutsideBody)
            }
        }
        State::Done => Ok(State::Done),
        State::BodyIdle { pending_access } => {
            if line == "end;" {
                Ok(State::Done)
            } else if line == "public:" {
                Ok(State::BodyIdle { pending_access: Access::Public })
            } else if line == "private:" {
                Ok(State::BodyIdle { pending_access: Access::Private })
            } else if let Some(name) = method_name(line) {
                if line.trim_end().ends_with('{') {
                    Ok(State::InsideMethod { name, access: pending_access, body: Vec::new(), exports: Vec::new() })
                } else {
                    Ok(State::AwaitingBrace { name, access: pending_access })
                }
            } else {
                Ok(State::BodyIdle { pending_access })
            }
        }
        State::AwaitingBrace { name, access } => {
            if line == "{" {
                Ok(State::InsideMethod { name, access, body: Vec::new(), exports: Vec::new() })
            } else {
                Err(ScriptError::ExpectedOpenBrace(name))
            }
        }
        State::InsideMethod { name, access, mut body, exports } => {
            if line == "{" {
                Ok(State::InsideMethod { name, access, body, exports })
            } else if line == "}" {
                methods.push(MethodContainer { name, access, body, exports });
                Ok(State::BodyIdle { pending_access: Access::Private })
            } else if line.starts_with("clink:") || line.contains('[') {
                let mut pending = Vec::new();
                let closed = accumulate_export_names(line, &mut pending);
                if closed {
                    let mut exports = exports;
                    exports.extend(pending);
                    Ok(State::InsideMethod { name, access, body, exports })
                } else {
                    Ok(State::InsideExportList { name, access, body, exports, pending })
                }
            } else {
                body.push(line.to_string());
                Ok(State::InsideMethod { name, access, body, exports })
            }
        }
        State::InsideExportList { name, access, body, mut exports, mut pending } => {
            let closed = accumulate_export_names(line, &mut pending);
            if closed {
                exports.extend(pending);
                Ok(State::InsideMethod { name, access, body, exports })
            } else {
                Ok(State::InsideExportList { name, access, body, exports, pending })
            }
        }
    }
}

/// `true` once a closing `]` has been consumed.
fn accumulate_export_names(line: &str, pending: &mut Vec<String>) -> bool {
    let closed = line.contains(']');
    let cleaned = line
        .trim_start_matches("clink:")
        .replace('[', "")
        .replace(']', "");
    for name in cleaned.split(',') {
        let name = name.trim();
        if !name.is_empty() {
            pending.push(name.to_string());
        }
    }
    closed
}

fn method_name(line: &str) -> Option<String> {
    let line = line.trim_end().trim_end_matches('{').trim();
    let rest = line.strip_prefix("_createMethod(")?;
    let name = rest.strip_suffix(')')?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn normalize(line: &str) -> String {
    let stripped = strip_comment(line);
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_comment(line: &str) -> &str {
    if let Some(pos) = line.find("//") {
        return &line[..pos];
    }
    if let Some(pos) = line.find('#') {
        return &line[..pos];
    }
    line
}
