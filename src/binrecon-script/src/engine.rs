//! Executes a parsed `.euv` program: command dispatch, scope management,
//! and the write protocol (undo recording + dirty-set publication).

use crate::command::{parse_command, Command};
use crate::types::MethodContainer;
use binrecon_core::{asm, ByteSource, DirtySet, ExprEvaluator, Scope, SignatureScanner, UndoJournal, INVALID};

const SCAN_CHUNK_SIZE: usize = 1 << 20;

/// What one [`ScriptEngine::run`] call accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub writes: usize,
}

/// Stateless interpreter for a parsed `.euv` program. All run state
/// (scopes, `last_address`, the dirty-offset working set) lives on the
/// stack of a single [`Self::run`] call.
#[derive(Default)]
pub struct ScriptEngine;

impl ScriptEngine {
    pub fn new() -> Self {
        ScriptEngine
    }

    /// Runs every method in declaration order against `source`, sharing one
    /// global scope across the whole run. Pushes exactly one transaction
    /// boundary at the end if any writes occurred.
    pub fn run(
        &self,
        methods: &[MethodContainer],
        source: &mut dyn ByteSource,
        journal: &UndoJournal,
        dirty: &DirtySet,
    ) -> RunSummary {
        let mut global: Scope = Scope::new();
        let mut last_address: i64 = 0;
        let mut writes = 0usize;
        let mut working_dirty = dirty.begin();

        for method in methods {
            let mut local: Scope = Scope::new();
            for line in &method.body {
                match parse_command(line) {
                    Ok(command) => self.execute(
                        command,
                        source,
                        journal,
                        &mut local,
                        &mut global,
                        &mut last_address,
                        &mut writes,
                        &mut working_dirty,
                    ),
                    Err(e) => tracing::warn!(line = %line, error = %e, "skipping malformed command"),
                }
            }

            for export in &method.exports {
                match local.get(export) {
                    Some(&value) => {
                        global.insert(format!("{}.{}", method.name, export), value);
                    }
                    None => tracing::warn!(
                        method = %method.name,
                        export = %export,
                        "clink export was never bound in local scope"
                    ),
                }
            }
        }

        if writes > 0 {
            journal.commit(writes);
        }
        dirty.publish(working_dirty);

        RunSummary { writes }
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        command: Command,
        source: &mut dyn ByteSource,
        journal: &UndoJournal,
        local: &mut Scope,
        global: &Scope,
        last_address: &mut i64,
        writes: &mut usize,
        working_dirty: &mut std::collections::HashSet<u64>,
    ) {
        match command {
            Command::Find { var, pattern } => {
                let offset = SignatureScanner::parse_pattern(&pattern)
                    .ok()
                    .and_then(|parsed| {
                        SignatureScanner::find_all_in_source(&*source, &parsed, &var, SCAN_CHUNK_SIZE)
                            .first()
                            .map(|m| m.offset as i64)
                    });
                match offset {
                    Some(value) => {
                        tracing::info!(var = %var, offset = value, "found");
                        local.insert(var, value);
                    }
                    None => {
                        tracing::info!(var = %var, "not found");
                        local.insert(var, INVALID);
                    }
                }
            }
            Command::Set { var, expr } => {
                let evaluator = ExprEvaluator::new(local, global, *last_address);
                let value = evaluator.eval(&expr).unwrap_or(INVALID);
                local.insert(var, value);
            }
            Command::Check { addr_expr, bytes } => {
                let evaluator = ExprEvaluator::new(local, global, *last_address);
                let addr = evaluator.eval(&addr_expr).unwrap_or(INVALID);
                if addr == INVALID || addr < 0 {
                    tracing::info!(expr = %addr_expr, "check skipped: address is invalid");
                    return;
                }
                let Ok(pattern) = SignatureScanner::parse_pattern(&bytes) else {
                    tracing::warn!(bytes = %bytes, "check skipped: malformed byte literal");
                    return;
                };
                let mut buf = vec![0u8; pattern.len()];
                source.read_into(addr as u64, &mut buf);
                let mismatch = pattern.iter().zip(&buf).any(|(p, &b)| {
                    matches!(p, binrecon_core::PatternByte::Byte(expected) if *expected != b)
                });
                if mismatch {
                    tracing::info!(addr, "check failed");
                } else {
                    tracing::debug!(addr, "check passed");
                }
            }
            Command::Write { addr_expr, payload } => {
                let evaluator = ExprEvaluator::new(local, global, *last_address);
                let addr = evaluator.eval(&addr_expr).unwrap_or(INVALID);
                if addr == INVALID || addr < 0 {
                    tracing::info!(expr = %addr_expr, "write skipped: address is invalid");
                    return;
                }
                let addr = addr as u64;

                let Some(bytes) = interpret_payload(&payload, addr) else {
                    tracing::warn!(payload = %payload, "write skipped: unrecognized payload");
                    return;
                };
                if bytes.is_empty() {
                    return;
                }
                if addr + bytes.len() as u64 > source.len() {
                    tracing::warn!(addr, len = bytes.len(), "write skipped: out of range");
                    return;
                }

                let mut old = vec![0u8; bytes.len()];
                source.read_into(addr, &mut old);
                journal.record(addr, old.clone(), bytes.clone());
                for (i, &b) in bytes.iter().enumerate() {
                    let _ = source.write_u8(addr + i as u64, b);
                    working_dirty.insert(addr + i as u64);
                }
                *writes += 1;
                *last_address = (addr + bytes.len() as u64) as i64;
                tracing::info!(
                    addr,
                    old = %hex_string(&old),
                    new = %hex_string(&bytes),
                    "patched"
                );
            }
        }
    }
}

fn interpret_payload(payload: &str, addr: u64) -> Option<Vec<u8>> {
    if let Some(bytes) = asm::encode(payload, addr) {
        return Some(bytes);
    }
    if let Some(bytes) = parse_quoted_ascii(payload) {
        return Some(bytes);
    }
    parse_hex_bytes(payload)
}

fn parse_quoted_ascii(payload: &str) -> Option<Vec<u8>> {
    let start = payload.find('"')?;
    let rest = &payload[start + 1..];
    let end = rest.find('"')?;
    Some(rest[..end].as_bytes().to_vec())
}

fn parse_hex_bytes(text: &str) -> Option<Vec<u8>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    tokens.iter().map(|tok| u8::from_str_radix(tok, 16).ok()).collect()
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use binrecon_core::BufferByteSource;

    #[test]
    fn signature_miss_skips_the_dependent_write() {
        let methods = parse(
            "start;\npublic:\n_createMethod(M) {\nfind(X = DE AD BE EF)\nX : nop\n}\nend;\n",
        )
        .unwrap();
        let mut source = BufferByteSource::new(vec![0u8; 64]);
        let journal = UndoJournal::new();
        let dirty = DirtySet::new();
        let engine = ScriptEngine::new();
        let summary = engine.run(&methods, &mut source, &journal, &dirty);

        assert_eq!(summary.writes, 0);
        assert_eq!(journal.entry_count(), 0);
        assert_eq!(journal.transaction_count(), 0);
    }

    #[test]
    fn signature_hit_drives_a_write_at_the_found_offset() {
        let mut data = vec![0u8; 64];
        data[10..14].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let methods = parse(
            "start;\n_createMethod(M) {\nfind(X = DE AD BE EF)\nX : nop\n}\nend;\n",
        )
        .unwrap();
        let mut source = BufferByteSource::new(data);
        let journal = UndoJournal::new();
        let dirty = DirtySet::new();
        let engine = ScriptEngine::new();
        let summary = engine.run(&methods, &mut source, &journal, &dirty);

        assert_eq!(summary.writes, 1);
        assert_eq!(source.as_slice()[10], 0x90);
        assert_eq!(journal.transaction_count(), 1);
        assert!(dirty.snapshot().contains(&10));
    }

    #[test]
    fn jmp_relocation_writes_the_relative_displacement() {
        let methods = parse("start;\n_createMethod(M) {\n(0x00401000) : jmp 0x00402000\n}\nend;\n").unwrap();
        let mut source = BufferByteSource::new(vec![0u8; 0x00402000]);
        let journal = UndoJournal::new();
        let dirty = DirtySet::new();
        let engine = ScriptEngine::new();
        engine.run(&methods, &mut source, &journal, &dirty);

        let bytes = &source.as_slice()[0x00401000..0x00401005];
        assert_eq!(bytes, &[0xE9, 0xFB, 0x0F, 0x00, 0x00]);
    }

    #[test]
    fn transactional_undo_restores_writes_across_two_commands() {
        let methods = parse("start;\n_createMethod(M) {\nset(A = 0)\nA : FF FF\nset(B = 2)\nB : FF FF\n}\nend;\n")
            .unwrap();
        let mut source = BufferByteSource::new(vec![0u8; 8]);
        let journal = UndoJournal::new();
        let dirty = DirtySet::new();
        let engine = ScriptEngine::new();
        let summary = engine.run(&methods, &mut source, &journal, &dirty);
        assert_eq!(summary.writes, 2);

        journal.undo_one(&mut source);
        assert_eq!(source.as_slice(), &[0xFF, 0xFF, 0, 0, 0, 0, 0, 0]);
        journal.undo_one(&mut source);
        assert_eq!(source.as_slice(), &[0u8; 8]);
        assert_eq!(journal.transaction_count(), 0);
    }

    #[test]
    fn clink_export_copies_local_binding_to_namespaced_global() {
        let methods = parse(
            "start;\n_createMethod(M) {\nset(X = 42)\nclink: [X]\n}\nend;\n",
        )
        .unwrap();
        assert_eq!(methods[0].exports, vec!["X"]);
        // The export itself is exercised by `run`; with no second method to
        // consume M.X this just checks the run completes without a write.
        let mut source = BufferByteSource::new(vec![0u8; 8]);
        let journal = UndoJournal::new();
        let dirty = DirtySet::new();
        let engine = ScriptEngine::new();
        let summary = engine.run(&methods, &mut source, &journal, &dirty);
        assert_eq!(summary.writes, 0);
    }

    #[test]
    fn quoted_string_payload_writes_ascii_bytes() {
        let methods = parse("start;\n_createMethod(M) {\nset(X = 0)\nX : \"AB\"\n}\nend;\n").unwrap();
        let mut source = BufferByteSource::new(vec![0u8; 8]);
        let journal = UndoJournal::new();
        let dirty = DirtySet::new();
        let engine = ScriptEngine::new();
        engine.run(&methods, &mut source, &journal, &dirty);
        assert_eq!(&source.as_slice()[0..2], b"AB");
    }

    #[test]
    fn raw_hex_payload_is_the_final_fallback() {
        let methods = parse("start;\n_createMethod(M) {\nset(X = 0)\nX : 90 90 90\n}\nend;\n").unwrap();
        let mut source = BufferByteSource::new(vec![0u8; 8]);
        let journal = UndoJournal::new();
        let dirty = DirtySet::new();
        let engine = ScriptEngine::new();
        engine.run(&methods, &mut source, &journal, &dirty);
        assert_eq!(&source.as_slice()[0..3], &[0x90, 0x90, 0x90]);
    }
}
