//! A per-byte undo stack plus a transaction-boundary stack for run-level
//! rollback.
//!
//! All four operations hold a single mutex — the journal is the
//! serialization point between UI-initiated undo and the [`ScriptEngine`]'s
//! write recording.
//!
//! [`ScriptEngine`]: ../../binrecon_script/struct.ScriptEngine.html

use crate::byte_source::ByteSource;
use std::sync::Mutex;

/// `(offset, old_bytes, new_bytes)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    pub offset: u64,
    pub old: Vec<u8>,
    pub new: Vec<u8>,
}

struct State {
    entries: Vec<UndoEntry>,
    transactions: Vec<usize>,
}

/// The journal's history stacks, guarded by a single mutex.
pub struct UndoJournal {
    state: Mutex<State>,
}

impl Default for UndoJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoJournal {
    pub fn new() -> Self {
        UndoJournal {
            state: Mutex::new(State {
                entries: Vec::new(),
                transactions: Vec::new(),
            }),
        }
    }

    pub fn record(&self, offset: u64, old: Vec<u8>, new: Vec<u8>) {
        self.state.lock().unwrap().entries.push(UndoEntry { offset, old, new });
    }

    /// Marks the end of one atomic run: the last `n` entries belong to it.
    /// Callers only invoke this with `n > 0` — a boundary is a positive
    /// count by construction.
    pub fn commit(&self, n: usize) {
        self.state.lock().unwrap().transactions.push(n);
    }

    /// Pops one entry and writes its old bytes back. No-op when the entry
    /// stack is empty.
    pub fn undo_one(&self, source: &mut dyn ByteSource) {
        let entry = self.state.lock().unwrap().entries.pop();
        if let Some(entry) = entry {
            restore(source, &entry);
        }
    }

    /// Pops a transaction boundary, then pops and restores that many
    /// entries. No-op when the transaction stack is empty.
    pub fn undo_transaction(&self, source: &mut dyn ByteSource) {
        let n = self.state.lock().unwrap().transactions.pop();
        let Some(n) = n else { return };
        for _ in 0..n {
            let entry = self.state.lock().unwrap().entries.pop();
            match entry {
                Some(entry) => restore(source, &entry),
                None => break,
            }
        }
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().unwrap().transactions.len()
    }
}

fn restore(source: &mut dyn ByteSource, entry: &UndoEntry) {
    for (i, &byte) in entry.old.iter().enumerate() {
        let _ = source.write_u8(entry.offset + i as u64, byte);
    }
}
