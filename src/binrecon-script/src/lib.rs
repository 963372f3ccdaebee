//! # binrecon-script
//!
//! The `.euv` patching DSL: a line-oriented lexer, a small command grammar
//! (`find`/`set`/`check`/write), and an interpreter that drives a
//! [`binrecon_core::ByteSource`] through a transactional undo journal and a
//! published dirty-offset set.
//!
//! A [`watcher::ScriptWatcher`] turns filesystem events on the source `.euv`
//! file into a debounced, coalesced trigger stream so a host can re-run a
//! script automatically as it's edited.

pub mod command;
pub mod engine;
pub mod parser;
pub mod types;
pub mod watcher;

#[doc(inline)]
pub use command::{parse_command, Command};
#[doc(inline)]
pub use engine::{RunSummary, ScriptEngine};
#[doc(inline)]
pub use parser::parse;
#[doc(inline)]
pub use types::{Access, MethodContainer, ScriptError, RESERVED_NAMES};
#[doc(inline)]
pub use watcher::{ScriptWatcher, Trigger, WatcherError};
