//! # binrecon-core
//!
//! Structural decomposition and byte-level manipulation primitives for
//! Portable Executable files.
//!
//! This crate provides:
//! - A byte-addressable, memory-mapped view over a target file (`byte_source`)
//! - Wildcard signature scanning with Boyer-Moore-Horspool acceleration and
//!   Shannon entropy (`scanner`)
//! - A PE header/section decomposer that emits a navigable tree and a byte
//!   range map (`pe_mapper`)
//! - A restricted x86 instruction encoder (`asm`)
//! - A recursive-descent integer expression evaluator with `INVALID`
//!   propagation (`expr`)
//! - A transactional undo journal (`undo`)
//!
//! ## Example
//!
//! ```no_run
//! use binrecon_core::byte_source::{ByteSource, MmapByteSource};
//! use binrecon_core::pe_mapper::PEMapper;
//!
//! # fn main() -> anyhow::Result<()> {
//! let source = MmapByteSource::open("sample.exe")?;
//! let mut header = vec![0u8; source.len().min(4096) as usize];
//! source.read_into(0, &mut header)?;
//! let (structure, regions) = PEMapper::new().parse(&header, &[]);
//! println!("{}", structure.name());
//! println!("{} regions", regions.len());
//! # Ok(())
//! # }
//! ```

pub mod asm;
pub mod byte_source;
pub mod dirty;
pub mod dos_time;
pub mod expr;
pub mod leb128;
pub mod pe_mapper;
pub mod scanner;
pub mod structure;
pub mod undo;

#[doc(inline)]
pub use byte_source::{BufferByteSource, ByteSource, ByteSourceError, MmapByteSource};
#[doc(inline)]
pub use dirty::DirtySet;
#[doc(inline)]
pub use expr::{ExprEvaluator, ExprError, Scope, INVALID};
#[doc(inline)]
pub use pe_mapper::{PEMapper, RegionProvider};
#[doc(inline)]
pub use scanner::SignatureScanner;
#[doc(inline)]
pub use structure::{
    BinaryStructure, DataRegion, DetectionResult, DetectorKind, PatternByte, RegionKind,
    SignatureMatch, Value,
};
#[doc(inline)]
pub use undo::UndoJournal;
