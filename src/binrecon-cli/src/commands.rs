//! Handlers for each CLI subcommand. Every handler collects failures behind
//! `anyhow::Result`; the library crates themselves never raise across their
//! own interfaces.

use anyhow::{Context, Result};
use binrecon_core::{BinaryStructure, ByteSource, DirtySet, MmapByteSource, PEMapper, SignatureScanner, UndoJournal};
use binrecon_detect::DetectorRegistry;
use std::path::{Path, PathBuf};

const SCAN_CHUNK_SIZE: usize = 1 << 20;

pub fn map(file: &Path) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let (root, regions) = PEMapper::new().parse(&data, &[]);
    print_tree(&root, 0);
    println!("\n{} region(s)", regions.len());
    Ok(())
}

fn print_tree(node: &BinaryStructure, depth: usize) {
    let indent = "  ".repeat(depth);
    let mut line = format!("{indent}{} ({})", node.name(), node.node_type());
    if let Some(offset) = node.offset() {
        line.push_str(&format!(" @ {offset:#010x}"));
    }
    if let Some(display) = node.display_value() {
        line.push_str(&format!(" = {display}"));
    } else if let Some(value) = node.value() {
        line.push_str(&format!(" = {value:?}"));
    }
    println!("{line}");
    for child in node.children() {
        print_tree(&child, depth + 1);
    }
}

pub fn scan(file: &Path, pattern: &str, name: &str, json: bool) -> Result<()> {
    let source = MmapByteSource::open(file).with_context(|| format!("opening {}", file.display()))?;
    let parsed = SignatureScanner::parse_pattern(pattern).context("parsing --pattern")?;
    let matches = SignatureScanner::find_all_in_source(&source, &parsed, name, SCAN_CHUNK_SIZE);

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }
    if matches.is_empty() {
        println!("no matches");
    }
    for m in &matches {
        println!("{:#010x}  {}  {}", m.offset, m.name, m.pattern);
    }
    Ok(())
}

pub async fn detect(file: &Path, json: bool) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let (structure, _regions) = PEMapper::new().parse(&data, &[]);
    let registry = DetectorRegistry::with_builtins();
    let results = registry.analyze(&data, &structure, None).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("no packer/protector detected");
    }
    for result in &results {
        println!(
            "{}  confidence={:.2}  kind={:?}  version={}",
            result.name,
            result.confidence(),
            result.kind,
            result.version.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

pub fn run(file: &Path, script: &Path) -> Result<()> {
    let source_text = std::fs::read_to_string(script).with_context(|| format!("reading {}", script.display()))?;
    let methods = binrecon_script::parse(&source_text).context("parsing script")?;

    let mut source = MmapByteSource::open(file).with_context(|| format!("opening {}", file.display()))?;
    let journal = UndoJournal::new();
    let dirty = DirtySet::new();
    let engine = binrecon_script::ScriptEngine::new();
    let summary = engine.run(&methods, &mut source, &journal, &dirty);
    source.flush().context("flushing patched file")?;

    println!("{} write(s) applied", summary.writes);
    Ok(())
}

pub async fn watch(file: PathBuf, script: PathBuf) -> Result<()> {
    let (_watcher, mut triggers) = binrecon_script::ScriptWatcher::watch(&script)
        .with_context(|| format!("watching {}", script.display()))?;

    tracing::info!(script = %script.display(), "watching for changes");
    run_once(&file, &script)?;

    while let Some(trigger) = triggers.recv().await {
        tracing::info!(?trigger, "re-running script");
        if let Err(e) = run_once(&file, &script) {
            tracing::error!(error = %e, "script run failed");
        }
    }
    Ok(())
}

fn run_once(file: &Path, script: &Path) -> Result<()> {
    run(file, script)
}
