//! Command-line surface: argument parsing only, no business logic.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "binrecon", version, about = "Static PE analysis engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse a PE file's headers and section table into a navigable tree.
    Map {
        /// Path to the target PE file.
        #[arg(env = "BINRECON_FILE")]
        file: PathBuf,
    },

    /// Search a file for a wildcard byte pattern (e.g. `DE AD ?? EF`).
    Scan {
        #[arg(env = "BINRECON_FILE")]
        file: PathBuf,
        /// Whitespace-separated hex bytes; `??` or `?` matches any byte.
        #[arg(long)]
        pattern: String,
        /// Label attached to every reported match.
        #[arg(long, default_value = "scan")]
        name: String,
        /// Print matches as a JSON array instead of plain text.
        #[arg(long)]
        json: bool,
    },

    /// Run every built-in packer/protector detector against a file.
    Detect {
        #[arg(env = "BINRECON_FILE")]
        file: PathBuf,
        /// Print results as a JSON array instead of plain text.
        #[arg(long)]
        json: bool,
    },

    /// Parse and execute a `.euv` script against a file, patching it in place.
    Run {
        #[arg(env = "BINRECON_FILE")]
        file: PathBuf,
        /// Path to the `.euv` script.
        #[arg(long)]
        script: PathBuf,
    },

    /// Re-run a `.euv` script every time it changes on disk.
    Watch {
        #[arg(env = "BINRECON_FILE")]
        file: PathBuf,
        #[arg(long)]
        script: PathBuf,
    },
}
