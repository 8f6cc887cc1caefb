//! # cms-transform CLI
//!
//! This is the binary entry point for the `cms-transform` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Initialising logging from the global `--log-level` flag.
//! - Executing the selected command against a directory-backed repository.
//!
//! The orchestration logic lives in the `cms_transform` library crate; the
//! binary is a thin wrapper around it.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
