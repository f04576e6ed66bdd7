//! `diskbst` command-line front end.
//!
//! ```text
//! diskbst put  <PATH> <KEY> <VALUE> [--sync]
//! diskbst get  <PATH> <KEY>
//! diskbst load <PATH> <INPUT> [--sync]
//! diskbst info <PATH>
//! ```
//!
//! Logs go to stderr and are filtered by `RUST_LOG` (default `diskbst=info`,
//! or `diskbst=debug` with `--verbose`).

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "diskbst", version)]
#[command(about = "Inspect and modify on-disk binary search tree stores")]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert one key/value pair, creating the store if needed.
    Put {
        path: PathBuf,
        key: String,
        value: String,
        /// Sync file data to disk after the write.
        #[arg(long)]
        sync: bool,
    },
    /// Print the value stored under a key.
    Get { path: PathBuf, key: String },
    /// Insert every `key<TAB>value` line of a text file.
    Load {
        path: PathBuf,
        input: PathBuf,
        /// Sync file data to disk after every write.
        #[arg(long)]
        sync: bool,
    },
    /// Validate the header and print basic file information.
    Info { path: PathBuf },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "diskbst=debug" } else { "diskbst=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut out = std::io::stdout().lock();

    match cli.command {
        Command::Put {
            path,
            key,
            value,
            sync,
        } => {
            commands::put(&path, key.as_bytes(), value.as_bytes(), sync)?;
        }
        Command::Get { path, key } => match commands::get(&path, key.as_bytes())? {
            Some(value) => writeln!(out, "{}", String::from_utf8_lossy(&value))?,
            None => {
                eprintln!("key not found: {key}");
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Load { path, input, sync } => {
            let count = commands::load(&path, &input, sync)?;
            writeln!(out, "loaded {count} pairs")?;
        }
        Command::Info { path } => {
            let info = commands::info(&path)?;
            writeln!(out, "path:  {}", path.display())?;
            writeln!(out, "bytes: {}", info.file_len)?;
            writeln!(out, "empty: {}", info.empty)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
