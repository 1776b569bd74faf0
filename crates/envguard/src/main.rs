//! envguard - Validate environment variables against a schema
//!
//! Resolves every declared variable, checks it against its type, and either
//! prints a report with secrets masked (`load`) or launches a command with
//! the values injected (`run`).

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Exit code for schema, config and I/O errors
const EXIT_ERROR: i32 = 2;

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only the report
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new()?;
    let code = match rt.block_on(async { cli::run(cli).await }) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            EXIT_ERROR
        }
    };
    drop(rt);
    std::process::exit(code);
}
