//! CLI command definitions and handlers

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use envguard::render::{self, OutputFormat, RenderOptions};
use envguard::inject::{self, Injection};
use envguard::{Engine, ValidationReport};
use envguard_core::Config;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exit code for a failed validation or refused run
const EXIT_INVALID: i32 = 1;
/// Exit code for an interrupt before the child starts
const EXIT_INTERRUPTED: i32 = 130;

/// envguard - Validate environment variables against a schema
#[derive(Parser, Debug)]
#[command(name = "envguard")]
#[command(version)]
#[command(about = "Validate environment variables against a schema, with secrets masked")]
#[command(after_help = "\
EXAMPLES:
    envguard load                     Validate and print a redacted report
    envguard load --quiet             Print nothing unless something is wrong
    envguard load --env=prod          Apply the .env.prod overlay
    envguard load --format json       Machine-readable report
    envguard run -- npm start         Validate, then start with the values injected
    envguard check                    Parse the schema and list its fields

SCHEMA:
    # @type=enum(dev,staging,prod) @sensitive=false
    NODE_ENV=dev
    # @type=string @required @sensitive
    DATABASE_PASSWORD=

Sensitive values never appear in envguard's own output.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Schema file (default: .env.schema, or `schema` from config)
    #[arg(long, global = true)]
    pub schema: Option<PathBuf>,

    /// Disable coloured output (also honours NO_COLOR)
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve and validate every field, then print a redacted report
    Load {
        /// Print only failures
        #[arg(short, long)]
        quiet: bool,

        /// Environment overlay to apply (.env.<name> next to the schema)
        #[arg(long)]
        env: Option<String>,

        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        /// Per-command resolver timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Validate, then launch a command with the resolved values injected
    Run {
        /// Environment overlay to apply (.env.<name> next to the schema)
        #[arg(long)]
        env: Option<String>,

        /// Per-command resolver timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Command to launch
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Parse the schema and list its fields without resolving anything
    Check {
        /// Environment overlay to apply (.env.<name> next to the schema)
        #[arg(long)]
        env: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

/// Run the CLI, returning the process exit code
pub async fn run(cli: Cli) -> Result<i32> {
    let hint = cli
        .schema
        .clone()
        .unwrap_or_else(|| Config::default().schema);
    let config = Config::load(&hint)?;
    let schema = cli.schema.clone().unwrap_or_else(|| config.schema.clone());
    let color = use_color(cli.no_color);

    debug!(schema = ?schema, "loaded config");

    match cli.command {
        Commands::Load {
            quiet,
            env,
            format,
            timeout,
        } => {
            let opts = RenderOptions {
                mask: config.mask.clone(),
                quiet,
                color: color && format == Format::Text,
                max_value_width: config.max_value_width,
                format: format.into(),
            };
            cmd_load(config_with_timeout(config, timeout), &schema, env.as_deref(), &opts).await
        }
        Commands::Run {
            env,
            timeout,
            command,
        } => {
            let opts = RenderOptions {
                mask: config.mask.clone(),
                quiet: false,
                color,
                max_value_width: config.max_value_width,
                format: OutputFormat::Text,
            };
            cmd_run(config_with_timeout(config, timeout), &schema, env.as_deref(), &command, &opts)
                .await
        }
        Commands::Check { env } => cmd_check(config, &schema, env.as_deref(), color),
    }
}

fn config_with_timeout(mut config: Config, timeout: Option<u64>) -> Config {
    if let Some(secs) = timeout.filter(|&s| s > 0) {
        config.resolver_timeout_secs = secs;
    }
    config
}

fn use_color(no_color: bool) -> bool {
    !no_color && std::env::var_os("NO_COLOR").is_none()
}

async fn evaluate(
    engine: &Engine,
    schema: &Path,
    env: Option<&str>,
) -> Result<ValidationReport> {
    let doc = engine.load_schema(schema, env)?;
    Ok(engine.evaluate(&doc, schema, env).await?)
}

/// Validate and print the redacted report
async fn cmd_load(
    config: Config,
    schema: &Path,
    env: Option<&str>,
    opts: &RenderOptions,
) -> Result<i32> {
    let engine = Engine::new(config);
    let report = evaluate(&engine, schema, env).await?;

    print!("{}", render::render(&report, opts));

    Ok(if report.ok() { 0 } else { EXIT_INVALID })
}

/// Validate, then hand the environment to the command
async fn cmd_run(
    config: Config,
    schema: &Path,
    env: Option<&str>,
    command: &[String],
    opts: &RenderOptions,
) -> Result<i32> {
    let engine = Engine::new(config);

    let report = tokio::select! {
        result = evaluate(&engine, schema, env) => result?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted before launch");
            return Ok(EXIT_INTERRUPTED);
        }
    };

    let injection = match inject::prepare(&report, command) {
        Ok(injection) => injection,
        Err(e) => {
            eprint!("{}", render::render(&report, opts));
            eprintln!("error: {}", e);
            return Ok(EXIT_INVALID);
        }
    };

    debug!(program = injection.program(), "launching");
    launch(&injection)
}

/// Replace this process with the child; only returns on failure
#[cfg(unix)]
fn launch(injection: &Injection) -> Result<i32> {
    Err(injection.exec().into())
}

/// Wait for the child and pass its exit status through
#[cfg(not(unix))]
fn launch(injection: &Injection) -> Result<i32> {
    let status = injection.status()?;
    Ok(status.code().unwrap_or(EXIT_INVALID))
}

/// Parse only and list the declared fields
fn cmd_check(config: Config, schema: &Path, env: Option<&str>, color: bool) -> Result<i32> {
    let engine = Engine::new(config);
    let doc = engine.load_schema(schema, env)?;
    // Cycles are schema errors too, even though nothing gets resolved here.
    envguard::resolve::ResolutionPlan::build(&doc)?;
    print!("{}", render::render_schema(&doc, color));
    Ok(0)
}
