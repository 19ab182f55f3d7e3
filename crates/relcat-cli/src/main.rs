//! relcat command-line shell
//!
//! An interactive shell over an in-memory catalog for exploring object
//! dependencies, ownership and transactional DDL.

mod commands;
mod completer;
mod executor;
mod formatter;
mod repl;
mod statement;

use clap::Parser;
use executor::Session;
use formatter::OutputFormat;
use relcat_core::config::{DEFAULT_MAX_CASCADE_DEPTH, DEFAULT_SCHEMA};
use relcat_core::CatalogConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// relcat command-line shell
#[derive(Parser, Debug)]
#[command(name = "relcat")]
#[command(version, about = "Dependency-tracking catalog shell")]
pub struct Args {
    /// Execute statements and exit
    #[arg(short = 'c', long)]
    pub command: Option<String>,

    /// Execute statements from file
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Schema used for unqualified names
    #[arg(long, default_value = DEFAULT_SCHEMA)]
    pub default_schema: String,

    /// Maximum nesting of cascading drops
    #[arg(long, default_value_t = DEFAULT_MAX_CASCADE_DEPTH)]
    pub max_cascade_depth: usize,
}

impl Args {
    fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig::new()
            .with_default_schema(self.default_schema.clone())
            .with_max_cascade_depth(self.max_cascade_depth)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::new(args.catalog_config());

    if let Some(command) = &args.command {
        run_command_mode(session, command, args.format)
    } else if let Some(file) = &args.file {
        run_script_mode(session, file, args.format)
    } else {
        repl::run(session, args.format)
    }
}

/// Execute the statements of `-c` and exit, stopping at the first error.
fn run_command_mode(
    mut session: Session,
    command: &str,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let formatter = formatter::create_formatter(format);

    for statement in statement::split_statements(command) {
        match session.execute(&statement, &*formatter) {
            Ok(output) => println!("{}", output),
            Err(e) => {
                eprintln!("{}", formatter.format_error(&e.to_string()));
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

/// Execute statements from a file, continuing past errors.
fn run_script_mode(
    mut session: Session,
    file: &PathBuf,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let formatter = formatter::create_formatter(format);

    // Drop comment lines before splitting into statements
    let script: String = content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.starts_with("--") && !l.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    for statement in statement::split_statements(&script) {
        match session.execute(&statement, &*formatter) {
            Ok(output) => {
                if !output.is_empty() {
                    println!("{}", output);
                }
            }
            Err(e) => {
                eprintln!("Error executing '{}': {}", statement, e);
            }
        }
    }

    Ok(())
}
