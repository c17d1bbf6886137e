//! Contramock Binary
//!
//! Run with: `contramock [COMMAND]`

mod config;
mod report;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use contramock::base::UNBOUNDED;
use contramock::{Mock, MockError, TypeRegistry, Vars};
use serde_json::Value as Json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "contramock")]
#[command(about = "Check contract-based mock schemas and drive calls against them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: contramock.toml if present)
    #[arg(short, long, global = true, env = "CONTRAMOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a schema and list its functions
    Check {
        /// Schema file
        schema: PathBuf,
    },

    /// Call a function of a schema and print its results as JSON
    Call {
        /// Schema file
        schema: PathBuf,

        /// Function to call
        function: String,

        /// Arguments, one JSON value each
        args: Vec<String>,

        /// Number of times to repeat the call
        #[arg(short = 'n', long, default_value_t = 1)]
        times: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging
    let filter = if cli.verbose {
        "debug"
    } else {
        config.log_filter.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check { schema } => cmd_check(&config, &schema),
        Commands::Call {
            schema,
            function,
            args,
            times,
        } => cmd_call(&config, &schema, &function, &args, times),
    }
}

fn load_mock(config: &Config, path: &Path) -> Result<Mock> {
    let mut registry = TypeRegistry::new();
    for (name, source) in &config.types {
        registry
            .register_schema(name, source)
            .with_context(|| format!("Failed to register type {name}"))?;
    }
    let vars: Vars = config
        .vars
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema: {}", path.display()))?;
    debug!(path = %path.display(), types = registry.names().len(), vars = vars.len(), "compiling schema");
    match Mock::with_vars(&registry, &source, &vars) {
        Ok(mock) => Ok(mock),
        Err(MockError::Compile(errors)) => {
            let name = path.display().to_string();
            eprint!("{}", report::render(&name, &source, &errors));
            bail!("{} has {} error(s)", path.display(), errors.errors().len())
        }
        Err(error) => Err(error.into()),
    }
}

fn cmd_check(config: &Config, path: &Path) -> Result<()> {
    let mock = load_mock(config, path)?;
    for function in mock.functions() {
        println!("{}", function.name());
        for overload in function.overloads() {
            let arity = overload
                .arity()
                .with_context(|| format!("{}: invalid args", function.name()))?;
            let max_calls = match overload
                .max_calls()
                .with_context(|| format!("{}: invalid maxCalls", function.name()))?
            {
                UNBOUNDED => "unbounded".to_string(),
                max => max.to_string(),
            };
            println!("  overload {}: {} args, maxCalls {}", overload.index(), arity, max_calls);
        }
    }
    info!(functions = mock.functions().count(), "schema ok");
    Ok(())
}

fn cmd_call(config: &Config, path: &Path, function: &str, args: &[String], times: u32) -> Result<()> {
    let mut mock = load_mock(config, path)?;
    let args = args
        .iter()
        .enumerate()
        .map(|(index, arg)| {
            serde_json::from_str::<Json>(arg).with_context(|| format!("Argument {index} is not JSON: {arg}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut failed = 0;
    for _ in 0..times {
        match mock.exec_values(function, args.clone()) {
            Ok(values) => println!("{}", Json::Array(values)),
            Err(error @ MockError::NoMatch(_)) => {
                eprintln!("{error}");
                failed += 1;
            }
            Err(error) => return Err(error.into()),
        }
    }

    if let Some(ledger) = mock.ledger(function) {
        for index in 0..ledger.overloads() {
            debug!(function, overload = index, attempts = ledger.attempts(index), "ledger");
        }
        debug!(function, unmatched = ledger.unmatched(), "ledger");
    }
    if failed > 0 {
        bail!("{failed} of {times} call(s) matched no overload");
    }
    Ok(())
}
