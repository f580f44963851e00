mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use commands::seed::SeedArgs;
use config::VestaConfig;

/// Exit status for fatal evaluation errors.
pub(crate) const EXIT_FATAL: i32 = 1;
/// Exit status for bad flags and unreadable configuration.
pub(crate) const EXIT_USAGE: i32 = 2;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Vesta policy function evaluator.
#[derive(Parser)]
#[command(name = "vesta", version, about = "Vesta policy function evaluator")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to the configuration file (default: ./vesta.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `vesta_eval=trace` (overrides config and RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Work directory holding `modules/`
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    /// Namespace to evaluate in
    #[arg(long, global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a call expression such as `join(",", "hosts")`
    Call {
        /// The call expression
        expr: String,
        #[command(flatten)]
        seed: SeedArgs,
    },

    /// Run a module helper and show the classes and variables it defines
    Module {
        /// Command line of the helper
        command: String,
        #[command(flatten)]
        seed: SeedArgs,
    },

    /// List the built-in functions
    Functions {
        /// Only functions in this category (data, files, io, communication, system, utils)
        #[arg(long)]
        category: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut config = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("error: {}", e), cli.output, cli.quiet);
            process::exit(EXIT_USAGE);
        }
    };
    apply_overrides(&mut config, &cli);

    if let Err(e) = init_logging(config.log_level.as_deref()) {
        report_error(&format!("error: {}", e), cli.output, cli.quiet);
        process::exit(EXIT_USAGE);
    }

    match cli.command {
        Commands::Call { expr, seed } => {
            commands::call::cmd_call(&expr, &seed, &config, cli.output, cli.quiet);
        }
        Commands::Module { command, seed } => {
            commands::module::cmd_module(&command, &seed, &config, cli.output, cli.quiet);
        }
        Commands::Functions { category } => {
            commands::functions::cmd_functions(category.as_deref(), cli.output, cli.quiet);
        }
    }
}

fn apply_overrides(config: &mut VestaConfig, cli: &Cli) {
    if let Some(workdir) = &cli.workdir {
        config.workdir = workdir.clone();
    }
    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = Some(level.clone());
    }
}

/// Install the stderr subscriber. An explicit level wins over `RUST_LOG`;
/// with neither, only warnings and errors are shown.
fn init_logging(level: Option<&str>) -> Result<(), String> {
    let filter = match level {
        Some(level) => {
            EnvFilter::try_new(level).map_err(|e| format!("invalid log level '{}': {}", level, e))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

pub(crate) fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("serialization error: {}", e))
    );
}
