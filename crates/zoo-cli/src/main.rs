#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use zoo_core::config::{EngineConfig, load_config};
use zoo_core::error::EngineError;

/// Default store file, relative to the working directory.
const DEFAULT_DB: &str = "zoo.sqlite3";

#[derive(Parser, Debug)]
#[command(
    name = "zoo",
    version,
    about = "Specimen ledger maintenance: rebuild and verify aggregates, report stock as of a date"
)]
struct Cli {
    /// Path to the SQLite store.
    #[arg(long, global = true, default_value = DEFAULT_DB)]
    db: PathBuf,

    /// Config file (defaults to ./zoo.toml, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Name written to audit fields.
    #[arg(long, global = true, default_value = "zoo-cli")]
    actor: String,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Create or migrate the store",
        after_help = "EXAMPLES:\n    # Create zoo.sqlite3 in the current directory\n    zoo init\n\n    # Also write a zoo.toml with default settings\n    zoo init --write-config"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        about = "Recompute every specimen and taxon counter from the ledger",
        after_help = "EXAMPLES:\n    # Rebuild after verify reported drift\n    zoo rebuild\n\n    # Use smaller ledger pages\n    zoo rebuild --page-size 1000 --json"
    )]
    Rebuild(cmd::rebuild::RebuildArgs),

    #[command(
        about = "Compare stored counters with the ledger without changing anything",
        after_help = "EXAMPLES:\n    # Exit non-zero when any counter drifted\n    zoo verify\n\n    # List every drifted row as JSON\n    zoo verify --json"
    )]
    Verify(cmd::verify::VerifyArgs),

    #[command(
        about = "Reconstruct specimen stock as of a date",
        after_help = "EXAMPLES:\n    # Everything in the zoo at the end of 2020\n    zoo report --as-of 2020/12/31 --present\n\n    # Every specimen with ledger rows up to today\n    zoo report --json"
    )]
    Report(cmd::report::ReportArgs),

    #[command(
        about = "List aggregate counters for one taxonomic level",
        after_help = "EXAMPLES:\n    # Genus counters\n    zoo taxa genus\n\n    # Phylum counters as JSON\n    zoo taxa phylum --json"
    )]
    Taxa(cmd::taxa::TaxaArgs),
}

/// Settings shared by every command.
pub struct Context {
    pub db: PathBuf,
    pub config: EngineConfig,
    pub actor: String,
    pub output: OutputMode,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ZOO_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "zoo_core=debug,zoo=debug,info"
        } else {
            "zoo_core=info,warn"
        })
    });

    let format = env::var("ZOO_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn report_error(err: &anyhow::Error) {
    if let Some(engine) = err.downcast_ref::<EngineError>() {
        eprintln!("error[{}]: {err:#}", engine.code());
        if let Some(hint) = engine.hint() {
            eprintln!("  hint: {hint}");
        }
    } else {
        eprintln!("error: {err:#}");
    }
}

fn run(cli: Cli, working_dir: &Path) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), working_dir)?;
    let ctx = Context {
        db: working_dir.join(&cli.db),
        config,
        actor: cli.actor,
        output: OutputMode::from_json_flag(cli.json),
    };

    match cli.command {
        Commands::Init(args) => cmd::init::run_init(&args, &ctx, working_dir),
        Commands::Rebuild(args) => cmd::rebuild::run_rebuild(&args, &ctx),
        Commands::Verify(args) => cmd::verify::run_verify(&args, &ctx),
        Commands::Report(args) => cmd::report::run_report(&args, &ctx),
        Commands::Taxa(args) => cmd::taxa::run_taxa(&args, &ctx),
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|working_dir| run(cli, &working_dir));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let args = ["zoo", "report", "--as-of", "2020/01/01", "--json", "--db", "x.db"];
        let cli = Cli::try_parse_from(args).expect("parse");
        assert!(cli.json);
        assert_eq!(cli.db, PathBuf::from("x.db"));
        assert!(matches!(cli.command, Commands::Report(_)));
    }
}
