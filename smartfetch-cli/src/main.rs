//! SmartFetch CLI
//!
//! Registers resources, runs now/smart wakeups against an origin and
//! manages the telemetry profiles and caches behind them.

mod commands;
mod error;
mod printer;
mod runner;

use clap::{Parser, Subcommand};
use console::style;

use commands::cache::CacheAction;
use commands::config::ConfigCommands;
use commands::resources::RegisterArgs;
use commands::telemetry::TelemetryAction;
use commands::update::{DaemonArgs, UpdateArgs};
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "smartfetch", version = smartfetch::VERSION)]
#[command(about = "Context-aware prefetching and caching of remote resources")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register a resource with a manager
    Register(RegisterArgs),

    /// Remove a resource from a manager
    Unregister {
        /// Resource manager name
        manager: String,
        /// Resource path
        uri: String,
    },

    /// List registered resources
    List {
        /// Only this manager
        manager: Option<String>,
    },

    /// Fetch every registered resource of a manager now
    UpdateNow(UpdateArgs),

    /// Run one smart wakeup for a manager
    UpdateSmart(UpdateArgs),

    /// Run smart wakeups and telemetry sampling until Ctrl+C
    Daemon(DaemonArgs),

    /// Telemetry samples and profiles
    Telemetry {
        #[command(subcommand)]
        action: TelemetryAction,
    },

    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Register(args) => commands::resources::run_register(args),
        Commands::Unregister { manager, uri } => commands::resources::run_unregister(&manager, &uri),
        Commands::List { manager } => commands::resources::run_list(manager.as_deref()),
        Commands::UpdateNow(args) => commands::update::run_now(args),
        Commands::UpdateSmart(args) => commands::update::run_smart(args),
        Commands::Daemon(args) => commands::update::run_daemon(args),
        Commands::Telemetry { action } => commands::telemetry::run(action),
        Commands::Cache { action } => commands::cache::run(action),
        Commands::Config { command } => commands::config::run(command),
    }
}
