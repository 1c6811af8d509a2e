use clap::{Parser, Subcommand};
use remarkable_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "remarkable", version, about = "ReMarkable event engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Event management
    Event {
        #[command(subcommand)]
        action: commands::event::EventAction,
    },
    /// Forward links and backlinks
    Link {
        #[command(subcommand)]
        action: commands::link::LinkAction,
    },
    /// Print the parent/child tree below an event
    Tree {
        /// Root event ID
        id: String,
    },
    /// Scheduling conflict analysis
    Conflicts {
        #[command(subcommand)]
        action: commands::conflict::ConflictAction,
    },
    /// Sync policy inspection
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    // stdout carries JSON output, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Config::load_or_default().logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Event { action } => commands::event::run(action).await,
        Commands::Link { action } => commands::link::run(action).await,
        Commands::Tree { id } => commands::link::tree(&id).await,
        Commands::Conflicts { action } => commands::conflict::run(action).await,
        Commands::Sync { action } => commands::sync::run(action).await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
