use std::path::PathBuf;

use clap::{Parser, Subcommand};
use chatwire::config::Config;
use chatwire::session::JsonFileStore;
use chatwire_cli::commands::{ConfigCommand, HistoryCommand, ProvidersCommand};
use chatwire_cli::error::CliResult;
use chatwire_cli::output::OutputFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chatwire-cli")]
#[command(about = "Chatwire CLI - Manage chat history and provider settings")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Chat history commands")]
    History(HistoryCommand),

    #[clap(about = "List providers with their resolved settings")]
    Providers(ProvidersCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
}

fn main() {
    init_logging();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    match &cli.command {
        Command::Config(cmd) => cmd.execute(cli.config.as_deref(), format),
        Command::Providers(cmd) => {
            let config = Config::load(cli.config.as_deref())?;
            cmd.execute(&config, format)
        }
        Command::History(cmd) => {
            let data_dir = match &cli.data_dir {
                Some(dir) => dir.clone(),
                None => Config::load(cli.config.as_deref())?.session.data_dir,
            };
            tracing::debug!("Using data directory: {}", data_dir.display());
            cmd.execute(&JsonFileStore::in_dir(&data_dir), format)
        }
    }
}
