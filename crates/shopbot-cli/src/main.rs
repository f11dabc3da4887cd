mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "shopbot",
    about = "Spreadsheet-backed shop, inventory and dice bot for Mastodon",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest shopbot.yaml above the working directory)
    #[arg(long, global = true, env = "SHOPBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Mastodon and the spreadsheet and answer mentions until Ctrl-C
    Run,

    /// Validate the config for common mistakes
    Check,

    /// Run one command text against a local sheet fixture
    Exec(cmd::exec::ExecArgs),

    /// List registered commands
    Commands,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = root::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Run => cmd::run::run(&config_path),
        Commands::Check => cmd::check::run(&config_path, cli.json),
        Commands::Exec(args) => cmd::exec::run(&config_path, args, cli.json),
        Commands::Commands => cmd::commands::run(&config_path, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
