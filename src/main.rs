//! repo-tracker CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use repo_tracker::commands::{run_init, run_status, run_watch, CommandContext};
use repo_tracker::{Cli, Commands, TrackerConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run(cli: Cli) -> repo_tracker::Result<String> {
    let mut config = match &cli.config {
        Some(path) => TrackerConfig::load_from(path)?,
        None => TrackerConfig::load()?,
    };
    if let Some(git) = &cli.git {
        config.git_path = Some(git.clone());
    }

    init_logging(&config, cli.verbose);

    let ctx = CommandContext {
        format: cli.format,
        verbose: cli.verbose,
        discover: cli.discover,
        config,
    };

    match &cli.command {
        Commands::Status(args) => run_status(args, &ctx),
        Commands::Watch(args) => run_watch(args, &ctx),
        Commands::Init(args) => run_init(args, &ctx),
    }
}

/// Log to stderr; stdout carries command output
fn init_logging(config: &TrackerConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("repo_tracker={}", level)));

    // Note: This may fail if already initialized, which is fine
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
