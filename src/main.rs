use clap::Parser;
use tailwatch::Settings;
use tailwatch::cli::commands::{init, watch};
use tailwatch::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });

    tailwatch::logging::init_with_config(&config.logging, cli.verbose.then_some("debug"));

    match cli.command {
        Commands::Init { force } => {
            let dir = std::env::current_dir().unwrap_or_else(|_| ".".into());
            init::run_init(&dir, force);
        }

        Commands::Config => init::run_config(&config),

        Commands::Watch {
            file,
            offset,
            follow,
            poll_interval_ms,
            grace_period_ms,
        } => {
            let options = watch::WatchOptions {
                file,
                offset,
                follow,
                poll_interval_ms,
                grace_period_ms,
            };
            if let Err(e) = watch::run_watch(options, &config.watch).await {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        }
    }
}
