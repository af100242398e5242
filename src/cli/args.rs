//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Follow a file and report appends, truncations and deletions
#[derive(Parser, Debug)]
#[command(
    name = "tailwatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch a file for appends, truncation and deletion",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Examples:\n  tailwatch init\n  tailwatch watch /var/log/app.log\n  tailwatch watch app.log --follow --poll-interval-ms 250"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .tailwatch directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .tailwatch/settings.toml")]
    Config,

    /// Watch a file and print each change
    #[command(
        about = "Print modified/truncated/deleted as the file changes",
        long_about = "Wait for FILE to exist, then print one line per change.\n\nWith --follow, a deleted or replaced file is waited for again and watched from its start."
    )]
    Watch {
        /// File to watch (need not exist yet)
        file: PathBuf,

        /// Reader position to measure growth against (defaults to the current end of file)
        #[arg(long)]
        offset: Option<u64>,

        /// Keep watching after the file is deleted or replaced
        #[arg(short, long)]
        follow: bool,

        /// Stat fallback interval in milliseconds (overrides config)
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Pause before truncated/deleted in milliseconds (overrides config)
        #[arg(long)]
        grace_period_ms: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch() {
        let cli = Cli::try_parse_from([
            "tailwatch",
            "watch",
            "app.log",
            "--offset",
            "42",
            "--follow",
            "--poll-interval-ms",
            "250",
        ])
        .unwrap();

        match cli.command {
            Commands::Watch {
                file,
                offset,
                follow,
                poll_interval_ms,
                grace_period_ms,
            } => {
                assert_eq!(file, PathBuf::from("app.log"));
                assert_eq!(offset, Some(42));
                assert!(follow);
                assert_eq!(poll_interval_ms, Some(250));
                assert_eq!(grace_period_ms, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tailwatch", "config", "-v", "--config", "x.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
