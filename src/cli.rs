use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "viberdash", version, about = "Real-time code quality dashboard for Python projects")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the source tree on an interval and show a live dashboard
    Monitor {
        /// Source directory to analyze (default: from config or current directory)
        #[arg(long, short)]
        source_dir: Option<PathBuf>,
        /// Seconds between scans (default: from config or 180)
        #[arg(long, short)]
        interval: Option<u64>,
        /// Configuration file (default: viberdash.toml, then pyproject.toml)
        #[arg(long, short, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Run a single scan and exit
        #[arg(long)]
        once: bool,
    },
    /// Run the project's configured test command
    Test {
        #[arg(long, short, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_monitor_flags() {
        let cli = Cli::parse_from(["viberdash", "monitor", "-s", "src", "--interval", "30", "--once"]);
        match cli.command {
            Commands::Monitor { source_dir, interval, config, once } => {
                assert_eq!(source_dir, Some(PathBuf::from("src")));
                assert_eq!(interval, Some(30));
                assert_eq!(config, None);
                assert!(once);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_test_subcommand() {
        let cli = Cli::parse_from(["viberdash", "test", "--config", "ci.toml"]);
        assert!(matches!(cli.command, Commands::Test { config: Some(_) }));
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
