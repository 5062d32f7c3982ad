pub mod analysis;
pub mod cli;
pub mod commands;
pub mod error;
pub mod models;

use cli::{Cli, Commands};
use colored::Colorize;
use commands::display::TerminalDashboard;
use commands::external_tests::{find_project_root, run_test_command, test_outcome};
use commands::history::HistoryStore;
use commands::scan_loop::ScanController;
use commands::settings::{load_monitor_config, CliOverrides};
use commands::workspace::open_workspace;
use error::{MonitorError, Result};
use std::path::{Path, PathBuf};

/// Logs go to stderr so the dashboard on stdout stays readable.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().map_err(|e| MonitorError::io(e, "."))?;

    match cli.command {
        Commands::Monitor {
            source_dir,
            interval,
            config,
            once,
        } => {
            let overrides = CliOverrides {
                source_dir,
                interval,
                config,
            };
            monitor(&cwd, &overrides, once).await
        }
        Commands::Test { config } => {
            let project_root = find_project_root(&cwd).unwrap_or(cwd);
            external_tests(&project_root, config).await
        }
    }
}

async fn monitor(project_root: &Path, overrides: &CliOverrides, once: bool) -> Result<()> {
    let config = load_monitor_config(project_root, overrides)?;
    let inventory = open_workspace(&config)?;

    println!(
        "{} {}",
        "ViberDash".bold().cyan(),
        "Real-time Code Quality Dashboard".dimmed()
    );
    println!(
        "{}",
        format!("Found {} Python files to analyze", inventory.files.len()).green()
    );
    if !config.exclude_patterns.is_empty() {
        let shown: Vec<&str> = config.exclude_patterns.iter().take(5).map(String::as_str).collect();
        let suffix = if config.exclude_patterns.len() > 5 { "..." } else { "" };
        println!("{}", format!("(excluding patterns: {}{suffix})", shown.join(", ")).dimmed());
    }

    let history = HistoryStore::for_config(&config).map_err(|e| {
        log::error!("history disabled: {e}");
        e.to_string()
    });
    let (mut controller, shutdown) = ScanController::new(config, history);
    let mut dashboard = TerminalDashboard::default();

    if once {
        controller.run_once(&mut dashboard).await;
        return Ok(());
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Stopping after the current scan...".yellow());
            shutdown.stop();
        }
    });

    controller.run(&mut dashboard).await;
    println!("{}", "ViberDash stopped.".dimmed());
    Ok(())
}

async fn external_tests(project_root: &Path, config: Option<PathBuf>) -> Result<()> {
    let overrides = CliOverrides {
        config,
        ..CliOverrides::default()
    };
    let config = load_monitor_config(project_root, &overrides)?;

    println!(
        "{} {} in {}",
        "Running command:".green().bold(),
        config.test_command.as_deref().unwrap_or("").cyan(),
        project_root.display().to_string().dimmed()
    );

    let invocation = run_test_command(&config).await?;
    if !invocation.stdout.is_empty() {
        println!("{}", invocation.stdout);
    }
    if !invocation.stderr.is_empty() {
        eprintln!("{}", invocation.stderr.red());
    }

    test_outcome(&invocation)?;
    println!("{}", "Tests passed successfully!".green().bold());
    Ok(())
}
