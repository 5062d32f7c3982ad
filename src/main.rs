use clap::Parser;
use colored::Colorize;
use std::process;
use viberdash_lib::cli::Cli;

#[tokio::main]
async fn main() {
    viberdash_lib::init_logging();
    let cli = Cli::parse();
    if let Err(e) = viberdash_lib::run(cli).await {
        eprintln!("{} {e}", "error:".red().bold());
        process::exit(1);
    }
}
