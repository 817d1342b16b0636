//! chainwatch — cross-chain monitoring & alerts CLI (EVM + Algorand).
//!
//! # Commands
//! ```text
//! chainwatch run       [--once] [--dry-run] [--from N] [--to N] [--health ADDR]
//! chainwatch validate
//! chainwatch state
//! chainwatch init      [--path config.yaml] [--force]
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd_init;
mod cmd_run;
mod cmd_state;
mod cmd_validate;

#[derive(Parser)]
#[command(
    name = "chainwatch",
    about = "Cross-chain on-chain event monitor and alerting (EVM + Algorand)",
    version
)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring pipelines
    Run(cmd_run::RunArgs),
    /// Validate the config and ping every RPC endpoint
    Validate,
    /// Show cursors and processing state from the ledger
    State,
    /// Write a commented sample config file
    Init {
        /// Where to write the sample config
        #[arg(long, default_value = "config.yaml")]
        path: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => cmd_run::run(&cli.config, args).await,
        Commands::Validate => cmd_validate::run(&cli.config).await,
        Commands::State => cmd_state::run(&cli.config).await,
        Commands::Init { path, force } => cmd_init::run(&path, force),
    }
}
