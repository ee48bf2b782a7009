use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "keeper", about = "Runs scheduled backups against simulated repositories")]
pub struct Cli {
    /// JSON file with `repos` and `plans`.
    #[arg(long, short, env = "KEEPER_CONFIG")]
    pub config: PathBuf,

    /// Executions allowed to run at once.
    #[arg(long, default_value_t = 1)]
    pub max_concurrent: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Schedule every plan with a cron expression and run until Ctrl-C.
    Run {
        /// Stop after this many seconds instead of waiting for Ctrl-C.
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Back up one plan now and exit.
    Backup {
        #[arg(long)]
        plan: String,
    },
    /// Restore a path from a snapshot now and exit.
    Restore {
        #[arg(long)]
        repo: String,
        #[arg(long, default_value = "")]
        plan: String,
        #[arg(long)]
        snapshot: String,
        #[arg(long)]
        path: String,
        #[arg(long)]
        target: String,
    },
}
