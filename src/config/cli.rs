use crate::config::ChainMode;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "drive-etl")]
#[command(about = "Load cleaned CSV files from Google Drive into BigQuery via Cloud Storage")]
pub struct Cli {
    /// Optional TOML settings file; environment variables take precedence
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every table once and exit
    Run(RunArgs),
    /// Run on the configured cron schedule until interrupted
    Schedule(RunArgs),
    /// Print the task graph without contacting any service
    Plan(PlanArgs),
    /// List the registered tables and their schemas
    Tables,
}

#[derive(Debug, Clone, Default, Args)]
pub struct PlanArgs {
    /// Only include these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Override how table chains are linked
    #[arg(long, value_enum)]
    pub chain_mode: Option<ChainMode>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Write the run report as JSON to this path
    #[arg(long)]
    pub summary_file: Option<PathBuf>,
}
