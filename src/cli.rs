use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Parser)]
#[command(name = "slack-history-export")]
#[command(about = "Export Slack channel history to the console, JSON or CSV")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,

    /// End date (YYYY-MM-DD), inclusive
    #[arg(long)]
    pub end: Option<String>,

    /// Maximum messages per channel (0 = use config default)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,

    /// Output format: console, json, csv (empty = use config default)
    #[arg(long, default_value = "")]
    pub output: String,

    /// Channels to fetch: all, public, private, or comma-separated list (empty = use config default)
    #[arg(long, default_value = "")]
    pub channels: String,

    /// Path to configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fix CSV files with newlines in quoted fields
    FixCsv {
        /// Input CSV file to fix
        input: String,

        /// Output file (default: overwrite input)
        #[arg(short, long)]
        output: Option<String>,

        /// Validate CSV structure after fixing
        #[arg(long)]
        validate: bool,

        /// Create backup of original file
        #[arg(long)]
        backup: bool,
    },
}
