use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "wabbit-bridge",
    version,
    about = "Wabbit Bridge - drive an online learner through its session boundary",
    long_about = "Wabbit Bridge opens learner sessions from configuration strings, streams text examples through them for learning or prediction, and reports failures with the same error kinds foreign hosts see."
)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file (defaults to $WABBIT_BRIDGE_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream examples through a session
    #[command(about = "Learn from or predict on examples read line by line")]
    Run(RunArgs),

    /// Validate configuration strings
    #[command(about = "Open and close a session for each configuration string")]
    Check(CheckArgs),

    /// Show the effective configuration
    #[command(about = "Print the effective bridge configuration as TOML")]
    Config,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Session configuration string
    #[arg(short, long, default_value = "", allow_hyphen_values = true)]
    pub options: String,

    /// Update the model from each example instead of only predicting
    #[arg(short, long)]
    pub learn: bool,

    /// Emit one JSON record per example
    #[arg(long)]
    pub json: bool,

    /// Report failing examples and continue with the next one
    #[arg(short, long)]
    pub keep_going: bool,

    /// Example file, one example per line (stdin when omitted or "-")
    #[arg(help = "Input file")]
    pub input: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Configuration strings to try
    #[arg(help = "Session configuration strings", allow_hyphen_values = true)]
    pub options: Vec<String>,
}
