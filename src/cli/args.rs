use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stagepool")]
#[command(about = "Run synthetic workloads through the worker pool and pipeline engines")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress output on stderr
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process synthetic items with a fixed-size worker pool
    Pool(PoolArgs),

    /// Run synthetic stages through the pipeline orchestrator
    Pipeline(PipelineArgs),
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Engine configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Cancel the run after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct PoolArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Number of items to process
    #[arg(short = 'n', long, default_value = "100")]
    pub items: u64,

    /// Number of workers (overrides the configuration file)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Simulated work time per item
    #[arg(long, default_value = "10")]
    pub delay_ms: u64,

    /// Fail every N-th item (0 disables failures)
    #[arg(long, default_value = "0")]
    pub fail_every: u64,
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Stage names, executed in the given order
    #[arg(short, long, value_delimiter = ',', default_value = "load,transform,store")]
    pub stages: Vec<String>,

    /// Simulated work time per stage
    #[arg(long, default_value = "50")]
    pub stage_delay_ms: u64,

    /// Stage that always fails
    #[arg(long)]
    pub fail_stage: Option<String>,

    /// Stages reported as skippable for the input
    #[arg(long, value_delimiter = ',')]
    pub skip_stage: Vec<String>,

    /// Keep running later stages after a stage fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Maximum retries per stage (overrides the configuration file)
    #[arg(long)]
    pub retries: Option<u32>,

    /// Delay between retries (overrides the configuration file)
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Items processed by a leading worker-pool stage (0 disables it)
    #[arg(short = 'n', long, default_value = "0")]
    pub items: u64,
}
