use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Live progress bars and boxed stage summaries.
    HumanReadable,
    /// Emit JSON lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "pokes",
    author,
    version,
    about = "Staged load generator",
    long_about = "pokes drives a target with an ordered list of load stages.\n\nA rate stage submits requests at a fixed rate for a fixed duration regardless of how fast they complete. A volume stage runs an exact number of requests with bounded concurrency.\n\nThe target and stages are described in a YAML plan.",
    after_help = "Examples:\n  pokes run plan.yaml\n  pokes run plan.yaml --url http://127.0.0.1:8081/pixel --output json\n  pokes run plan.yaml --percentiles 50,95,99.9 -vv"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test plan
    #[command(
        long_about = "Run every stage of a YAML plan in order and print a summary per stage.\n\nCLI flags override values from the plan. Ctrl-C stops the running stage and skips the rest."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the plan (.yaml)
    pub plan: PathBuf,

    /// Override the target URL
    #[arg(long)]
    pub url: Option<String>,

    /// Workers per unit of rate for rate stages
    #[arg(long)]
    pub headroom: Option<u32>,

    /// Progress report interval (e.g. 1s, 500ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub report_interval: Option<Duration>,

    /// Percentile ranks for stage summaries (comma separated, e.g. 50,90,99.9)
    #[arg(long, value_delimiter = ',')]
    pub percentiles: Option<Vec<f64>>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}
