//! ChainReduce CLI: run a MapReduce implementation over Steem blocks.
//!
//! # Commands
//! ```text
//! chainreduce run  --mapreduce-id <id> [--rpc-endpoint <url>] [--from-block <n>]
//! chainreduce list
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;

use chainreduce_plugins::{builtin_registry, DATA_DIR_ENV};
use chainreduce_steem::{SteemClient, DEFAULT_RPC_ENDPOINT};

mod cmd_run;
mod logging;

use logging::LogConfig;

#[derive(Parser)]
#[command(
    name = "chainreduce",
    about = "Streaming map/reduce over Steem blocks",
    long_about = "
ChainReduce fetches blocks from a Steem node, maps them in parallel and
reduces the results with a pluggable MapReduce implementation.

ENVIRONMENT VARIABLES:
  CHAINREDUCE_RPC_ENDPOINT      steemd JSON-RPC endpoint
  CHAINREDUCE_MAPREDUCE_ID      MapReduce implementation to run
  CHAINREDUCE_PARAMS_DATA_DIR   data directory of the MapReduce implementation
  CHAINREDUCE_LOG_LEVEL         default log level
",
    version
)]
struct Cli {
    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a MapReduce implementation until its range is done or it is interrupted
    Run(RunArgs),

    /// List the available MapReduce implementations
    List,
}

#[derive(Args)]
pub struct RunArgs {
    /// steemd JSON-RPC endpoint
    #[arg(long, env = "CHAINREDUCE_RPC_ENDPOINT", default_value = DEFAULT_RPC_ENDPOINT)]
    pub rpc_endpoint: String,

    /// Id of the MapReduce implementation to run
    #[arg(long, env = "CHAINREDUCE_MAPREDUCE_ID")]
    pub mapreduce_id: String,

    /// Start here instead of where the implementation would
    #[arg(long)]
    pub from_block: Option<u32>,

    /// Number of mapper tasks (default: CPUs - 1)
    #[arg(long)]
    pub mappers: Option<usize>,

    /// Blocks buffered per mapper
    #[arg(long, default_value_t = 10)]
    pub queue_depth: usize,

    /// Hide the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args)]
struct LogArgs {
    /// Default log level
    #[arg(long, global = true, env = "CHAINREDUCE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Per-crate override, e.g. `chainreduce_steem=debug` (repeatable)
    #[arg(long = "log-component", global = true, value_parser = parse_component)]
    log_components: Vec<(String, String)>,

    /// Emit JSON logs
    #[arg(long, global = true)]
    log_json: bool,
}

impl LogArgs {
    fn config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            components: self.log_components.iter().cloned().collect::<HashMap<_, _>>(),
            json: self.log_json,
        }
    }
}

fn parse_component(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((component, level)) if !component.is_empty() && !level.is_empty() => {
            Ok((component.to_string(), level.to_string()))
        }
        _ => Err(format!("expected <component>=<level>, got {s:?}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log = cli.log.config();
    logging::init_tracing(&log)?;

    match cli.command {
        Commands::Run(args) => cmd_run::run(args, log.json).await,
        Commands::List => cmd_list(),
    }
}

fn cmd_list() -> Result<()> {
    let registry = builtin_registry::<SteemClient>()?;
    println!("Available MapReduce implementations:");
    for id in registry.ids() {
        println!("  {id}");
    }
    println!();
    println!("Each reads its settings from the directory in {DATA_DIR_ENV}.");
    Ok(())
}
