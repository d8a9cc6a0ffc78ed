//! `chainreduce run`: start a plugin and wait, interrupting on SIGINT/SIGTERM.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use chainreduce_core::{EngineConfig, Interrupter, RunProgress};
use chainreduce_plugins::builtin_registry;
use chainreduce_steem::SteemClient;

use crate::RunArgs;

const TICK: Duration = Duration::from_millis(250);

impl RunArgs {
    fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default().queue_depth_per_mapper(self.queue_depth);
        if let Some(n) = self.mappers {
            config = config.mappers(n);
        }
        if let Some(block) = self.from_block {
            config = config.start_block(block);
        }
        config
    }
}

pub async fn run(args: RunArgs, json_logs: bool) -> Result<()> {
    // Fail on a bad id before touching the network.
    let registry = builtin_registry::<SteemClient>().context("failed to build plugin registry")?;
    let plugin = registry.create(&args.mapreduce_id)?;

    info!(endpoint = %args.rpc_endpoint, "connecting to steemd");
    let client = SteemClient::connect(&args.rpc_endpoint)
        .await
        .with_context(|| format!("failed to connect to {}", args.rpc_endpoint))?;

    let config = args.engine_config();
    info!(
        mapreduce_id = %args.mapreduce_id,
        mappers = config.mapper_count(),
        start_block = ?config.start_block,
        "starting MapReduce"
    );
    let handle = plugin
        .launch(Arc::new(client), &config)
        .await
        .with_context(|| format!("failed to start {}", args.mapreduce_id))?;

    tokio::spawn(interrupt_on_signal(handle.interrupter()));

    let spinner = (!args.no_progress && !json_logs).then(|| spinner(handle.progress()));
    let result = handle.wait().await;
    if let Some((bar, ticker)) = spinner {
        ticker.abort();
        bar.finish_and_clear();
    }

    result.with_context(|| format!("{} failed", args.mapreduce_id))
}

async fn interrupt_on_signal(interrupter: Interrupter) {
    match shutdown_signal().await {
        Ok(signal) => warn!(signal, "signal received, interrupting"),
        Err(e) => warn!(error = %e, "cannot listen for signals, interrupting"),
    }
    interrupter.interrupt();
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
}

fn spinner(progress: Arc<RunProgress>) -> (ProgressBar, tokio::task::JoinHandle<()>) {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}") {
        bar.set_style(style);
    }

    let ticker = {
        let bar = bar.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            loop {
                interval.tick().await;
                let s = progress.snapshot();
                bar.set_message(format!(
                    "next block {} | fetched {} | mapped {} | emitted {} | reduced {}",
                    s.next_block, s.blocks_fetched, s.blocks_mapped, s.values_emitted, s.values_reduced
                ));
                bar.tick();
            }
        })
    };
    (bar, ticker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(mappers: Option<usize>, from_block: Option<u32>) -> RunArgs {
        RunArgs {
            rpc_endpoint: "http://localhost:8090".into(),
            mapreduce_id: "account_pending_payout".into(),
            from_block,
            mappers,
            queue_depth: 4,
            no_progress: true,
        }
    }

    #[test]
    fn flags_map_onto_engine_config() {
        let config = args(Some(3), Some(42)).engine_config();
        assert_eq!(config.mapper_count(), 3);
        assert_eq!(config.block_queue_capacity(), 12);
        assert_eq!(config.start_block, Some(42));
    }

    #[test]
    fn defaults_leave_plugin_in_charge() {
        let config = args(None, None).engine_config();
        assert_eq!(config.mappers, None);
        assert_eq!(config.start_block, None);
        assert_eq!(config.merge_capacity, 1);
    }
}
