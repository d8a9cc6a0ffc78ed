//! Pipeline lifecycle: startup, cancellation and the first-error latch.
//!
//! # Startup
//! `start` runs the plugin's `initialise` and `block_range` inline; if
//! either fails no task is spawned. Otherwise it spawns the fetcher, the
//! mapper pool (which owns the mapper tasks) and the reducer.
//!
//! # Shutdown
//! - Bounded range done: the fetcher drops the block queue, mappers drain
//!   it and exit, the pool drops the last merge sender, the reducer sees
//!   the channel close and finalizes.
//! - Interrupt or error: the shared token is cancelled, every task leaves
//!   its current suspension point, the reducer finalizes with whatever it
//!   has.

mod fetcher;
mod mapper;
mod reducer;

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::ReduceError;
use crate::plugin::BlockMapReducer;
use crate::source::BlockSource;
use crate::types::Checkpoint;

use fetcher::{CheckpointReporter, Fetcher};
use mapper::MapperPool;
use reducer::Reducer;

/// Initialise `plugin`, validate its range and start the pipeline.
///
/// Must be called from within a Tokio runtime.
pub async fn start<S, P>(
    source: Arc<S>,
    mut plugin: P,
    config: &EngineConfig,
) -> Result<RunHandle, ReduceError>
where
    S: BlockSource,
    P: BlockMapReducer<S>,
{
    info!("initialising MapReduce");
    let acc = plugin.initialise(source.as_ref()).await.map_err(|e| {
        error!(error = %e, "failed to initialise MapReduce");
        e
    })?;

    let range = plugin.block_range();
    let mut plan = range.plan()?;
    if let Some(start) = config.start_block {
        plan = plan.starting_at(start)?;
    }

    let mappers = config.mapper_count();
    info!(
        range = %range,
        start = plan.start(),
        blocks = ?plan.block_count(),
        mappers,
        queue = config.block_queue_capacity(),
        "starting pipeline"
    );

    let cancel = CancellationToken::new();
    let latch = ErrorLatch::default();
    let progress = Arc::new(RunProgress::new(plan.start()));
    let plugin = Arc::new(plugin);

    let (block_tx, block_rx) = mpsc::channel(config.block_queue_capacity());
    let (merge_tx, merge_rx) = mpsc::channel(config.merge_capacity.max(1));
    let (checkpoint_tx, checkpoint_rx) = oneshot::channel();

    let mut tasks = JoinSet::new();

    let fetcher = Fetcher::new(
        Arc::clone(&source),
        plan,
        block_tx,
        cancel.clone(),
        Arc::clone(&progress),
    );
    let reporter = CheckpointReporter::new(plan.start(), checkpoint_tx);
    tasks.spawn(supervise(
        "fetcher",
        fetcher.run(reporter),
        latch.clone(),
        cancel.clone(),
    ));

    let reducer = Reducer::new(
        Arc::clone(&source),
        Arc::clone(&plugin),
        merge_rx,
        checkpoint_rx,
        Checkpoint::new(plan.start()),
        cancel.clone(),
        Arc::clone(&progress),
    );
    tasks.spawn(supervise(
        "reducer",
        reducer.run(acc),
        latch.clone(),
        cancel.clone(),
    ));

    let pool = MapperPool::new(
        mappers,
        source,
        plugin,
        Arc::new(AsyncMutex::new(block_rx)),
        merge_tx,
        cancel.clone(),
        Arc::clone(&progress),
        latch.clone(),
    );
    tasks.spawn(pool.run());

    Ok(RunHandle {
        cancel,
        tasks,
        latch,
        progress,
    })
}

/// Run a task body and route its failure into the latch.
///
/// The first failure also cancels the run so the other stages stop doing
/// useless work.
pub(crate) async fn supervise<F>(
    task: &'static str,
    body: F,
    latch: ErrorLatch,
    cancel: CancellationToken,
) where
    F: Future<Output = Result<(), ReduceError>>,
{
    match body.await {
        Ok(()) => debug!(task, "task finished"),
        Err(e) => {
            latch.record(task, e);
            cancel.cancel();
        }
    }
}

// ─── RunHandle ────────────────────────────────────────────────────────────────

/// A running pipeline.
///
/// Dropping the handle without calling [`wait`](Self::wait) aborts every
/// task, skipping the finalize step.
pub struct RunHandle {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    latch: ErrorLatch,
    progress: Arc<RunProgress>,
}

impl RunHandle {
    /// Ask every task to stop. Idempotent; the reducer still finalizes.
    pub fn interrupt(&self) {
        self.cancel.cancel();
    }

    /// A cloneable handle for interrupting from another task or thread.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter(self.cancel.clone())
    }

    /// Live counters for this run.
    pub fn progress(&self) -> Arc<RunProgress> {
        Arc::clone(&self.progress)
    }

    /// Wait for every task to exit and return the first error, if any.
    pub async fn wait(mut self) -> Result<(), ReduceError> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                self.latch.record(
                    "engine",
                    ReduceError::TaskFailed {
                        task: "pipeline".into(),
                        reason: e.to_string(),
                    },
                );
                self.cancel.cancel();
            }
        }

        match self.latch.take() {
            Some(e) => Err(e),
            None => {
                info!("pipeline finished");
                Ok(())
            }
        }
    }
}

/// Stops a run from anywhere. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Interrupter(CancellationToken);

impl Interrupter {
    pub fn interrupt(&self) {
        self.0.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.is_cancelled()
    }
}

// ─── ErrorLatch ───────────────────────────────────────────────────────────────

/// Keeps the first error any task reports; later ones are only logged.
#[derive(Debug, Clone, Default)]
pub(crate) struct ErrorLatch(Arc<Mutex<Option<ReduceError>>>);

impl ErrorLatch {
    pub(crate) fn record(&self, task: &str, err: ReduceError) {
        let mut slot = self.0.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            error!(task, error = %err, "task failed, stopping pipeline");
            *slot = Some(err);
        } else {
            warn!(task, error = %err, "task failed after an earlier error");
        }
    }

    pub(crate) fn take(&self) -> Option<ReduceError> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).take()
    }
}

// ─── Progress ─────────────────────────────────────────────────────────────────

/// Counters updated by the pipeline tasks, readable at any time.
#[derive(Debug, Default)]
pub struct RunProgress {
    blocks_fetched: AtomicU64,
    blocks_mapped: AtomicU64,
    values_emitted: AtomicU64,
    values_reduced: AtomicU64,
    next_block: AtomicU32,
}

/// A point-in-time copy of [`RunProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub blocks_fetched: u64,
    pub blocks_mapped: u64,
    pub values_emitted: u64,
    pub values_reduced: u64,
    pub next_block: u32,
}

impl RunProgress {
    pub(crate) fn new(next_block: u32) -> Self {
        Self {
            next_block: AtomicU32::new(next_block),
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            blocks_fetched: self.blocks_fetched.load(Ordering::Relaxed),
            blocks_mapped: self.blocks_mapped.load(Ordering::Relaxed),
            values_emitted: self.values_emitted.load(Ordering::Relaxed),
            values_reduced: self.values_reduced.load(Ordering::Relaxed),
            next_block: self.next_block.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_fetched(&self, next_block: u32) {
        self.blocks_fetched.fetch_add(1, Ordering::Relaxed);
        self.next_block.store(next_block, Ordering::Relaxed);
    }

    pub(crate) fn record_mapped(&self) {
        self.blocks_mapped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_emitted(&self) {
        self.values_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reduced(&self) {
        self.values_reduced.fetch_add(1, Ordering::Relaxed);
    }
}
