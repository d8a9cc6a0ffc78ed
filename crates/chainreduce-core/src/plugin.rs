//! The plugin contract and the emit handle mappers hand to it.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::RunProgress;
use crate::error::ReduceError;
use crate::source::BlockSource;
use crate::types::{BlockRange, Checkpoint};

/// A map/reduce job over a block source.
///
/// The engine calls, in order:
///
/// 1. [`initialise`](Self::initialise) once, before any task is spawned;
/// 2. [`block_range`](Self::block_range) once;
/// 3. [`map`](Self::map) once per block, concurrently across blocks;
/// 4. [`reduce`](Self::reduce) once per emitted value, strictly serially;
/// 5. [`finalize`](Self::finalize) exactly once, on clean and interrupted runs.
///
/// Emitted values reach `reduce` in arrival order, not block order. A reducer
/// that cares about order must carry the block number inside `Value`.
///
/// # Cancellation
/// `map` and `reduce` futures are dropped at an `.await` point when the run is
/// interrupted. `reduce` should therefore finish its awaits before it touches
/// the accumulator.
#[async_trait]
pub trait BlockMapReducer<S: BlockSource>: Send + Sync + 'static {
    /// Aggregate state, owned by the reducer task.
    type Accumulator: Send + 'static;
    /// What `map` emits and `reduce` consumes.
    type Value: Send + 'static;

    /// One-time setup: load persisted state, validate config, build the
    /// initial accumulator. Failing here aborts the run before it starts.
    async fn initialise(&mut self, source: &S) -> Result<Self::Accumulator, ReduceError>;

    /// The blocks to process. Called after `initialise`.
    fn block_range(&self) -> BlockRange;

    /// Derive zero or more values from `block` and hand them to `emit`.
    ///
    /// An `Err(ReduceError::Dying)` bubbling up from `emit` is treated as a
    /// clean exit, so plugins can simply use `?`.
    async fn map(
        &self,
        source: &S,
        emit: &Emitter<Self::Value>,
        block: &S::Block,
    ) -> Result<(), ReduceError>;

    /// Fold `value` into `acc`.
    async fn reduce(
        &self,
        source: &S,
        acc: &mut Self::Accumulator,
        value: Self::Value,
    ) -> Result<(), ReduceError>;

    /// Persist or otherwise use the final accumulator together with the
    /// fetcher's checkpoint.
    async fn finalize(
        &self,
        acc: Self::Accumulator,
        checkpoint: Checkpoint,
    ) -> Result<(), ReduceError>;
}

// ─── Emitter ──────────────────────────────────────────────────────────────────

/// Forwards values from a mapper to the reducer.
///
/// Cloneable and `Send + Sync`, so a plugin may emit from helper tasks too.
/// When the pipeline is shutting down, `emit` returns
/// [`ReduceError::Dying`] instead of waiting for a reducer that is gone.
pub struct Emitter<V> {
    tx: mpsc::Sender<V>,
    cancel: CancellationToken,
    progress: Arc<RunProgress>,
}

impl<V> Clone for Emitter<V> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
            progress: Arc::clone(&self.progress),
        }
    }
}

impl<V: Send + 'static> Emitter<V> {
    pub(crate) fn new(
        tx: mpsc::Sender<V>,
        cancel: CancellationToken,
        progress: Arc<RunProgress>,
    ) -> Self {
        Self {
            tx,
            cancel,
            progress,
        }
    }

    /// A standalone emitter and the receiving end, for driving a plugin's
    /// `map` outside the engine (tests, one-off tools).
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<V>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let emitter = Self::new(tx, CancellationToken::new(), Arc::default());
        (emitter, rx)
    }

    /// Send a value to the reducer.
    pub async fn emit(&self, value: V) -> Result<(), ReduceError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReduceError::Dying),
            sent = self.tx.send(value) => {
                sent.map_err(|_| ReduceError::Dying)?;
                self.progress.record_emitted();
                Ok(())
            }
        }
    }

    /// Returns `true` once the pipeline has been told to stop.
    pub fn is_dying(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
