//! The reducer task: sole owner of the accumulator.
//!
//! Drains the merge channel until it closes or the run is cancelled, then
//! waits for the fetcher's checkpoint and hands both to `finalize`. The
//! accumulator is moved into `finalize`, so it can only run once.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::RunProgress;
use crate::error::ReduceError;
use crate::plugin::BlockMapReducer;
use crate::source::BlockSource;
use crate::types::Checkpoint;

pub(crate) struct Reducer<S: BlockSource, P: BlockMapReducer<S>> {
    source: Arc<S>,
    plugin: Arc<P>,
    merge: mpsc::Receiver<P::Value>,
    checkpoint: oneshot::Receiver<Checkpoint>,
    fallback: Checkpoint,
    cancel: CancellationToken,
    progress: Arc<RunProgress>,
}

impl<S, P> Reducer<S, P>
where
    S: BlockSource,
    P: BlockMapReducer<S>,
{
    pub(crate) fn new(
        source: Arc<S>,
        plugin: Arc<P>,
        merge: mpsc::Receiver<P::Value>,
        checkpoint: oneshot::Receiver<Checkpoint>,
        fallback: Checkpoint,
        cancel: CancellationToken,
        progress: Arc<RunProgress>,
    ) -> Self {
        Self {
            source,
            plugin,
            merge,
            checkpoint,
            fallback,
            cancel,
            progress,
        }
    }

    pub(crate) async fn run(mut self, mut acc: P::Accumulator) -> Result<(), ReduceError> {
        let reduced = self.drain(&mut acc).await;
        if let Err(e) = &reduced {
            warn!(error = %e, "reduce failed, stopping pipeline");
            self.cancel.cancel();
        }

        // Nothing more will be reduced; stop mappers blocking on a full
        // merge channel.
        self.merge.close();

        let checkpoint = match self.checkpoint.await {
            Ok(cp) => cp,
            Err(_) => {
                warn!(
                    next_block = self.fallback.next_block,
                    "fetcher exited without a checkpoint, using the start block"
                );
                self.fallback
            }
        };

        info!(next_block = checkpoint.next_block, "finalizing MapReduce");
        let finalized = self.plugin.finalize(acc, checkpoint).await;

        match (reduced, finalized) {
            (Err(e), Err(fe)) => {
                error!(error = %fe, "finalize also failed");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), finalized) => finalized,
        }
    }

    async fn drain(&mut self, acc: &mut P::Accumulator) -> Result<(), ReduceError> {
        loop {
            let value = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("reducer interrupted");
                    return Ok(());
                }
                value = self.merge.recv() => value,
            };
            let Some(value) = value else {
                debug!("merge channel closed");
                return Ok(());
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                reduced = self.plugin.reduce(self.source.as_ref(), acc, value) => reduced?,
            }
            self.progress.record_reduced();
        }
    }
}
