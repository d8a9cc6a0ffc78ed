//! Mapper tasks and the pool that owns them.
//!
//! All mappers pull from one shared block queue, so a slow block only holds
//! up the mapper that drew it. The pool holds the original merge sender and
//! drops it after every mapper has exited, which closes the merge channel
//! for the reducer.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{supervise, ErrorLatch, RunProgress};
use crate::error::ReduceError;
use crate::plugin::{BlockMapReducer, Emitter};
use crate::source::{Block, BlockSource};

type SharedQueue<B> = Arc<AsyncMutex<mpsc::Receiver<B>>>;

pub(crate) struct MapperPool<S: BlockSource, P: BlockMapReducer<S>> {
    size: usize,
    source: Arc<S>,
    plugin: Arc<P>,
    queue: SharedQueue<S::Block>,
    merge: mpsc::Sender<P::Value>,
    cancel: CancellationToken,
    progress: Arc<RunProgress>,
    latch: ErrorLatch,
}

impl<S, P> MapperPool<S, P>
where
    S: BlockSource,
    P: BlockMapReducer<S>,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        size: usize,
        source: Arc<S>,
        plugin: Arc<P>,
        queue: SharedQueue<S::Block>,
        merge: mpsc::Sender<P::Value>,
        cancel: CancellationToken,
        progress: Arc<RunProgress>,
        latch: ErrorLatch,
    ) -> Self {
        Self {
            size: size.max(1),
            source,
            plugin,
            queue,
            merge,
            cancel,
            progress,
            latch,
        }
    }

    /// Spawn the mappers, wait for all of them, then close the merge channel.
    pub(crate) async fn run(self) {
        let mut mappers = JoinSet::new();

        for id in 0..self.size {
            let mapper = Mapper {
                id,
                source: Arc::clone(&self.source),
                plugin: Arc::clone(&self.plugin),
                queue: Arc::clone(&self.queue),
                emit: Emitter::new(
                    self.merge.clone(),
                    self.cancel.clone(),
                    Arc::clone(&self.progress),
                ),
                cancel: self.cancel.clone(),
                progress: Arc::clone(&self.progress),
            };
            mappers.spawn(supervise(
                "mapper",
                mapper.run(),
                self.latch.clone(),
                self.cancel.clone(),
            ));
        }
        debug!(mappers = self.size, "mappers started");

        while let Some(joined) = mappers.join_next().await {
            if let Err(e) = joined {
                self.latch.record(
                    "mapper",
                    ReduceError::TaskFailed {
                        task: "mapper".into(),
                        reason: e.to_string(),
                    },
                );
                self.cancel.cancel();
            }
        }

        info!("all mappers stopped");
        // `self.merge` drops here, the last sender besides the emitters the
        // mappers already dropped.
    }
}

struct Mapper<S: BlockSource, P: BlockMapReducer<S>> {
    id: usize,
    source: Arc<S>,
    plugin: Arc<P>,
    queue: SharedQueue<S::Block>,
    emit: Emitter<P::Value>,
    cancel: CancellationToken,
    progress: Arc<RunProgress>,
}

impl<S, P> Mapper<S, P>
where
    S: BlockSource,
    P: BlockMapReducer<S>,
{
    async fn run(self) -> Result<(), ReduceError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                block = async { self.queue.lock().await.recv().await } => block,
            };
            let Some(block) = next else {
                debug!(mapper = self.id, "mapper exiting");
                return Ok(());
            };

            let number = block.number();
            let mapped = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                mapped = self.plugin.map(self.source.as_ref(), &self.emit, &block) => mapped,
            };

            match mapped {
                Ok(()) => {
                    self.progress.record_mapped();
                    debug!(mapper = self.id, block = number, "block mapped");
                }
                Err(ReduceError::Dying) => return Ok(()),
                Err(e) => {
                    warn!(mapper = self.id, block = number, error = %e, "map failed");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBlock, MemoryBlockSource};
    use crate::types::{BlockRange, Checkpoint};
    use async_trait::async_trait;

    struct Doubler;

    #[async_trait]
    impl BlockMapReducer<MemoryBlockSource> for Doubler {
        type Accumulator = ();
        type Value = u32;

        async fn initialise(&mut self, _: &MemoryBlockSource) -> Result<(), ReduceError> {
            Ok(())
        }

        fn block_range(&self) -> BlockRange {
            BlockRange::bounded(1, 1)
        }

        async fn map(
            &self,
            _: &MemoryBlockSource,
            emit: &Emitter<u32>,
            block: &MemoryBlock,
        ) -> Result<(), ReduceError> {
            if block.number == 13 {
                return Err(ReduceError::plugin("map", "unlucky block"));
            }
            emit.emit(block.number * 2).await
        }

        async fn reduce(&self, _: &MemoryBlockSource, _: &mut (), _: u32) -> Result<(), ReduceError> {
            Ok(())
        }

        async fn finalize(&self, _: (), _: Checkpoint) -> Result<(), ReduceError> {
            Ok(())
        }
    }

    fn pool(
        blocks: &[u32],
        size: usize,
    ) -> (
        MapperPool<MemoryBlockSource, Doubler>,
        mpsc::Receiver<u32>,
        ErrorLatch,
    ) {
        let (block_tx, block_rx) = mpsc::channel(blocks.len().max(1));
        for &number in blocks {
            block_tx.try_send(MemoryBlock { number }).unwrap();
        }
        drop(block_tx);

        let (merge_tx, merge_rx) = mpsc::channel(blocks.len().max(1));
        let latch = ErrorLatch::default();
        let pool = MapperPool::new(
            size,
            Arc::new(MemoryBlockSource::new(100)),
            Arc::new(Doubler),
            Arc::new(AsyncMutex::new(block_rx)),
            merge_tx,
            CancellationToken::new(),
            Arc::default(),
            latch.clone(),
        );
        (pool, merge_rx, latch)
    }

    #[tokio::test]
    async fn maps_every_block_and_closes_merge() {
        let (pool, mut rx, latch) = pool(&[1, 2, 3, 4, 5], 3);
        pool.run().await;

        let mut got = vec![];
        while let Some(v) = rx.recv().await {
            got.push(v);
        }
        got.sort_unstable();
        assert_eq!(got, vec![2, 4, 6, 8, 10]);
        assert!(latch.take().is_none());
    }

    #[tokio::test]
    async fn map_error_is_latched() {
        let (pool, _rx, latch) = pool(&[12, 13, 14], 1);
        pool.run().await;

        let err = latch.take().unwrap();
        assert_eq!(err.to_string(), "map failed: unlucky block");
    }
}
