//! The fetcher walks the block range and feeds the block queue.
//!
//! # Bounded mode
//! Fetch `from..=to` in order; return when done. Dropping the queue sender on
//! return is what tells the mappers there are no more blocks.
//!
//! # Tailing mode
//! Poll the source's tip; fetch every block up to it; sleep for the
//! source's poll interval when there is nothing new. Only stops on
//! cancellation or error.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::RunProgress;
use crate::error::ReduceError;
use crate::source::BlockSource;
use crate::types::{Checkpoint, FetchPlan};

/// Delivers the fetcher's checkpoint exactly once, when dropped.
///
/// Reporting from `Drop` covers every way out of the fetcher: normal
/// return, `?` on an error, cancellation, and unwinding.
pub(crate) struct CheckpointReporter {
    next: u32,
    tx: Option<oneshot::Sender<Checkpoint>>,
}

impl CheckpointReporter {
    pub(crate) fn new(start: u32, tx: oneshot::Sender<Checkpoint>) -> Self {
        Self { next: start, tx: Some(tx) }
    }

    /// Record that `delivered` made it into the block queue.
    fn advance(&mut self, delivered: u32) {
        self.next = delivered.saturating_add(1);
    }
}

impl Drop for CheckpointReporter {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            debug!(next_block = self.next, "reporting checkpoint");
            // The reducer may already be gone if the run was aborted.
            let _ = tx.send(Checkpoint::new(self.next));
        }
    }
}

pub(crate) struct Fetcher<S: BlockSource> {
    source: Arc<S>,
    plan: FetchPlan,
    queue: mpsc::Sender<S::Block>,
    cancel: CancellationToken,
    progress: Arc<RunProgress>,
}

impl<S: BlockSource> Fetcher<S> {
    pub(crate) fn new(
        source: Arc<S>,
        plan: FetchPlan,
        queue: mpsc::Sender<S::Block>,
        cancel: CancellationToken,
        progress: Arc<RunProgress>,
    ) -> Self {
        Self {
            source,
            plan,
            queue,
            cancel,
            progress,
        }
    }

    pub(crate) async fn run(self, mut reporter: CheckpointReporter) -> Result<(), ReduceError> {
        match self.plan {
            FetchPlan::Bounded { from, to } => self.replay(from, to, &mut reporter).await,
            FetchPlan::Tailing { from } => self.tail(from, &mut reporter).await,
        }
    }

    async fn replay(
        &self,
        from: u32,
        to: u32,
        reporter: &mut CheckpointReporter,
    ) -> Result<(), ReduceError> {
        info!(from, to, "fetching blocks in range");

        for number in from..=to {
            if !self.deliver(number, reporter).await? {
                return Ok(());
            }
        }

        info!(to, "all blocks fetched and enqueued");
        Ok(())
    }

    async fn tail(&self, from: u32, reporter: &mut CheckpointReporter) -> Result<(), ReduceError> {
        info!(from, "tailing the chain");
        let mut next = from;

        loop {
            let tip = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                tip = self.source.current_tip() => tip?,
            };

            if next > tip.number {
                debug!(next, tip = tip.number, "no new blocks, waiting");
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(tip.poll_interval) => continue,
                }
            }

            debug!(from = next, to = tip.number, "catching up with the tip");
            while next <= tip.number {
                if !self.deliver(next, reporter).await? {
                    return Ok(());
                }
                next = match next.checked_add(1) {
                    Some(n) => n,
                    None => {
                        warn!("reached the end of the block number space");
                        return Ok(());
                    }
                };
            }
        }
    }

    /// Fetch one block and push it into the queue.
    ///
    /// Returns `Ok(false)` if the run is being cancelled (or every mapper is
    /// gone), in which case the caller should just return.
    async fn deliver(
        &self,
        number: u32,
        reporter: &mut CheckpointReporter,
    ) -> Result<bool, ReduceError> {
        let block = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(false),
            block = self.source.fetch_block(number) => block?,
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(false),
            sent = self.queue.send(block) => {
                if sent.is_err() {
                    debug!(number, "block queue closed");
                    return Ok(false);
                }
            }
        }

        reporter.advance(number);
        self.progress.record_fetched(number.saturating_add(1));
        debug!(number, "block enqueued");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBlockSource;
    use crate::source::Block;
    use std::time::Duration;

    fn fetcher(
        source: Arc<MemoryBlockSource>,
        plan: FetchPlan,
        capacity: usize,
    ) -> (
        Fetcher<MemoryBlockSource>,
        mpsc::Receiver<crate::memory::MemoryBlock>,
        CancellationToken,
    ) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let f = Fetcher::new(source, plan, tx, cancel.clone(), Arc::default());
        (f, rx, cancel)
    }

    #[tokio::test]
    async fn bounded_fetches_in_order_and_closes_queue() {
        let source = Arc::new(MemoryBlockSource::new(1_000));
        let (f, mut rx, _cancel) = fetcher(source.clone(), FetchPlan::Bounded { from: 100, to: 105 }, 16);
        let (tx, cp) = oneshot::channel();

        f.run(CheckpointReporter::new(100, tx)).await.unwrap();

        let mut got = vec![];
        while let Some(b) = rx.recv().await {
            got.push(b.number());
        }
        assert_eq!(got, vec![100, 101, 102, 103, 104, 105]);
        assert_eq!(source.fetched(), got);
        assert_eq!(cp.await.unwrap(), Checkpoint::new(106));
    }

    #[tokio::test]
    async fn fetch_error_still_reports_checkpoint() {
        let source = Arc::new(MemoryBlockSource::new(1_000).fail_at(3));
        let (f, _rx, _cancel) = fetcher(source, FetchPlan::Bounded { from: 1, to: 10 }, 16);
        let (tx, cp) = oneshot::channel();

        let err = f.run(CheckpointReporter::new(1, tx)).await.unwrap_err();
        assert!(matches!(err, ReduceError::Source(_)));
        assert_eq!(cp.await.unwrap(), Checkpoint::new(3));
    }

    #[tokio::test]
    async fn cancel_while_queue_is_full() {
        let source = Arc::new(MemoryBlockSource::new(1_000));
        let (f, _rx, cancel) = fetcher(source, FetchPlan::Bounded { from: 1, to: 100 }, 2);
        let (tx, cp) = oneshot::channel();

        let handle = tokio::spawn(f.run(CheckpointReporter::new(1, tx)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("fetcher did not stop")
            .unwrap()
            .unwrap();
        // Blocks 1 and 2 fit in the queue; block 3 was fetched but never delivered.
        assert_eq!(cp.await.unwrap(), Checkpoint::new(3));
    }

    #[tokio::test]
    async fn tailing_follows_the_tip() {
        let source = Arc::new(MemoryBlockSource::new(3).with_poll_interval(Duration::from_millis(5)));
        let (f, mut rx, cancel) = fetcher(source.clone(), FetchPlan::Tailing { from: 1 }, 16);
        let (tx, cp) = oneshot::channel();
        let handle = tokio::spawn(f.run(CheckpointReporter::new(1, tx)));

        for expected in 1..=3 {
            assert_eq!(rx.recv().await.unwrap().number(), expected);
        }
        source.set_tip(5);
        for expected in 4..=5 {
            assert_eq!(rx.recv().await.unwrap().number(), expected);
        }

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(cp.await.unwrap(), Checkpoint::new(6));
        assert!(rx.recv().await.is_none());
    }
}
