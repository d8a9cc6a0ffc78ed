//! Where blocks come from.

use async_trait::async_trait;

use crate::error::ReduceError;
use crate::types::ChainTip;

/// A block as far as the engine is concerned: something with a number.
///
/// The body is never looked at by the engine, only handed to the plugin.
pub trait Block: Send + Sync + 'static {
    fn number(&self) -> u32;
}

/// Supplies blocks by number and reports the current chain tip.
///
/// # Thread Safety
/// The same source is shared by the fetcher, every mapper and the reducer,
/// so implementations must be safe to call concurrently (or pool their
/// connections internally). The engine does not serialize access.
#[async_trait]
pub trait BlockSource: Send + Sync + 'static {
    type Block: Block;

    /// Fetch a single block. Retrying transient failures is the source's job.
    async fn fetch_block(&self, number: u32) -> Result<Self::Block, ReduceError>;

    /// The newest block that may be fetched, plus a poll interval hint.
    async fn current_tip(&self) -> Result<ChainTip, ReduceError>;
}
