//! In-memory block source.
//!
//! Serves synthetic blocks up to a movable tip and records every fetch.
//! Useful for tests, dry runs and plugins that do not need real chain data.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::ReduceError;
use crate::source::{Block, BlockSource};
use crate::types::ChainTip;

/// A synthetic block carrying only its number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBlock {
    pub number: u32,
}

impl Block for MemoryBlock {
    fn number(&self) -> u32 {
        self.number
    }
}

#[derive(Debug, Default)]
struct Inner {
    tip: u32,
    fetched: Vec<u32>,
    fail_at: Option<u32>,
    stall_from: Option<u32>,
}

/// In-memory `BlockSource` with a configurable tip, failure and stall points.
#[derive(Debug)]
pub struct MemoryBlockSource {
    inner: Mutex<Inner>,
    poll_interval: Duration,
}

impl MemoryBlockSource {
    /// A source whose tip is `tip`; every block `<= tip` can be fetched.
    pub fn new(tip: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tip,
                ..Default::default()
            }),
            poll_interval: Duration::from_millis(10),
        }
    }

    /// Set the poll interval reported with the tip.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Make fetching block `number` fail with a source error.
    pub fn fail_at(self, number: u32) -> Self {
        self.state().fail_at = Some(number);
        self
    }

    /// Make fetching any block `>= number` hang until cancelled.
    pub fn stall_from(self, number: u32) -> Self {
        self.state().stall_from = Some(number);
        self
    }

    /// Move the tip, making more blocks available to a tailing fetcher.
    pub fn set_tip(&self, tip: u32) {
        self.state().tip = tip;
    }

    /// Block numbers fetched so far, in fetch order.
    pub fn fetched(&self) -> Vec<u32> {
        self.state().fetched.clone()
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl BlockSource for MemoryBlockSource {
    type Block = MemoryBlock;

    async fn fetch_block(&self, number: u32) -> Result<MemoryBlock, ReduceError> {
        let stall = {
            let mut inner = self.state();
            if inner.fail_at == Some(number) {
                return Err(ReduceError::Source(format!("failed to fetch block {number}")));
            }
            if number > inner.tip {
                return Err(ReduceError::Source(format!("block {number} not found")));
            }
            let stall = inner.stall_from.is_some_and(|from| number >= from);
            if !stall {
                inner.fetched.push(number);
            }
            stall
        };

        if stall {
            std::future::pending::<()>().await;
        }
        Ok(MemoryBlock { number })
    }

    async fn current_tip(&self) -> Result<ChainTip, ReduceError> {
        Ok(ChainTip {
            number: self.state().tip,
            poll_interval: self.poll_interval,
        })
    }
}
