//! Shared types for the map/reduce pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ReduceError;

// ─── BlockRange ───────────────────────────────────────────────────────────────

/// The block numbers a plugin wants processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    /// First block to fetch (inclusive).
    pub from: u32,
    /// Last block to fetch (inclusive). `None` = follow the chain tip forever.
    pub to: Option<u32>,
}

impl BlockRange {
    /// A bounded range `[from, to]`.
    pub fn bounded(from: u32, to: u32) -> Self {
        Self { from, to: Some(to) }
    }

    /// An open range starting at `from` that tails the chain.
    pub fn tail(from: u32) -> Self {
        Self { from, to: None }
    }

    /// Build a range from the `(from, to)` pair plugins persist, where
    /// `to == 0` means "no upper bound".
    pub fn from_parts(from: u32, to: u32) -> Self {
        match to {
            0 => Self::tail(from),
            to => Self::bounded(from, to),
        }
    }

    /// Returns `true` if the range has no upper bound.
    pub fn is_tailing(&self) -> bool {
        self.to.is_none()
    }

    /// Validate the range and turn it into a fetch plan.
    pub fn plan(&self) -> Result<FetchPlan, ReduceError> {
        match self.to {
            Some(to) if self.from > to => Err(ReduceError::InvalidRange {
                from: self.from,
                to,
            }),
            Some(to) => Ok(FetchPlan::Bounded { from: self.from, to }),
            None => Ok(FetchPlan::Tailing { from: self.from }),
        }
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to {
            Some(to) => write!(f, "[{}, {}]", self.from, to),
            None => write!(f, "[{}, tip)", self.from),
        }
    }
}

// ─── FetchPlan ────────────────────────────────────────────────────────────────

/// A validated range, as the fetcher walks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// Historical replay of `from..=to`; the block queue is closed at the end.
    Bounded { from: u32, to: u32 },
    /// Open-ended polling of the chain tip starting at `from`.
    Tailing { from: u32 },
}

impl FetchPlan {
    /// The first block the fetcher will ask for.
    pub fn start(&self) -> u32 {
        match *self {
            Self::Bounded { from, .. } | Self::Tailing { from } => from,
        }
    }

    /// Replace the starting block, keeping the mode.
    pub fn starting_at(self, start: u32) -> Result<Self, ReduceError> {
        match self {
            Self::Bounded { to, .. } => BlockRange::bounded(start, to).plan(),
            Self::Tailing { .. } => Ok(Self::Tailing { from: start }),
        }
    }

    /// Number of blocks in a bounded plan, `None` when tailing.
    pub fn block_count(&self) -> Option<u64> {
        match *self {
            Self::Bounded { from, to } => Some(u64::from(to) - u64::from(from) + 1),
            Self::Tailing { .. } => None,
        }
    }
}

// ─── Checkpoint ───────────────────────────────────────────────────────────────

/// Where the fetcher stopped.
///
/// `next_block` is the next block number the fetcher would have fetched. It
/// is a high-water mark: values derived from earlier blocks may still have
/// been in flight when the pipeline stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub next_block: u32,
}

impl Checkpoint {
    pub fn new(next_block: u32) -> Self {
        Self { next_block }
    }
}

// ─── ChainTip ─────────────────────────────────────────────────────────────────

/// The newest block a source can serve, plus how long to wait before asking
/// again when there is nothing new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    pub number: u32,
    pub poll_interval: Duration,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
