//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tuning knobs for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of mapper tasks. `None` = one less than the available
    /// parallelism, but at least one.
    #[serde(default)]
    pub mappers: Option<usize>,
    /// Block queue capacity per mapper (queue size = mappers × this).
    #[serde(default = "default_queue_depth")]
    pub queue_depth_per_mapper: usize,
    /// Capacity of the channel between mappers and the reducer.
    #[serde(default = "default_merge_capacity")]
    pub merge_capacity: usize,
    /// Start here instead of at the plugin's declared `from`.
    #[serde(default)]
    pub start_block: Option<u32>,
}

fn default_queue_depth() -> usize { 10 }
fn default_merge_capacity() -> usize { 1 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mappers: None,
            queue_depth_per_mapper: default_queue_depth(),
            merge_capacity: default_merge_capacity(),
            start_block: None,
        }
    }
}

impl EngineConfig {
    /// Set the number of mapper tasks.
    pub fn mappers(mut self, n: usize) -> Self {
        self.mappers = Some(n);
        self
    }

    /// Set the per-mapper block queue depth.
    pub fn queue_depth_per_mapper(mut self, depth: usize) -> Self {
        self.queue_depth_per_mapper = depth;
        self
    }

    /// Set the merge channel capacity.
    pub fn merge_capacity(mut self, capacity: usize) -> Self {
        self.merge_capacity = capacity;
        self
    }

    /// Override the first block to fetch.
    pub fn start_block(mut self, block: u32) -> Self {
        self.start_block = Some(block);
        self
    }

    /// Resolved mapper count (always `>= 1`).
    pub fn mapper_count(&self) -> usize {
        match self.mappers {
            Some(n) => n.max(1),
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                cpus.saturating_sub(1).max(1)
            }
        }
    }

    /// Resolved block queue capacity (always `>= 1`).
    pub fn block_queue_capacity(&self) -> usize {
        (self.mapper_count() * self.queue_depth_per_mapper).max(1)
    }
}
