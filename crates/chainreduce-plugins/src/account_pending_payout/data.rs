//! The `mapreduce.json` state file and the `output.txt` report.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use comfy_table::Table;
use serde::{Deserialize, Serialize};

use chainreduce_core::ReduceError;

pub const STATE_FILENAME: &str = "mapreduce.json";
pub const OUTPUT_FILENAME: &str = "output.txt";

/// Everything persisted between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Data {
    #[serde(default)]
    pub config: PayoutConfig,
    #[serde(default)]
    pub state: State,
    #[serde(default, rename = "accumulator")]
    pub acc: Accumulator,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayoutConfig {
    #[serde(default)]
    pub author: String,
}

/// Where the previous run stopped and what range it was asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub block_range_from: u32,
    /// `0` = follow the chain.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub block_range_to: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub next_block: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

// ─── Accumulator ──────────────────────────────────────────────────────────────

/// A story by the tracked author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub block_number: u32,
    pub title: String,
    pub permlink: String,
    #[serde(default)]
    pub pending_payout: f64,
}

/// Stories in discovery order plus the payout total.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Accumulator {
    #[serde(default)]
    stories: Vec<Story>,
    #[serde(default)]
    pub total_pending_payout: f64,
    /// permlink → index into `stories`; rebuilt after loading.
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Accumulator {
    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    pub fn stories_mut(&mut self) -> &mut [Story] {
        &mut self.stories
    }

    pub fn get_mut(&mut self, permlink: &str) -> Option<&mut Story> {
        let i = *self.index.get(permlink)?;
        self.stories.get_mut(i)
    }

    /// Append a story not seen before and add its payout to the total.
    pub fn insert(&mut self, story: Story) {
        self.total_pending_payout += story.pending_payout;
        self.index.insert(story.permlink.clone(), self.stories.len());
        self.stories.push(story);
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .stories
            .iter()
            .enumerate()
            .map(|(i, s)| (s.permlink.clone(), i))
            .collect();
    }
}

// ─── Persistence ──────────────────────────────────────────────────────────────

/// Load and validate the state file in `dir`.
pub async fn load(dir: &Path) -> Result<Data, ReduceError> {
    let path = dir.join(STATE_FILENAME);
    let raw = tokio::fs::read(&path)
        .await
        .map_err(|e| ReduceError::Config(format!("{}: {e}", path.display())))?;
    let mut data: Data = serde_json::from_slice(&raw)
        .map_err(|e| ReduceError::Config(format!("{}: {e}", path.display())))?;

    if data.config.author.is_empty() {
        return Err(ReduceError::Config(format!(
            "{}: key not set: config.author",
            path.display()
        )));
    }
    data.acc.rebuild_index();
    Ok(data)
}

/// Write the state file and the human-readable report into `dir`.
pub async fn store(dir: &Path, data: &Data) -> Result<(), ReduceError> {
    tokio::fs::create_dir_all(dir).await?;

    let json = serde_json::to_vec_pretty(data)
        .map_err(|e| ReduceError::Other(format!("failed to encode state: {e}")))?;
    tokio::fs::write(dir.join(STATE_FILENAME), json).await?;
    tokio::fs::write(dir.join(OUTPUT_FILENAME), render_output(&data.acc)).await?;
    Ok(())
}

/// The payout report written to `output.txt`.
pub fn render_output(acc: &Accumulator) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Block", "Title", "Pending Payout"]);
    for story in acc.stories() {
        table.add_row(vec![
            story.block_number.to_string(),
            story.title.clone(),
            format!("{:.3}", story.pending_payout),
        ]);
    }

    format!(
        "{table}\n\nTotal pending payout: {:.3}\n",
        acc.total_pending_payout
    )
}
