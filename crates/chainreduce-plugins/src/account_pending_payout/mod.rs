//! `account_pending_payout` collects the stories an author published in a
//! block range and sums their pending payouts.
//!
//! State lives in `$CHAINREDUCE_PARAMS_DATA_DIR/mapreduce.json`; each run
//! resumes at the stored `next_block`, refreshes the payouts of stories it
//! already knows, and writes a report to `output.txt` next to it.

pub mod data;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use chainreduce_core::{BlockMapReducer, BlockRange, Checkpoint, Emitter, ReduceError};
use chainreduce_steem::{Block, Content, Operation};

use crate::{data_dir_from_env, SteemSource, DATA_DIR_ENV};
pub use data::{Accumulator, Data, PayoutConfig, State, Story};

pub const ID: &str = "account_pending_payout";

pub struct AccountPendingPayout {
    data_dir: PathBuf,
    config: PayoutConfig,
    state: State,
}

impl AccountPendingPayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            config: PayoutConfig::default(),
            state: State::default(),
        }
    }

    /// Use the data directory from the environment; it must be set.
    pub fn from_env() -> Result<Self, ReduceError> {
        data_dir_from_env()
            .map(Self::new)
            .ok_or_else(|| ReduceError::Config(format!("environment variable is not set: {DATA_DIR_ENV}")))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Re-read title and payout of every known story and recompute the total.
    async fn refresh<S: SteemSource>(&self, source: &S, acc: &mut Accumulator) -> Result<(), ReduceError> {
        info!(stories = acc.stories().len(), "updating known stories");

        let mut total = 0.0;
        for story in acc.stories_mut() {
            let content = source.content(&self.config.author, &story.permlink).await?;
            story.title = content.title.clone();
            story.pending_payout = payout_of(&content, "initialise")?;
            total += story.pending_payout;
        }
        acc.total_pending_payout = total;

        info!(total_pending_payout = total, "all known stories updated");
        Ok(())
    }

    fn range_done(&self) -> bool {
        self.state.block_range_to != 0 && self.state.next_block > self.state.block_range_to
    }

    async fn save_refreshed(&self, acc: &Accumulator) -> Result<(), ReduceError> {
        let data = Data {
            config: self.config.clone(),
            state: State {
                updated_at: Some(chrono::Utc::now()),
                ..self.state.clone()
            },
            acc: acc.clone(),
        };
        data::store(&self.data_dir, &data).await?;
        info!(
            next_block = self.state.next_block,
            block_range_to = self.state.block_range_to,
            total_pending_payout = acc.total_pending_payout,
            "block range already processed, refreshed payouts saved"
        );
        Ok(())
    }
}

fn payout_of(content: &Content, stage: &'static str) -> Result<f64, ReduceError> {
    content.pending_payout().ok_or_else(|| {
        ReduceError::plugin(
            stage,
            format!(
                "invalid pending payout {:?} for @{}/{}",
                content.pending_payout_value, content.author, content.permlink
            ),
        )
    })
}

#[async_trait]
impl<S: SteemSource> BlockMapReducer<S> for AccountPendingPayout {
    type Accumulator = Accumulator;
    type Value = Story;

    async fn initialise(&mut self, source: &S) -> Result<Accumulator, ReduceError> {
        info!(data_dir = %self.data_dir.display(), "loading state");
        let Data { config, state, mut acc } = data::load(&self.data_dir).await?;
        self.config = config;
        self.state = state;

        if !acc.stories().is_empty() {
            self.refresh(source, &mut acc).await?;
            // No block left to run, so finalize will never see these payouts.
            if self.range_done() {
                self.save_refreshed(&acc).await?;
            }
        }
        Ok(acc)
    }

    fn block_range(&self) -> BlockRange {
        let from = match self.state.next_block {
            0 => self.state.block_range_from,
            next => next,
        };
        BlockRange::from_parts(from, self.state.block_range_to)
    }

    async fn map(&self, _: &S, emit: &Emitter<Story>, block: &Block) -> Result<(), ReduceError> {
        for op in block.operations() {
            let Operation::Comment(comment) = op else {
                continue;
            };
            if comment.author != self.config.author || !comment.is_story() {
                continue;
            }

            debug!(block = block.number, permlink = %comment.permlink, "story found");
            emit.emit(Story {
                block_number: block.number,
                title: comment.title.clone(),
                permlink: comment.permlink.clone(),
                pending_payout: 0.0,
            })
            .await?;
        }
        Ok(())
    }

    async fn reduce(&self, source: &S, acc: &mut Accumulator, mut story: Story) -> Result<(), ReduceError> {
        // Edits re-emit the story; only the title can change.
        if let Some(known) = acc.get_mut(&story.permlink) {
            known.title = story.title;
            return Ok(());
        }

        let content = source.content(&self.config.author, &story.permlink).await?;
        story.pending_payout = payout_of(&content, "reduce")?;
        info!(
            block = story.block_number,
            permlink = %story.permlink,
            pending_payout = story.pending_payout,
            "new story"
        );
        acc.insert(story);
        Ok(())
    }

    async fn finalize(&self, acc: Accumulator, checkpoint: Checkpoint) -> Result<(), ReduceError> {
        let data = Data {
            config: self.config.clone(),
            state: State {
                next_block: checkpoint.next_block,
                updated_at: Some(chrono::Utc::now()),
                ..self.state.clone()
            },
            acc,
        };
        data::store(&self.data_dir, &data).await?;

        info!(
            stories = data.acc.stories().len(),
            total_pending_payout = data.acc.total_pending_payout,
            next_block = checkpoint.next_block,
            "state saved"
        );
        Ok(())
    }
}
