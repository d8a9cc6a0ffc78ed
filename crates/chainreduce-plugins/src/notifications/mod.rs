//! `notifications` tails the chain and sends a notification for every
//! story, comment or vote that matches the watch lists in `config.yml`.

pub mod config;
pub mod events;
pub mod notifier;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};

use chainreduce_core::{BlockMapReducer, BlockRange, Checkpoint, Emitter, ReduceError};
use chainreduce_steem::{Block, Operation};

use crate::{data_dir_from_env, SteemSource};
use config::{Config, NotifierKind};
use events::{Event, EventMiner};
use notifier::{CommandNotifier, EmailNotifier, Notifier, SlackNotifier};

pub const ID: &str = "notifications";

/// Used when the data directory is not set in the environment.
pub const DEFAULT_DATA_DIR: &str = "chainreduce_data/notifications";

/// How many events were dispatched, and how the notifiers fared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub events: u64,
    pub delivered: u64,
    pub failed: u64,
}

pub struct Notifications {
    data_dir: PathBuf,
    miners: Vec<Box<dyn EventMiner>>,
    notifiers: Vec<Box<dyn Notifier>>,
    from: u32,
}

impl Notifications {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            miners: vec![],
            notifiers: vec![],
            from: 0,
        }
    }

    pub fn from_env() -> Self {
        Self::new(data_dir_from_env().unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Replace the configured notifiers, keeping the watch lists.
    pub fn with_notifiers(mut self, notifiers: Vec<Box<dyn Notifier>>) -> Self {
        self.notifiers = notifiers;
        self
    }
}

#[async_trait]
impl<S: SteemSource> BlockMapReducer<S> for Notifications {
    type Accumulator = Tally;
    type Value = Event;

    async fn initialise(&mut self, source: &S) -> Result<Tally, ReduceError> {
        info!(data_dir = %self.data_dir.display(), "loading configuration");
        let config = Config::load(&self.data_dir).await?;

        if self.notifiers.is_empty() {
            for kind in config.enabled()? {
                info!(notifier = ?kind, "configuring notifier");
                let notifier: Box<dyn Notifier> = match kind {
                    NotifierKind::Command => match &config.command {
                        Some(c) => Box::new(CommandNotifier::new(c)?),
                        None => continue,
                    },
                    NotifierKind::Slack => match &config.slack {
                        Some(c) => Box::new(SlackNotifier::new(c)?),
                        None => continue,
                    },
                    NotifierKind::Email => match &config.email {
                        Some(c) => Box::new(EmailNotifier::new(c)?),
                        None => continue,
                    },
                };
                self.notifiers.push(notifier);
            }
        }
        self.miners = events::miners(&config.watch);

        let tip = source.current_tip().await?;
        self.from = tip.number;
        info!(from = self.from, notifiers = self.notifiers.len(), "ready to go");

        Ok(Tally::default())
    }

    fn block_range(&self) -> BlockRange {
        BlockRange::tail(self.from)
    }

    async fn map(&self, source: &S, emit: &Emitter<Event>, block: &Block) -> Result<(), ReduceError> {
        for op in block.operations() {
            let (author, permlink) = match op {
                Operation::Comment(c) => (&c.author, &c.permlink),
                Operation::Vote(v) => (&v.author, &v.permlink),
                Operation::Other { .. } => continue,
            };
            debug!(block = block.number, op = op.name(), %author, %permlink, "processing operation");

            let content = source.content(author, permlink).await?;
            match self.miners.iter().find_map(|m| m.mine(op, &content)) {
                Some(event) => {
                    info!(block = block.number, kind = %event.kind(), %author, %permlink, "emitting event");
                    emit.emit(event).await?;
                }
                None => debug!(block = block.number, "no action taken"),
            }
        }
        Ok(())
    }

    async fn reduce(&self, _: &S, tally: &mut Tally, event: Event) -> Result<(), ReduceError> {
        let results = join_all(self.notifiers.iter().map(|n| n.notify(&event))).await;

        tally.events += 1;
        for (notifier, result) in self.notifiers.iter().zip(results) {
            match result {
                Ok(()) => tally.delivered += 1,
                Err(e) => {
                    warn!(notifier = notifier.name(), kind = %event.kind(), error = %e, "notification failed");
                    tally.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn finalize(&self, tally: Tally, checkpoint: Checkpoint) -> Result<(), ReduceError> {
        info!(
            events = tally.events,
            delivered = tally.delivered,
            failed = tally.failed,
            next_block = checkpoint.next_block,
            "notifications stopped"
        );
        Ok(())
    }
}
