//! chainreduce-plugins: the MapReduce implementations shipped with ChainReduce.
//!
//! | Id | What it does |
//! |---|---|
//! | [`account_pending_payout`] | tracks an author's stories and their pending payouts |
//! | [`notifications`] | tails the chain and notifies about watched stories, comments and votes |
//!
//! Both read their settings from the directory named by
//! [`DATA_DIR_ENV`].

pub mod account_pending_payout;
pub mod notifications;

use std::path::PathBuf;

use chainreduce_core::{BlockSource, PluginRegistry, ReduceError};
use chainreduce_steem::{Block, ContentApi};

pub use account_pending_payout::AccountPendingPayout;
pub use notifications::Notifications;

/// Environment variable holding a plugin's data directory.
pub const DATA_DIR_ENV: &str = "CHAINREDUCE_PARAMS_DATA_DIR";

/// What the built-in plugins need from a block source: Steem blocks plus
/// content lookups.
pub trait SteemSource: BlockSource<Block = Block> + ContentApi {}

impl<S: BlockSource<Block = Block> + ContentApi> SteemSource for S {}

/// A registry with every built-in plugin, in a fixed order.
pub fn builtin_registry<S: SteemSource>() -> Result<PluginRegistry<S>, ReduceError> {
    let mut registry = PluginRegistry::new();
    registry.register(account_pending_payout::ID, || {
        AccountPendingPayout::from_env()
    })?;
    registry.register(notifications::ID, || Ok(Notifications::from_env()))?;
    Ok(registry)
}

/// The data directory from [`DATA_DIR_ENV`], if set and non-empty.
pub(crate) fn data_dir_from_env() -> Option<PathBuf> {
    std::env::var_os(DATA_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
