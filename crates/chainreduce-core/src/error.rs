//! Error types for the chainreduce pipeline.

use thiserror::Error;

/// Errors that can occur while running a map/reduce pipeline.
#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("invalid block range: [{from}, {to}]")]
    InvalidRange { from: u32, to: u32 },

    #[error("unknown MapReduce implementation: \"{id}\" (available: {})", .available.join(", "))]
    UnknownPlugin { id: String, available: Vec<String> },

    #[error("MapReduce implementation already registered: {0}")]
    DuplicatePlugin(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("block source error: {0}")]
    Source(String),

    #[error("{stage} failed: {reason}")]
    Plugin { stage: &'static str, reason: String },

    /// The pipeline is shutting down; returned by `Emitter::emit` so that a
    /// plugin's map step can bail out early.
    #[error("pipeline is shutting down")]
    Dying,

    #[error("{task} task failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ReduceError {
    /// Shorthand for a plugin failure in the given stage.
    pub fn plugin(stage: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Plugin {
            stage,
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if this is the shutdown signal rather than a failure.
    pub fn is_dying(&self) -> bool {
        matches!(self, Self::Dying)
    }

    /// Returns `true` if the error was detected before the pipeline started.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange { .. }
                | Self::UnknownPlugin { .. }
                | Self::DuplicatePlugin(_)
                | Self::Config(_)
        )
    }
}
