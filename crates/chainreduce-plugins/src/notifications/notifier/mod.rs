//! Where events go.

mod command;
mod email;
mod slack;

pub use command::CommandNotifier;
pub use email::{EmailNotifier, EmailTemplates};
pub use slack::{Attachment, Field, Payload, SlackNotifier};

use async_trait::async_trait;
use thiserror::Error;

use super::events::Event;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("template error: {0}")]
    Template(String),

    #[error("command {command:?} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("email error: {0}")]
    Email(String),
}

/// Delivers an event somewhere. Failures are reported, never retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, event: &Event) -> Result<(), NotifyError>;
}
