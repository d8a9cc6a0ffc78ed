//! Posts events to a Slack incoming webhook as message attachments.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use chainreduce_core::ReduceError;

use super::{Notifier, NotifyError};
use crate::notifications::config::SlackConfig;
use crate::notifications::events::Event;

const FRONTEND: &str = "https://steemit.com";
const COMMENT_EXTRACT_LINES: usize = 5;

// ─── Webhook payload ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Payload {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Attachment {
    pub fallback: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub color: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pretext: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title_link: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thumb_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub short: bool,
}

impl Field {
    fn new(title: &str, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short: false,
        }
    }

    fn short(title: &str, value: impl Into<String>) -> Self {
        Self {
            short: true,
            ..Self::new(title, value)
        }
    }
}

// ─── Notifier ─────────────────────────────────────────────────────────────────

pub struct SlackNotifier {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(config: &SlackConfig) -> Result<Self, ReduceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ReduceError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            webhook_url: config.webhook_url.clone(),
            http,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn notify(&self, event: &Event) -> Result<(), NotifyError> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&render(event))
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Http(format!("HTTP {status}: {body}")));
        }
        Ok(())
    }
}

// ─── Rendering ────────────────────────────────────────────────────────────────

/// The webhook message for `event`.
pub fn render(event: &Event) -> Payload {
    let attachment = match event {
        Event::Story { content: c, .. } => {
            let summary = c.body.lines().next().unwrap_or_default();
            Attachment {
                fallback: format!("@{} has published \"{}\".", c.author, c.title),
                color: "#00C957".into(),
                pretext: format!("@{} has published or updated a story.", c.author),
                title: c.title.clone(),
                title_link: format!("{FRONTEND}{}", c.url),
                fields: vec![
                    Field::new("Summary", summary),
                    Field::new("Tags", c.metadata().tags.join(", ")),
                ],
                thumb_url: format!("{FRONTEND}/images/favicons/favicon-96x96.png"),
            }
        }
        Event::StoryVote { op, content: c } => {
            let text = format!("@{} cast a vote on a story by @{}.", op.voter, op.author);
            Attachment {
                fallback: text.clone(),
                color: "#BDFCC9".into(),
                pretext: text,
                title: c.title.clone(),
                title_link: format!("{FRONTEND}{}", c.url),
                fields: vec![
                    Field::short("Vote Weight", op.weight.to_string()),
                    Field::short("Story Pending Payout", c.pending_payout_value.clone()),
                ],
                ..Default::default()
            }
        }
        Event::Comment { content: c, .. } => {
            let lines: Vec<&str> = c.body.lines().collect();
            let mut extract = lines
                .iter()
                .take(COMMENT_EXTRACT_LINES)
                .copied()
                .collect::<Vec<_>>()
                .join("\n");
            if lines.len() > COMMENT_EXTRACT_LINES {
                extract.push_str(&format!("\n<{FRONTEND}{}|Read more...>", c.url));
            }

            Attachment {
                fallback: format!(
                    "@{} commented on @{}/{}",
                    c.author, c.parent_author, c.parent_permlink
                ),
                color: "#FF9912".into(),
                pretext: format!(
                    "@{} <{FRONTEND}{}|commented> on @{}/{}",
                    c.author, c.url, c.parent_author, c.parent_permlink
                ),
                fields: vec![Field::new("Comment Body", extract)],
                ..Default::default()
            }
        }
        Event::CommentVote { op, content: c } => {
            let text = format!("@{} cast a vote on comment @{}/{}", op.voter, op.author, op.permlink);
            Attachment {
                fallback: text.clone(),
                color: "#FFEBCD".into(),
                pretext: text,
                title: format!("@{}/{}", c.author, c.permlink),
                title_link: format!("{FRONTEND}{}", c.url),
                fields: vec![
                    Field::short("Vote Weight", op.weight.to_string()),
                    Field::short("Comment Pending Payout", c.pending_payout_value.clone()),
                ],
                ..Default::default()
            }
        }
    };

    Payload {
        attachments: vec![attachment],
        ..Default::default()
    }
}
