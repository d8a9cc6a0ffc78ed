//! `config.yml` for the notifications plugin.

use std::path::Path;

use lettre::message::Mailbox;
use serde::Deserialize;

use chainreduce_core::ReduceError;

pub const CONFIG_FILENAME: &str = "config.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub enabled_notifications: Vec<String>,
    pub command: Option<CommandConfig>,
    pub slack: Option<SlackConfig>,
    pub email: Option<EmailConfig>,
}

// ─── Watch lists ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub stories: WatchStories,
    pub story_votes: WatchVotes,
    pub comments: WatchComments,
    pub comment_votes: WatchVotes,
}

/// Stories by any of `authors`, or tagged with any of `tags`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchStories {
    pub authors: Vec<String>,
    pub tags: Vec<String>,
}

/// Votes on content by any of `authors`, or cast by any of `voters`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchVotes {
    pub authors: Vec<String>,
    pub voters: Vec<String>,
}

/// Comments by any of `authors`, or replying to any of `parent_authors`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchComments {
    pub authors: Vec<String>,
    pub parent_authors: Vec<String>,
}

// ─── Notifiers ────────────────────────────────────────────────────────────────

/// One command per event kind; kinds without a command are not dispatched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub stories: Option<Command>,
    pub story_votes: Option<Command>,
    pub comments: Option<Command>,
    pub comment_votes: Option<Command>,
}

/// A program and its arguments, each a Handlebars template rendered
/// against the event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Command {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub webhook_url: String,
}

/// SMTP account and recipients; `from` and `to` are RFC 5322 mailboxes,
/// e.g. `Steem Bot <bot@example.com>`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_server_host: String,
    pub smtp_server_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from: String,
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierKind {
    Command,
    Slack,
    Email,
}

impl Config {
    /// Load and validate `config.yml` from `dir`.
    pub async fn load(dir: &Path) -> Result<Self, ReduceError> {
        let path = dir.join(CONFIG_FILENAME);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ReduceError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&raw).map_err(|e| match e {
            ReduceError::Config(msg) => ReduceError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn parse(yaml: &str) -> Result<Self, ReduceError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ReduceError::Config(e.to_string()))?;
        config.enabled()?;
        Ok(config)
    }

    /// The enabled notifiers, in the configured order, each checked against
    /// its section.
    pub fn enabled(&self) -> Result<Vec<NotifierKind>, ReduceError> {
        let mut kinds = Vec::with_capacity(self.enabled_notifications.len());
        for name in &self.enabled_notifications {
            let kind = match name.as_str() {
                "command" => {
                    self.command
                        .as_ref()
                        .ok_or_else(|| config_err("key not set: command"))?
                        .validate()?;
                    NotifierKind::Command
                }
                "slack" => {
                    self.slack
                        .as_ref()
                        .ok_or_else(|| config_err("key not set: slack"))?
                        .validate()?;
                    NotifierKind::Slack
                }
                "email" => {
                    self.email
                        .as_ref()
                        .ok_or_else(|| config_err("key not set: email"))?
                        .validate()?;
                    NotifierKind::Email
                }
                other => {
                    return Err(config_err(format!(
                        "enabled_notifications: unknown notifier: {other}"
                    )))
                }
            };
            kinds.push(kind);
        }

        if kinds.is_empty() {
            return Err(config_err("enabled_notifications: no known notifier specified"));
        }
        Ok(kinds)
    }
}

impl CommandConfig {
    /// `(path, command)` for every configured event kind.
    pub fn commands(&self) -> impl Iterator<Item = (&'static str, &Command)> {
        [
            ("command.stories", &self.stories),
            ("command.story_votes", &self.story_votes),
            ("command.comments", &self.comments),
            ("command.comment_votes", &self.comment_votes),
        ]
        .into_iter()
        .filter_map(|(path, cmd)| cmd.as_ref().map(|c| (path, c)))
    }

    fn validate(&self) -> Result<(), ReduceError> {
        let mut any = false;
        for (path, cmd) in self.commands() {
            if cmd.name.is_empty() {
                return Err(config_err(format!("key not set: {path}.name")));
            }
            any = true;
        }
        if !any {
            return Err(config_err("command notifier enabled, but no command configured"));
        }
        Ok(())
    }
}

impl SlackConfig {
    fn validate(&self) -> Result<(), ReduceError> {
        if self.webhook_url.is_empty() {
            return Err(config_err("key not set: slack.webhook_url"));
        }
        match reqwest::Url::parse(&self.webhook_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            _ => Err(config_err("not a valid URL: slack.webhook_url")),
        }
    }
}

impl EmailConfig {
    fn validate(&self) -> Result<(), ReduceError> {
        let required = [
            (self.smtp_server_host.is_empty(), "smtp_server_host"),
            (self.smtp_server_port == 0, "smtp_server_port"),
            (self.smtp_username.is_empty(), "smtp_username"),
            (self.smtp_password.is_empty(), "smtp_password"),
            (self.from.is_empty(), "from"),
        ];
        if let Some((_, key)) = required.iter().find(|(missing, _)| *missing) {
            return Err(config_err(format!("key not set: email.{key}")));
        }
        if self.to.is_empty() {
            return Err(config_err("array empty: email.to"));
        }
        self.mailboxes().map(|_| ())
    }

    /// Parsed sender and recipients.
    pub fn mailboxes(&self) -> Result<(Mailbox, Vec<Mailbox>), ReduceError> {
        let parse = |key: &str, addr: &str| {
            addr.parse::<Mailbox>()
                .map_err(|e| config_err(format!("not a valid address: {key}: {addr:?}: {e}")))
        };
        let from = parse("email.from", &self.from)?;
        let to = self
            .to
            .iter()
            .map(|addr| parse("email.to", addr))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((from, to))
    }
}

fn config_err(msg: impl Into<String>) -> ReduceError {
    ReduceError::Config(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
watch:
  stories:
    authors: [alice]
    tags: [rust]
  story_votes:
    voters: [bob]
  comments:
    parent_authors: [alice]
  comment_votes:
    authors: [alice]
enabled_notifications: [slack, command, email]
command:
  stories:
    name: notify-send
    args: ["New story", "{{content.title}}"]
slack:
  webhook_url: https://hooks.slack.com/services/T000/B000/XXXX
email:
  smtp_server_host: smtp.example.com
  smtp_server_port: 587
  smtp_username: mailer
  smtp_password: secret
  from: Steem Bot <mailer@example.com>
  to: [alice@example.com]
"#;

    fn err(yaml: &str) -> String {
        Config::parse(yaml).unwrap_err().to_string()
    }

    #[test]
    fn full_config_parses() {
        let config = Config::parse(FULL).unwrap();
        assert_eq!(
            config.enabled().unwrap(),
            vec![NotifierKind::Slack, NotifierKind::Command, NotifierKind::Email]
        );
        assert_eq!(config.email.unwrap().smtp_server_port, 587);
        assert_eq!(config.watch.stories.tags, vec!["rust"]);
        assert!(config.watch.story_votes.authors.is_empty());
        assert_eq!(config.command.unwrap().commands().count(), 1);
    }

    #[test]
    fn nothing_enabled() {
        assert!(err("watch: {}").contains("no known notifier specified"));
    }

    #[test]
    fn unknown_notifier() {
        assert!(err("enabled_notifications: [pager]").contains("unknown notifier: pager"));
    }

    #[test]
    fn enabled_notifier_needs_section() {
        assert!(err("enabled_notifications: [slack]").contains("key not set: slack"));
        assert!(err("enabled_notifications: [command]").contains("key not set: command"));
        assert!(err("enabled_notifications: [email]").contains("key not set: email"));
    }

    #[test]
    fn command_needs_a_name() {
        let yaml = "enabled_notifications: [command]\ncommand:\n  comments:\n    args: [x]\n";
        assert!(err(yaml).contains("key not set: command.comments.name"));
    }

    #[test]
    fn command_needs_at_least_one_entry() {
        let yaml = "enabled_notifications: [command]\ncommand: {}\n";
        assert!(err(yaml).contains("no command configured"));
    }

    #[test]
    fn slack_url_is_checked() {
        let yaml = "enabled_notifications: [slack]\nslack:\n  webhook_url: not a url\n";
        assert!(err(yaml).contains("not a valid URL"));
    }

    fn email_err(section: &str) -> String {
        err(&format!("enabled_notifications: [email]\nemail:\n{section}"))
    }

    #[test]
    fn email_keys_are_checked_in_order() {
        let full = [
            "  smtp_server_host: smtp.example.com\n",
            "  smtp_server_port: 465\n",
            "  smtp_username: mailer\n",
            "  smtp_password: secret\n",
            "  from: mailer@example.com\n",
        ];
        let keys = ["smtp_server_host", "smtp_server_port", "smtp_username", "smtp_password", "from"];
        for (i, key) in keys.iter().enumerate() {
            let section: String = full[..i].concat();
            let section = if section.is_empty() { "  to: []\n".to_string() } else { section };
            assert!(email_err(&section).contains(&format!("key not set: email.{key}")), "{key}");
        }
        assert!(email_err(&full.concat()).contains("array empty: email.to"));
    }

    #[test]
    fn email_addresses_are_checked() {
        let section = "  smtp_server_host: smtp.example.com\n  smtp_server_port: 587\n  smtp_username: u\n  smtp_password: p\n  from: mailer@example.com\n";
        assert!(email_err(&format!("{section}  to: [not an address]\n")).contains("not a valid address: email.to"));

        let yaml = format!("enabled_notifications: [email]\nemail:\n{section}  to: [Alice <alice@example.com>]\n");
        let config = Config::parse(&yaml).unwrap();
        let (from, to) = config.email.unwrap().mailboxes().unwrap();
        assert_eq!(from.email.to_string(), "mailer@example.com");
        assert_eq!(to[0].name.as_deref(), Some("Alice"));
    }

    #[test]
    fn errors_are_config_errors() {
        assert!(Config::parse("enabled_notifications: 5").unwrap_err().is_config());
    }
}
