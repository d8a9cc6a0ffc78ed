//! Runs a configured program per event, with Handlebars-rendered arguments.

use async_trait::async_trait;
use handlebars::Handlebars;
use std::collections::HashMap;
use tracing::debug;

use chainreduce_core::ReduceError;

use super::{Notifier, NotifyError};
use crate::notifications::config::{Command, CommandConfig};
use crate::notifications::events::{Event, EventKind};

pub struct CommandNotifier {
    templates: Handlebars<'static>,
    /// Number of templates (program + args) registered per kind.
    argc: HashMap<EventKind, usize>,
}

impl CommandNotifier {
    /// Compile every configured command; a template syntax error is a
    /// configuration error.
    pub fn new(config: &CommandConfig) -> Result<Self, ReduceError> {
        let mut templates = Handlebars::new();
        templates.set_strict_mode(true);
        templates.register_escape_fn(handlebars::no_escape);

        let mut argc = HashMap::new();
        let entries = [
            (EventKind::Story, &config.stories),
            (EventKind::StoryVote, &config.story_votes),
            (EventKind::Comment, &config.comments),
            (EventKind::CommentVote, &config.comment_votes),
        ];
        for (kind, cmd) in entries {
            let Some(Command { name, args }) = cmd else {
                continue;
            };
            let parts = std::iter::once(name).chain(args);
            let mut count = 0;
            for (i, part) in parts.enumerate() {
                templates
                    .register_template_string(&key(kind, i), part)
                    .map_err(|e| ReduceError::Config(format!("command template for {kind}: {e}")))?;
                count += 1;
            }
            argc.insert(kind, count);
        }

        Ok(Self { templates, argc })
    }

    /// Program and arguments for `event`, or `None` if no command is
    /// configured for its kind.
    pub fn render(&self, event: &Event) -> Result<Option<Vec<String>>, NotifyError> {
        let kind = event.kind();
        let Some(&count) = self.argc.get(&kind) else {
            return Ok(None);
        };

        (0..count)
            .map(|i| {
                self.templates
                    .render(&key(kind, i), event)
                    .map_err(|e| NotifyError::Template(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

fn key(kind: EventKind, i: usize) -> String {
    format!("{kind:?}/{i}")
}

#[async_trait]
impl Notifier for CommandNotifier {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn notify(&self, event: &Event) -> Result<(), NotifyError> {
        let Some(argv) = self.render(event)? else {
            debug!(kind = %event.kind(), "no command configured");
            return Ok(());
        };
        let Some((program, args)) = argv.split_first() else {
            return Ok(());
        };

        debug!(program = %program, ?args, "running command");
        let status = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| NotifyError::Command {
                command: program.clone(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(NotifyError::Command {
                command: program.clone(),
                reason: status.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainreduce_steem::{CommentOperation, Content, VoteOperation};

    fn cmd(name: &str, args: &[&str]) -> Option<Command> {
        Some(Command {
            name: name.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        })
    }

    fn story_event() -> Event {
        Event::Story {
            op: CommentOperation {
                parent_author: String::new(),
                parent_permlink: "steem".into(),
                author: "alice".into(),
                permlink: "hello".into(),
                title: "Hello <World>".into(),
                body: String::new(),
                json_metadata: String::new(),
            },
            content: Content {
                author: "alice".into(),
                permlink: "hello".into(),
                title: "Hello <World>".into(),
                url: "/steem/@alice/hello".into(),
                ..Default::default()
            },
        }
    }

    fn vote_event() -> Event {
        Event::StoryVote {
            op: VoteOperation {
                voter: "bob".into(),
                author: "alice".into(),
                permlink: "hello".into(),
                weight: 5000,
            },
            content: Content::default(),
        }
    }

    #[test]
    fn renders_name_and_args() {
        let notifier = CommandNotifier::new(&CommandConfig {
            stories: cmd("notify-send", &["@{{content.author}}", "{{content.title}}", "https://steemit.com{{content.url}}"]),
            ..Default::default()
        })
        .unwrap();

        let argv = notifier.render(&story_event()).unwrap().unwrap();
        assert_eq!(
            argv,
            vec!["notify-send", "@alice", "Hello <World>", "https://steemit.com/steem/@alice/hello"]
        );
    }

    #[test]
    fn unconfigured_kind_renders_nothing() {
        let notifier = CommandNotifier::new(&CommandConfig {
            stories: cmd("true", &[]),
            ..Default::default()
        })
        .unwrap();
        assert!(notifier.render(&vote_event()).unwrap().is_none());
    }

    #[test]
    fn bad_template_is_a_config_error() {
        let err = CommandNotifier::new(&CommandConfig {
            story_votes: cmd("echo", &["{{#if}}"]),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn missing_field_fails_to_render() {
        let notifier = CommandNotifier::new(&CommandConfig {
            story_votes: cmd("echo", &["{{op.nope}}"]),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(notifier.render(&vote_event()), Err(NotifyError::Template(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_the_command() {
        let notifier = CommandNotifier::new(&CommandConfig {
            stories: cmd("true", &[]),
            story_votes: cmd("sh", &["-c", "exit 3"]),
            ..Default::default()
        })
        .unwrap();

        notifier.notify(&story_event()).await.unwrap();
        let err = notifier.notify(&vote_event()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Command { ref command, .. } if command == "sh"));
    }
}
