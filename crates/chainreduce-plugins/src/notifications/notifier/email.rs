//! Sends an HTML email per event over authenticated SMTP.

use async_trait::async_trait;
use handlebars::Handlebars;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use chainreduce_core::ReduceError;

use super::{Notifier, NotifyError};
use crate::notifications::config::EmailConfig;
use crate::notifications::events::{Event, EventKind};

/// Implicit TLS; every other port negotiates STARTTLS.
const SMTPS_PORT: u16 = 465;

// Subjects are plain text, so they use triple-stash to skip HTML escaping.
const TEMPLATES: [(EventKind, &str, &str); 4] = [
    (
        EventKind::Story,
        r#"[Steemit] @{{{content.author}}} published "{{{content.title}}}""#,
        r#"@{{content.author}} has published the following story:<br />
<br />
{{content.title}}<br />
<br />
You can view the story directly on <a href="https://steemit.com{{content.url}}">Steemit</a>."#,
    ),
    (
        EventKind::StoryVote,
        "[Steemit] @{{{op.voter}}} voted for @{{{content.author}}}/{{{content.permlink}}}",
        r#"@{{op.voter}} has cast a vote on @{{content.author}}/{{content.permlink}}.<br />
<br />
Weight: {{op.weight}}<br />
Pending payout: {{content.pending_payout_value}}<br />
<br />
You can view the story directly on <a href="https://steemit.com{{content.url}}">Steemit</a>."#,
    ),
    (
        EventKind::Comment,
        "[Steemit] @{{{content.author}}} commented on @{{{content.parent_author}}}/{{{content.parent_permlink}}}",
        r#"@{{content.author}} commented on @{{content.parent_author}}/{{content.parent_permlink}}.<br />
You can view the comment directly on <a href="https://steemit.com{{content.url}}">Steemit</a>."#,
    ),
    (
        EventKind::CommentVote,
        "[Steemit] @{{{op.voter}}} voted for @{{{content.author}}}/{{{content.permlink}}}",
        r#"@{{op.voter}} has cast a vote on @{{content.author}}/{{content.permlink}}.<br />
<br />
Weight: {{op.weight}}<br />
Pending payout: {{content.pending_payout_value}}<br />
<br />
You can view the comment directly on <a href="https://steemit.com{{content.url}}">Steemit</a>."#,
    ),
];

/// Subject and HTML body for every event kind.
pub struct EmailTemplates {
    registry: Handlebars<'static>,
}

impl EmailTemplates {
    pub fn new() -> Result<Self, ReduceError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        for (kind, subject, body) in TEMPLATES {
            for (part, source) in [("subject", subject), ("body", body)] {
                registry
                    .register_template_string(&key(kind, part), source)
                    .map_err(|e| ReduceError::Config(format!("email {part} template for {kind}: {e}")))?;
            }
        }
        Ok(Self { registry })
    }

    /// `(subject, body)` for `event`.
    pub fn render(&self, event: &Event) -> Result<(String, String), NotifyError> {
        let kind = event.kind();
        let render = |part: &str| {
            self.registry
                .render(&key(kind, part), event)
                .map_err(|e| NotifyError::Template(e.to_string()))
        };
        Ok((render("subject")?, render("body")?))
    }
}

fn key(kind: EventKind, part: &str) -> String {
    format!("{kind:?}/{part}")
}

pub struct EmailNotifier {
    templates: EmailTemplates,
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    /// Build the SMTP transport; no connection is made until the first send.
    pub fn new(config: &EmailConfig) -> Result<Self, ReduceError> {
        let (from, to) = config.mailboxes()?;

        let host = config.smtp_server_host.as_str();
        let builder = if config.smtp_server_port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| ReduceError::Config(format!("email.smtp_server_host: {e}")))?;

        let transport = builder
            .port(config.smtp_server_port)
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
            .build();

        Ok(Self {
            templates: EmailTemplates::new()?,
            from,
            to,
            transport,
        })
    }

    fn message(&self, event: &Event) -> Result<Message, NotifyError> {
        let (subject, body) = self.templates.render(event)?;

        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| NotifyError::Email(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, event: &Event) -> Result<(), NotifyError> {
        let message = self.message(event)?;
        debug!(kind = %event.kind(), recipients = self.to.len(), "sending email");
        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Email(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainreduce_steem::{CommentOperation, Content, VoteOperation};

    fn story_content() -> Content {
        Content {
            author: "alice".into(),
            permlink: "hello".into(),
            title: "Fish & <Chips>".into(),
            url: "/food/@alice/hello".into(),
            pending_payout_value: "2.500 SBD".into(),
            ..Default::default()
        }
    }

    fn vote(content: Content) -> (VoteOperation, Content) {
        (
            VoteOperation {
                voter: "bob".into(),
                author: "alice".into(),
                permlink: "hello".into(),
                weight: 7500,
            },
            content,
        )
    }

    #[test]
    fn story_subject_is_plain_and_body_is_escaped() {
        let event = Event::Story {
            op: CommentOperation {
                author: "alice".into(),
                permlink: "hello".into(),
                ..Default::default()
            },
            content: story_content(),
        };
        let (subject, body) = EmailTemplates::new().unwrap().render(&event).unwrap();

        assert_eq!(subject, r#"[Steemit] @alice published "Fish & <Chips>""#);
        assert!(body.starts_with("@alice has published the following story:<br />"));
        assert!(body.contains("Fish &amp; &lt;Chips&gt;<br />"));
        assert!(body.ends_with(r#"<a href="https://steemit.com/food/@alice/hello">Steemit</a>."#));
    }

    #[test]
    fn story_vote_lists_weight_and_payout() {
        let (op, content) = vote(story_content());
        let (subject, body) = EmailTemplates::new()
            .unwrap()
            .render(&Event::StoryVote { op, content })
            .unwrap();

        assert_eq!(subject, "[Steemit] @bob voted for @alice/hello");
        assert!(body.contains("Weight: 7500<br />"));
        assert!(body.contains("Pending payout: 2.500 SBD<br />"));
        assert!(body.contains("view the story directly"));
    }

    #[test]
    fn comment_vote_links_the_comment() {
        let (op, content) = vote(story_content());
        let (_, body) = EmailTemplates::new()
            .unwrap()
            .render(&Event::CommentVote { op, content })
            .unwrap();
        assert!(body.contains("view the comment directly"));
    }

    #[test]
    fn comment_names_the_parent() {
        let event = Event::Comment {
            op: CommentOperation::default(),
            content: Content {
                author: "bob".into(),
                parent_author: "alice".into(),
                parent_permlink: "hello".into(),
                url: "/food/@alice/hello#@bob/re-hello".into(),
                ..Default::default()
            },
        };
        let (subject, body) = EmailTemplates::new().unwrap().render(&event).unwrap();
        assert_eq!(subject, "[Steemit] @bob commented on @alice/hello");
        assert!(body.starts_with("@bob commented on @alice/hello.<br />\nYou can view the comment"));
    }

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_server_host: "smtp.example.com".into(),
            smtp_server_port: 587,
            smtp_username: "mailer".into(),
            smtp_password: "secret".into(),
            from: "ChainReduce <mailer@example.com>".into(),
            to: vec!["alice@example.com".into(), "bob@example.com".into()],
        }
    }

    #[tokio::test]
    async fn message_goes_to_every_recipient() {
        let notifier = EmailNotifier::new(&config()).unwrap();
        let (op, content) = vote(story_content());
        let message = notifier.message(&Event::StoryVote { op, content }).unwrap();

        let to: Vec<String> = message.envelope().to().iter().map(|a| a.to_string()).collect();
        assert_eq!(to, vec!["alice@example.com", "bob@example.com"]);
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("Subject: [Steemit] @bob voted for @alice/hello"));
    }
}
