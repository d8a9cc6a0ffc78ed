//! Events and the miners that find them in operations.

use std::collections::HashSet;

use serde::Serialize;

use chainreduce_steem::{CommentOperation, Content, Operation, VoteOperation};

use super::config::{WatchComments, WatchConfig, WatchStories, WatchVotes};

/// Something worth notifying about. Serialized form is what command
/// templates are rendered against, e.g. `{{op.voter}}` or `{{content.url}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Story { op: CommentOperation, content: Content },
    StoryVote { op: VoteOperation, content: Content },
    Comment { op: CommentOperation, content: Content },
    CommentVote { op: VoteOperation, content: Content },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Story,
    StoryVote,
    Comment,
    CommentVote,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Story { .. } => EventKind::Story,
            Self::StoryVote { .. } => EventKind::StoryVote,
            Self::Comment { .. } => EventKind::Comment,
            Self::CommentVote { .. } => EventKind::CommentVote,
        }
    }

    pub fn content(&self) -> &Content {
        match self {
            Self::Story { content, .. }
            | Self::StoryVote { content, .. }
            | Self::Comment { content, .. }
            | Self::CommentVote { content, .. } => content,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Story => "story",
            Self::StoryVote => "story vote",
            Self::Comment => "comment",
            Self::CommentVote => "comment vote",
        })
    }
}

/// Turns an operation plus the content it touches into an event, if the
/// watch list matches.
pub trait EventMiner: Send + Sync {
    fn mine(&self, op: &Operation, content: &Content) -> Option<Event>;
}

/// The miners in the order they are tried. The first match wins, so a
/// story is never also reported as a comment.
pub fn miners(watch: &WatchConfig) -> Vec<Box<dyn EventMiner>> {
    vec![
        Box::new(StoriesMiner::new(&watch.stories)),
        Box::new(StoryVotesMiner::new(&watch.story_votes)),
        Box::new(CommentsMiner::new(&watch.comments)),
        Box::new(CommentVotesMiner::new(&watch.comment_votes)),
    ]
}

fn set(values: &[String]) -> HashSet<String> {
    values.iter().cloned().collect()
}

// ─── Stories ──────────────────────────────────────────────────────────────────

pub struct StoriesMiner {
    authors: HashSet<String>,
    tags: HashSet<String>,
}

impl StoriesMiner {
    pub fn new(config: &WatchStories) -> Self {
        Self {
            authors: set(&config.authors),
            tags: set(&config.tags),
        }
    }
}

impl EventMiner for StoriesMiner {
    fn mine(&self, op: &Operation, content: &Content) -> Option<Event> {
        let Operation::Comment(op) = op else { return None };
        if !content.is_story() {
            return None;
        }

        let matched = self.authors.contains(&content.author)
            || content.metadata().tags.iter().any(|t| self.tags.contains(t));
        matched.then(|| Event::Story {
            op: op.clone(),
            content: content.clone(),
        })
    }
}

// ─── Votes ────────────────────────────────────────────────────────────────────

struct VoteFilter {
    authors: HashSet<String>,
    voters: HashSet<String>,
}

impl VoteFilter {
    fn new(config: &WatchVotes) -> Self {
        Self {
            authors: set(&config.authors),
            voters: set(&config.voters),
        }
    }

    fn matches(&self, vote: &VoteOperation) -> bool {
        self.authors.contains(&vote.author) || self.voters.contains(&vote.voter)
    }
}

pub struct StoryVotesMiner(VoteFilter);

impl StoryVotesMiner {
    pub fn new(config: &WatchVotes) -> Self {
        Self(VoteFilter::new(config))
    }
}

impl EventMiner for StoryVotesMiner {
    fn mine(&self, op: &Operation, content: &Content) -> Option<Event> {
        let Operation::Vote(op) = op else { return None };
        (content.is_story() && self.0.matches(op)).then(|| Event::StoryVote {
            op: op.clone(),
            content: content.clone(),
        })
    }
}

/// Votes on replies only; votes on stories belong to [`StoryVotesMiner`].
pub struct CommentVotesMiner(VoteFilter);

impl CommentVotesMiner {
    pub fn new(config: &WatchVotes) -> Self {
        Self(VoteFilter::new(config))
    }
}

impl EventMiner for CommentVotesMiner {
    fn mine(&self, op: &Operation, content: &Content) -> Option<Event> {
        let Operation::Vote(op) = op else { return None };
        (!content.is_story() && self.0.matches(op)).then(|| Event::CommentVote {
            op: op.clone(),
            content: content.clone(),
        })
    }
}

// ─── Comments ─────────────────────────────────────────────────────────────────

pub struct CommentsMiner {
    authors: HashSet<String>,
    parent_authors: HashSet<String>,
}

impl CommentsMiner {
    pub fn new(config: &WatchComments) -> Self {
        Self {
            authors: set(&config.authors),
            parent_authors: set(&config.parent_authors),
        }
    }
}

impl EventMiner for CommentsMiner {
    fn mine(&self, op: &Operation, content: &Content) -> Option<Event> {
        let Operation::Comment(op) = op else { return None };
        if content.is_story() {
            return None;
        }

        let matched = self.authors.contains(&content.author)
            || self.parent_authors.contains(&content.parent_author);
        matched.then(|| Event::Comment {
            op: op.clone(),
            content: content.clone(),
        })
    }
}
