//! An in-memory Steem node for plugin tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use chainreduce_core::{BlockSource, ChainTip, ReduceError};
use chainreduce_steem::{Block, Content, ContentApi};

#[derive(Default)]
pub struct FakeSteem {
    tip: AtomicU32,
    blocks: Mutex<HashMap<u32, Block>>,
    contents: Mutex<HashMap<(String, String), Content>>,
    content_calls: AtomicUsize,
}

impl FakeSteem {
    pub fn new(tip: u32) -> Self {
        Self {
            tip: AtomicU32::new(tip),
            ..Default::default()
        }
    }

    /// Put a block holding one transaction with `ops` (condenser `[name, body]` form).
    pub fn add_block(&self, number: u32, ops: Vec<Value>) {
        let mut block: Block = serde_json::from_value(json!({
            "previous": "0000",
            "timestamp": "2016-09-01T12:00:00",
            "witness": "initminer",
            "transactions": [{"operations": ops}],
        }))
        .expect("valid block");
        block.number = number;
        self.blocks.lock().unwrap().insert(number, block);
    }

    pub fn add_content(&self, content: Content) {
        self.contents
            .lock()
            .unwrap()
            .insert((content.author.clone(), content.permlink.clone()), content);
    }

    pub fn set_tip(&self, tip: u32) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    pub fn content_calls(&self) -> usize {
        self.content_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockSource for FakeSteem {
    type Block = Block;

    async fn fetch_block(&self, number: u32) -> Result<Block, ReduceError> {
        if number > self.tip.load(Ordering::SeqCst) {
            return Err(ReduceError::Source(format!("block {number} not found")));
        }
        if let Some(block) = self.blocks.lock().unwrap().get(&number) {
            return Ok(block.clone());
        }
        let mut empty: Block = serde_json::from_value(json!({"timestamp": "2016-09-01T12:00:00"}))
            .expect("valid block");
        empty.number = number;
        Ok(empty)
    }

    async fn current_tip(&self) -> Result<ChainTip, ReduceError> {
        Ok(ChainTip {
            number: self.tip.load(Ordering::SeqCst),
            poll_interval: Duration::from_millis(5),
        })
    }
}

#[async_trait]
impl ContentApi for FakeSteem {
    async fn content(&self, author: &str, permlink: &str) -> Result<Content, ReduceError> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        self.contents
            .lock()
            .unwrap()
            .get(&(author.to_string(), permlink.to_string()))
            .cloned()
            .ok_or_else(|| ReduceError::Source(format!("no content @{author}/{permlink}")))
    }
}

// ─── Builders ─────────────────────────────────────────────────────────────────

pub fn story(author: &str, permlink: &str, title: &str) -> Value {
    json!(["comment", {
        "parent_author": "",
        "parent_permlink": "steem",
        "author": author,
        "permlink": permlink,
        "title": title,
        "body": "body",
        "json_metadata": "{}"
    }])
}

pub fn reply(author: &str, permlink: &str, parent_author: &str, parent_permlink: &str) -> Value {
    json!(["comment", {
        "parent_author": parent_author,
        "parent_permlink": parent_permlink,
        "author": author,
        "permlink": permlink,
        "title": "",
        "body": "nice post",
        "json_metadata": ""
    }])
}

pub fn vote(voter: &str, author: &str, permlink: &str) -> Value {
    json!(["vote", {"voter": voter, "author": author, "permlink": permlink, "weight": 10000}])
}

pub fn transfer(from: &str, to: &str) -> Value {
    json!(["transfer", {"from": from, "to": to, "amount": "1.000 STEEM", "memo": ""}])
}

pub fn content(author: &str, permlink: &str, parent_author: &str, payout: &str) -> Content {
    Content {
        author: author.into(),
        permlink: permlink.into(),
        parent_author: parent_author.into(),
        title: format!("{permlink} (live)"),
        pending_payout_value: payout.into(),
        url: format!("/steem/@{author}/{permlink}"),
        ..Default::default()
    }
}
