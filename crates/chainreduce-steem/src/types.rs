//! Steem wire types, as returned by `condenser_api`.

use chrono::NaiveDateTime;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

// ─── Blocks ───────────────────────────────────────────────────────────────────

/// A signed block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Not part of the RPC payload; set by the client from the requested number.
    #[serde(skip)]
    pub number: u32,
    #[serde(default)]
    pub previous: String,
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub witness: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl chainreduce_core::Block for Block {
    fn number(&self) -> u32 {
        self.number
    }
}

impl Block {
    /// Every operation in the block, in transaction order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.transactions.iter().flat_map(|tx| tx.operations.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub ref_block_num: u16,
    #[serde(default)]
    pub ref_block_prefix: u32,
    #[serde(default)]
    pub expiration: Option<NaiveDateTime>,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

// ─── Operations ───────────────────────────────────────────────────────────────

/// A decoded operation.
///
/// Condenser encodes operations as `[name, body]`. Only the operations
/// plugins care about are decoded; the rest keep their name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawOperation")]
pub enum Operation {
    Comment(CommentOperation),
    Vote(VoteOperation),
    Other { name: String, body: Value },
}

impl Operation {
    /// The operation name, e.g. `"comment"`.
    pub fn name(&self) -> &str {
        match self {
            Self::Comment(_) => "comment",
            Self::Vote(_) => "vote",
            Self::Other { name, .. } => name,
        }
    }
}

#[derive(Deserialize)]
struct RawOperation(String, Value);

impl TryFrom<RawOperation> for Operation {
    type Error = serde_json::Error;

    fn try_from(RawOperation(name, body): RawOperation) -> Result<Self, Self::Error> {
        Ok(match name.as_str() {
            "comment" => Self::Comment(serde_json::from_value(body)?),
            "vote" => Self::Vote(serde_json::from_value(body)?),
            _ => Self::Other { name, body },
        })
    }
}

/// Back to the condenser `[name, body]` pair.
impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut pair = serializer.serialize_tuple(2)?;
        pair.serialize_element(self.name())?;
        match self {
            Self::Comment(c) => pair.serialize_element(c)?,
            Self::Vote(v) => pair.serialize_element(v)?,
            Self::Other { body, .. } => pair.serialize_element(body)?,
        }
        pair.end()
    }
}

/// Creates or edits a post. A post without a parent author is a story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentOperation {
    #[serde(default)]
    pub parent_author: String,
    #[serde(default)]
    pub parent_permlink: String,
    pub author: String,
    pub permlink: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub json_metadata: String,
}

impl CommentOperation {
    /// Returns `true` for top-level posts, `false` for replies.
    pub fn is_story(&self) -> bool {
        self.parent_author.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteOperation {
    pub voter: String,
    pub author: String,
    pub permlink: String,
    pub weight: i16,
}

// ─── Content ──────────────────────────────────────────────────────────────────

/// A post or comment as returned by `get_content`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    pub id: u64,
    pub author: String,
    pub permlink: String,
    pub category: String,
    pub parent_author: String,
    pub parent_permlink: String,
    pub title: String,
    pub body: String,
    /// Raw JSON string; see [`Content::metadata`].
    pub json_metadata: String,
    pub depth: u32,
    pub children: u32,
    pub net_votes: i32,
    pub pending_payout_value: String,
    pub total_payout_value: String,
    /// Path relative to the frontend, e.g. `/steem/@author/permlink`.
    pub url: String,
}

impl Content {
    pub fn is_story(&self) -> bool {
        self.parent_author.is_empty()
    }

    /// Parsed `json_metadata`; malformed or missing metadata is empty.
    pub fn metadata(&self) -> ContentMetadata {
        serde_json::from_str(&self.json_metadata).unwrap_or_default()
    }

    /// Pending payout as a number, e.g. `"1.234 SBD"` → `1.234`.
    pub fn pending_payout(&self) -> Option<f64> {
        parse_asset_amount(&self.pending_payout_value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentMetadata {
    pub tags: Vec<String>,
    pub app: Option<String>,
}

/// Parse the amount out of an asset string such as `"12.345 SBD"`.
pub fn parse_asset_amount(asset: &str) -> Option<f64> {
    asset.split_whitespace().next()?.parse().ok()
}

// ─── Chain state ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicGlobalProperties {
    pub head_block_number: u32,
    pub head_block_id: String,
    pub last_irreversible_block_num: u32,
    pub current_witness: String,
}

/// The subset of `get_config` the client uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Seconds between blocks.
    #[serde(
        rename = "STEEM_BLOCK_INTERVAL",
        alias = "STEEMIT_BLOCK_INTERVAL",
        default = "default_block_interval"
    )]
    pub block_interval: u64,
    #[serde(rename = "STEEM_CHAIN_ID", alias = "STEEMIT_CHAIN_ID", default)]
    pub chain_id: Option<String>,
}

fn default_block_interval() -> u64 {
    3
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            block_interval: default_block_interval(),
            chain_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block_json() -> Value {
        json!({
            "previous": "000003e7c4b0e3b1b2dbf0a7b3a3d3e2b7e0a5a1",
            "timestamp": "2016-03-24T16:55:30",
            "witness": "initminer",
            "transaction_merkle_root": "0000000000000000000000000000000000000000",
            "extensions": [],
            "transactions": [{
                "ref_block_num": 998,
                "ref_block_prefix": 1234,
                "expiration": "2016-03-24T16:56:00",
                "operations": [
                    ["comment", {
                        "parent_author": "",
                        "parent_permlink": "steem",
                        "author": "alice",
                        "permlink": "hello-world",
                        "title": "Hello World",
                        "body": "First post",
                        "json_metadata": "{\"tags\":[\"steem\"]}"
                    }],
                    ["vote", {"voter": "bob", "author": "alice", "permlink": "hello-world", "weight": 10000}],
                    ["transfer", {"from": "bob", "to": "alice", "amount": "1.000 STEEM", "memo": ""}]
                ],
                "extensions": [],
                "signatures": []
            }]
        })
    }

    #[test]
    fn decodes_block_operations() {
        let block: Block = serde_json::from_value(block_json()).unwrap();
        let ops: Vec<_> = block.operations().collect();
        assert_eq!(ops.len(), 3);

        match ops[0] {
            Operation::Comment(c) => {
                assert_eq!(c.author, "alice");
                assert!(c.is_story());
            }
            other => panic!("expected comment, got {other:?}"),
        }
        match ops[1] {
            Operation::Vote(v) => assert_eq!((v.voter.as_str(), v.weight), ("bob", 10000)),
            other => panic!("expected vote, got {other:?}"),
        }
        assert_eq!(ops[2].name(), "transfer");
    }

    #[test]
    fn operations_serialize_as_condenser_pairs() {
        let block: Block = serde_json::from_value(block_json()).unwrap();
        let ops = serde_json::to_value(&block.transactions[0].operations).unwrap();
        assert_eq!(ops, block_json()["transactions"][0]["operations"]);
    }

    #[test]
    fn malformed_known_operation_is_an_error() {
        let raw = json!(["vote", {"voter": "bob"}]);
        assert!(serde_json::from_value::<Operation>(raw).is_err());
    }

    #[test]
    fn reply_is_not_a_story() {
        let op: Operation = serde_json::from_value(json!(["comment", {
            "parent_author": "alice", "parent_permlink": "hello-world",
            "author": "bob", "permlink": "re-hello", "title": "", "body": "nice",
            "json_metadata": ""
        }]))
        .unwrap();
        let Operation::Comment(c) = op else { panic!("expected comment") };
        assert!(!c.is_story());
    }

    #[test]
    fn content_helpers() {
        let content: Content = serde_json::from_value(json!({
            "author": "alice",
            "permlink": "hello-world",
            "parent_author": "",
            "json_metadata": "{\"tags\":[\"steem\",\"intro\"],\"app\":\"steemit/0.1\"}",
            "pending_payout_value": "12.345 SBD",
            "url": "/steem/@alice/hello-world",
            "active_votes": []
        }))
        .unwrap();

        assert!(content.is_story());
        assert_eq!(content.metadata().tags, vec!["steem", "intro"]);
        assert_eq!(content.pending_payout(), Some(12.345));
    }

    #[test]
    fn bad_metadata_is_empty() {
        let content = Content {
            json_metadata: "not json".into(),
            ..Default::default()
        };
        assert!(content.metadata().tags.is_empty());
        assert_eq!(parse_asset_amount(""), None);
        assert_eq!(parse_asset_amount("0.000 SBD"), Some(0.0));
    }

    #[test]
    fn chain_config_aliases() {
        let legacy: ChainConfig =
            serde_json::from_value(json!({"STEEMIT_BLOCK_INTERVAL": 3, "IS_TEST_NET": false})).unwrap();
        assert_eq!(legacy.block_interval, 3);

        let current: ChainConfig = serde_json::from_value(json!({"STEEM_BLOCK_INTERVAL": 5})).unwrap();
        assert_eq!(current.block_interval, 5);
    }
}
