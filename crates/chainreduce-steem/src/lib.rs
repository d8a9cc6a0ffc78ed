//! chainreduce-steem: a Steem node as a ChainReduce block source.
//!
//! - [`SteemClient`]: typed `condenser_api` calls; implements
//!   [`chainreduce_core::BlockSource`] and [`ContentApi`]
//! - [`RpcTransport`] / [`HttpTransport`]: JSON-RPC over HTTP with retry
//! - [`types`]: blocks, operations, content and chain state

pub mod client;
pub mod error;
pub mod request;
pub mod retry;
pub mod transport;
pub mod types;

pub use client::{ContentApi, SteemClient};
pub use error::RpcError;
pub use retry::{Backoff, RetryConfig};
pub use transport::{HttpConfig, HttpTransport, RpcTransport};
pub use types::{Block, CommentOperation, Content, Operation, VoteOperation};

/// Default node endpoint.
pub const DEFAULT_RPC_ENDPOINT: &str = "http://localhost:8090";
