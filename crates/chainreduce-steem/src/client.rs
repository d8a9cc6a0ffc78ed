//! `SteemClient`: typed `condenser_api` calls and the `BlockSource` impl.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use chainreduce_core::{BlockSource, ChainTip, ReduceError};

use crate::error::RpcError;
use crate::request::JsonRpcRequest;
use crate::transport::{HttpConfig, HttpTransport, RpcTransport};
use crate::types::{Block, ChainConfig, Content, DynamicGlobalProperties};

/// Looks up posts and comments. Plugins that need more than the block body
/// require their source to implement this as well as `BlockSource`.
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn content(&self, author: &str, permlink: &str) -> Result<Content, ReduceError>;
}

/// A Steem node client.
///
/// Reads the chain config once when connecting; the block interval from it
/// is the poll interval used when tailing the chain.
pub struct SteemClient<T: RpcTransport = HttpTransport> {
    transport: T,
    next_id: AtomicU64,
    config: ChainConfig,
}

impl SteemClient<HttpTransport> {
    /// Connect over HTTP with the default retry policy.
    pub async fn connect(url: impl Into<String>) -> Result<Self, RpcError> {
        Self::connect_with(url, HttpConfig::default()).await
    }

    pub async fn connect_with(url: impl Into<String>, config: HttpConfig) -> Result<Self, RpcError> {
        Self::with_transport(HttpTransport::new(url, config)?).await
    }
}

impl<T: RpcTransport> SteemClient<T> {
    /// Wrap an existing transport, fetching the chain config through it.
    pub async fn with_transport(transport: T) -> Result<Self, RpcError> {
        let mut client = Self {
            transport,
            next_id: AtomicU64::new(1),
            config: ChainConfig::default(),
        };
        client.config = client.get_config().await?;
        info!(
            url = client.transport.url(),
            block_interval = client.config.block_interval,
            "connected to Steem node"
        );
        Ok(client)
    }

    pub fn chain_config(&self) -> &ChainConfig {
        &self.config
    }

    /// How long to wait for the next block.
    pub fn block_interval(&self) -> Duration {
        Duration::from_secs(self.config.block_interval.max(1))
    }

    /// Call a `condenser_api` method and deserialize the result.
    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<R, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let method = format!("condenser_api.{method}");
        debug!(id, method = %method, "calling node");

        let resp = self.transport.send(JsonRpcRequest::new(id, method, params)).await?;
        let result = resp.into_result().map_err(RpcError::Rpc)?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn get_config(&self) -> Result<ChainConfig, RpcError> {
        self.call("get_config", vec![]).await
    }

    pub async fn get_dynamic_global_properties(&self) -> Result<DynamicGlobalProperties, RpcError> {
        self.call("get_dynamic_global_properties", vec![]).await
    }

    /// Fetch block `number`; `None` if the node does not have it (yet).
    pub async fn get_block(&self, number: u32) -> Result<Option<Block>, RpcError> {
        let block: Option<Block> = self.call("get_block", vec![json!(number)]).await?;
        Ok(block.map(|mut b| {
            b.number = number;
            b
        }))
    }

    pub async fn get_content(&self, author: &str, permlink: &str) -> Result<Content, RpcError> {
        self.call("get_content", vec![json!(author), json!(permlink)]).await
    }
}

#[async_trait]
impl<T: RpcTransport> BlockSource for SteemClient<T> {
    type Block = Block;

    async fn fetch_block(&self, number: u32) -> Result<Block, ReduceError> {
        self.get_block(number)
            .await?
            .ok_or_else(|| ReduceError::Source(format!("block {number} not found")))
    }

    /// The last irreversible block, so replays never see blocks that could
    /// still be dropped.
    async fn current_tip(&self) -> Result<ChainTip, ReduceError> {
        let props = self.get_dynamic_global_properties().await?;
        Ok(ChainTip {
            number: props.last_irreversible_block_num,
            poll_interval: self.block_interval(),
        })
    }
}

#[async_trait]
impl<T: RpcTransport> ContentApi for SteemClient<T> {
    async fn content(&self, author: &str, permlink: &str) -> Result<Content, ReduceError> {
        Ok(self.get_content(author, permlink).await?)
    }
}
