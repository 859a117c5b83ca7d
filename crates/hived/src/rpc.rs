//! JSON-RPC client for the chain daemon.

use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use hive_core::collab::ChainClient;
use hive_core::config::ChainSection;
use hive_core::net::{self, HttpRequest};

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcReply<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct TxOut {
    /// Output value in coins.
    value: f64,
}

/// [`ChainClient`] speaking the bitcoin-style JSON-RPC of the chain daemon.
#[derive(Debug, Clone)]
pub struct RpcChain {
    endpoint: String,
    authorization: String,
    collateral_txid: String,
    collateral_vout: u32,
    timeout: Duration,
}

impl RpcChain {
    pub fn new(chain: &ChainSection) -> Self {
        let credentials = STANDARD.encode(format!("{}:{}", chain.rpc_user, chain.rpc_password));
        Self {
            endpoint: chain.rpc_endpoint.clone(),
            authorization: format!("Basic {credentials}"),
            collateral_txid: chain.collateral_txid.clone(),
            collateral_vout: chain.collateral_vout,
            timeout: Duration::from_secs(15),
        }
    }

    /// Call `method`; a null result is returned as `None`.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> anyhow::Result<Option<T>> {
        let request = HttpRequest::post("/")
            .header("authorization", self.authorization.clone())
            .json(&json!({ "jsonrpc": "1.0", "id": "hived", "method": method, "params": params }))?;
        let response = net::send(&self.endpoint, request, self.timeout).await?;
        // The daemon reports RPC errors with a 500 status and a JSON body.
        let reply: RpcReply<T> = response
            .json()
            .with_context(|| format!("{method}: unexpected reply ({}): {}", response.status, response.text()))?;
        if let Some(error) = reply.error {
            return Err(anyhow!("{method} failed ({}): {}", error.code, error.message));
        }
        debug!(%method, "rpc call done");
        Ok(reply.result)
    }
}

#[async_trait]
impl ChainClient for RpcChain {
    async fn block_height(&self) -> anyhow::Result<u64> {
        self.call("getblockcount", json!([]))
            .await?
            .ok_or_else(|| anyhow!("getblockcount returned null"))
    }

    async fn collateral_coins(&self) -> anyhow::Result<u64> {
        if self.collateral_txid.is_empty() {
            return Err(anyhow!("no collateral transaction configured"));
        }
        let out: TxOut = self
            .call(
                "gettxout",
                json!([self.collateral_txid, self.collateral_vout]),
            )
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "collateral {}:{} is spent or unknown",
                    self.collateral_txid,
                    self.collateral_vout
                )
            })?;
        Ok(out.value.max(0.0).floor() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_header() {
        let chain = RpcChain::new(&ChainSection {
            rpc_user: "user".to_string(),
            rpc_password: "pass".to_string(),
            ..ChainSection::default()
        });
        assert_eq!(chain.authorization, "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn reply_shapes() {
        let ok: RpcReply<u64> = serde_json::from_str(r#"{"result":1234,"error":null,"id":"hived"}"#).unwrap();
        assert_eq!(ok.result, Some(1234));
        assert!(ok.error.is_none());

        let spent: RpcReply<TxOut> = serde_json::from_str(r#"{"result":null,"error":null}"#).unwrap();
        assert!(spent.result.is_none());

        let failed: RpcReply<u64> =
            serde_json::from_str(r#"{"result":null,"error":{"code":-8,"message":"bad"}}"#).unwrap();
        assert_eq!(failed.error.unwrap().code, -8);
    }

    #[tokio::test]
    async fn missing_collateral_is_an_error() {
        let chain = RpcChain::new(&ChainSection::default());
        assert!(chain.collateral_coins().await.is_err());
    }
}
