//! JSON-RPC backed [`ChainClient`].

use alloy_core::primitives::{Address, B256, Bytes, U64};
use futures::{FutureExt, future::BoxFuture};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{ChainClient, TxReceipt, TxRequest};
use crate::{error::Result, rpc};

/// Receipt fields as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    block_number: Option<U64>,
    status: Option<U64>,
    contract_address: Option<Address>,
}

impl RpcReceipt {
    /// Pending receipts (no block yet) are treated as not mined.
    fn into_receipt(self) -> Option<TxReceipt> {
        let block_number = self.block_number?.to::<u64>();
        Some(TxReceipt {
            transaction_hash: self.transaction_hash,
            block_number,
            // Pre-byzantium receipts carry no status; treat them as success.
            status: self.status.is_none_or(|s| s.to::<u64>() == 1),
            contract_address: self.contract_address,
        })
    }
}

/// A node reached over HTTP JSON-RPC.
///
/// Transactions are sent with `eth_sendTransaction`, so the node must hold (or
/// impersonate) the sending accounts, as anvil and hardhat nodes do.
#[derive(Debug, Clone)]
pub struct RpcChain {
    client: reqwest::Client,
    url: Url,
}

impl RpcChain {
    pub fn new(url: Url) -> Result<Self> {
        Ok(Self {
            client: rpc::create_client()?,
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T> {
        rpc::json_rpc_call(&self.client, self.url.as_str(), method, params).await
    }
}

fn tx_object(tx: &TxRequest) -> Value {
    let mut object = serde_json::json!({
        "from": tx.from,
        "data": tx.data,
    });
    if let Some(to) = tx.to {
        object["to"] = serde_json::json!(to);
    }
    if let Some(gas) = tx.gas {
        object["gas"] = serde_json::json!(format!("0x{gas:x}"));
    }
    object
}

impl ChainClient for RpcChain {
    fn accounts(&self) -> BoxFuture<'_, Result<Vec<Address>>> {
        self.request("eth_accounts", vec![]).boxed()
    }

    fn block_number(&self) -> BoxFuture<'_, Result<u64>> {
        async move {
            let number: U64 = self.request("eth_blockNumber", vec![]).await?;
            Ok(number.to::<u64>())
        }
        .boxed()
    }

    fn send_transaction(&self, tx: TxRequest) -> BoxFuture<'_, Result<B256>> {
        async move {
            self.request("eth_sendTransaction", vec![tx_object(&tx)])
                .await
        }
        .boxed()
    }

    fn transaction_receipt(&self, hash: B256) -> BoxFuture<'_, Result<Option<TxReceipt>>> {
        async move {
            let receipt: Option<RpcReceipt> = self
                .request("eth_getTransactionReceipt", vec![serde_json::json!(hash)])
                .await?;
            Ok(receipt.and_then(RpcReceipt::into_receipt))
        }
        .boxed()
    }

    fn call(&self, to: Address, data: Bytes) -> BoxFuture<'_, Result<Bytes>> {
        async move {
            self.request(
                "eth_call",
                vec![
                    serde_json::json!({ "to": to, "data": data }),
                    serde_json::json!("latest"),
                ],
            )
            .await
        }
        .boxed()
    }

    fn call_at(&self, tx: TxRequest, block: u64) -> BoxFuture<'_, Result<Bytes>> {
        async move {
            self.request(
                "eth_call",
                vec![tx_object(&tx), serde_json::json!(format!("0x{block:x}"))],
            )
            .await
        }
        .boxed()
    }

    fn code_at(&self, address: Address) -> BoxFuture<'_, Result<Bytes>> {
        async move {
            self.request(
                "eth_getCode",
                vec![serde_json::json!(address), serde_json::json!("latest")],
            )
            .await
        }
        .boxed()
    }

    fn storage_at(&self, address: Address, slot: B256) -> BoxFuture<'_, Result<B256>> {
        async move {
            self.request(
                "eth_getStorageAt",
                vec![
                    serde_json::json!(address),
                    serde_json::json!(slot),
                    serde_json::json!("latest"),
                ],
            )
            .await
        }
        .boxed()
    }
}
