//! The execution environment seam.
//!
//! Everything the bring-up needs from a node goes through [`ChainClient`]: send
//! a transaction, read its receipt, read state. [`RpcChain`] talks JSON-RPC to a
//! real node; [`SimulatedChain`] runs in process for dry runs and tests.

mod confirm;
mod rpc;
mod sim;

use alloy_core::{
    primitives::{Address, B256, Bytes},
    sol_types::SolCall,
};
use futures::future::BoxFuture;

use crate::error::{DeployError, Result};

pub use confirm::{ConfirmSettings, send_and_confirm};
pub use rpc::RpcChain;
pub use sim::{DEFAULT_SIM_ACCOUNT, SimTransaction, SimulatedChain};

/// A transaction to submit from an account the node can sign for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    /// `None` creates a contract.
    pub to: Option<Address>,
    pub data: Bytes,
    pub gas: Option<u64>,
}

impl TxRequest {
    /// A contract creation transaction.
    pub fn create(from: Address, code: Bytes) -> Self {
        Self {
            from,
            to: None,
            data: code,
            gas: None,
        }
    }

    /// A call to an existing contract.
    pub fn call(from: Address, to: Address, call: &impl SolCall) -> Self {
        Self {
            from,
            to: Some(to),
            data: call.abi_encode().into(),
            gas: None,
        }
    }
}

/// The parts of a mined receipt the bring-up looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    /// `false` when the transaction reverted.
    pub status: bool,
    pub contract_address: Option<Address>,
}

/// Access to one network's execution environment.
///
/// Every operation suspends until the node answers. Implementations must be
/// shareable across tasks.
pub trait ChainClient: Send + Sync {
    /// Accounts the node signs for.
    fn accounts(&self) -> BoxFuture<'_, Result<Vec<Address>>>;

    fn block_number(&self) -> BoxFuture<'_, Result<u64>>;

    /// Submit a transaction. A rejection by the node surfaces as
    /// [`DeployError::Rpc`] with the node's message.
    fn send_transaction(&self, tx: TxRequest) -> BoxFuture<'_, Result<B256>>;

    /// `None` while the transaction is not yet mined.
    fn transaction_receipt(&self, hash: B256) -> BoxFuture<'_, Result<Option<TxReceipt>>>;

    /// Execute a read-only call against the latest state.
    fn call(&self, to: Address, data: Bytes) -> BoxFuture<'_, Result<Bytes>>;

    /// Replay `tx` as a call at `block` without mining it. A revert surfaces as
    /// [`DeployError::Rpc`](crate::error::DeployError::Rpc) with the revert message.
    fn call_at(&self, tx: TxRequest, block: u64) -> BoxFuture<'_, Result<Bytes>>;

    fn code_at(&self, address: Address) -> BoxFuture<'_, Result<Bytes>>;

    fn storage_at(&self, address: Address, slot: B256) -> BoxFuture<'_, Result<B256>>;
}

/// Perform a typed read-only call and decode its return values.
pub async fn view<C: SolCall>(
    chain: &dyn ChainClient,
    to: Address,
    call: &C,
) -> Result<C::Return> {
    let output = chain.call(to, call.abi_encode().into()).await?;

    C::abi_decode_returns(&output, true).map_err(|e| {
        DeployError::rpc(format!(
            "failed to decode {} output from {to}: {e}",
            C::SIGNATURE
        ))
    })
}
