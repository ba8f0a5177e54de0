//! Submit a transaction and wait until it is confirmed.

use std::time::Duration;

use alloy_core::primitives::B256;
use backon::{ConstantBuilder, Retryable};

use super::{ChainClient, TxReceipt, TxRequest};
use crate::error::{DeployError, Result};

/// Default interval between receipt and block-number polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default upper bound on the wait for a receipt or for confirmations.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// How long and how often to wait for a transaction to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmSettings {
    /// Blocks that must exist on top of (and including) the receipt block.
    pub confirmations: u64,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl ConfirmSettings {
    pub fn new(confirmations: u64) -> Self {
        Self {
            confirmations,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn backoff(&self) -> ConstantBuilder {
        let interval_ms = self.poll_interval.as_millis().max(1);
        let max_times = (self.timeout.as_millis() / interval_ms).max(1) as usize;

        ConstantBuilder::default()
            .with_delay(self.poll_interval)
            .with_max_times(max_times)
    }
}

/// Send `tx`, wait for its receipt, then wait for the configured confirmations.
///
/// A node rejection or a reverted receipt is a [`DeployError::TransactionFailure`]
/// carrying the node's message. For a revert the transaction is replayed with
/// `eth_call` at its block to recover the reason. Nothing is retried once the
/// node answers.
pub async fn send_and_confirm(
    chain: &dyn ChainClient,
    tx: TxRequest,
    settings: &ConfirmSettings,
) -> Result<TxReceipt> {
    let hash = chain.send_transaction(tx.clone()).await.map_err(|e| match e {
        DeployError::Rpc(msg) => DeployError::TransactionFailure(msg),
        other => other,
    })?;

    tracing::debug!(tx_hash = %hash, "Transaction sent");

    let receipt = wait_for_receipt(chain, hash, settings).await?;

    if !receipt.status {
        let reason = revert_reason(chain, tx, receipt.block_number).await;
        return Err(DeployError::tx(format!(
            "transaction {hash} reverted in block {}{reason}",
            receipt.block_number
        )));
    }

    wait_for_confirmations(chain, &receipt, settings).await?;

    tracing::debug!(
        tx_hash = %hash,
        block = receipt.block_number,
        confirmations = settings.confirmations,
        "Transaction confirmed"
    );

    Ok(receipt)
}

/// `": <message>"` when replaying `tx` reverts, empty otherwise.
async fn revert_reason(chain: &dyn ChainClient, tx: TxRequest, block: u64) -> String {
    match chain.call_at(tx, block).await {
        Err(DeployError::Rpc(message)) => format!(": {message}"),
        Err(e) => {
            tracing::debug!(error = %e, block, "Could not replay reverted transaction");
            String::new()
        }
        Ok(_) => {
            tracing::debug!(block, "Reverted transaction succeeds on replay");
            String::new()
        }
    }
}

async fn wait_for_receipt(
    chain: &dyn ChainClient,
    hash: B256,
    settings: &ConfirmSettings,
) -> Result<TxReceipt> {
    let fetch = || async move {
        chain
            .transaction_receipt(hash)
            .await?
            .ok_or_else(|| DeployError::rpc(format!("transaction {hash} not mined yet")))
    };

    fetch
        .retry(settings.backoff())
        .notify(|e: &DeployError, _| {
            tracing::trace!(error = %e, tx_hash = %hash, "Receipt not available, retrying...");
        })
        .await
        .map_err(|e| {
            DeployError::tx(format!(
                "no receipt for transaction {hash} within {:?}: {e}",
                settings.timeout
            ))
        })
}

async fn wait_for_confirmations(
    chain: &dyn ChainClient,
    receipt: &TxReceipt,
    settings: &ConfirmSettings,
) -> Result<()> {
    let target = receipt.block_number + settings.confirmations.saturating_sub(1);

    let check = || async move {
        let head = chain.block_number().await?;
        if head >= target {
            Ok(head)
        } else {
            Err(DeployError::rpc(format!(
                "head {head} below confirmation target {target}"
            )))
        }
    };

    check
        .retry(settings.backoff())
        .notify(|e: &DeployError, _| {
            tracing::trace!(error = %e, "Awaiting confirmations...");
        })
        .await
        .map(|_| ())
        .map_err(|e| {
            DeployError::tx(format!(
                "transaction {} not confirmed within {:?}: {e}",
                receipt.transaction_hash, settings.timeout
            ))
        })
}
