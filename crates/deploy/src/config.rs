//! Per-network deploy parameters.
//!
//! A [`NetworkConfig`] is built once at the start of a run and passed by
//! reference to every component; nothing in the crate reads it from ambient
//! state. Keys are snake_case in TOML and environment variables; the
//! camelCase names of the historical deploy-config tables are rewritten on
//! load so those tables can be used unchanged.

use std::path::Path;

use alloy_core::primitives::{Address, address};
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DeployError, Result};

/// Prefix for environment variable overrides, e.g. `BVM_L2_CHAIN_ID=17`.
pub const ENV_PREFIX: &str = "BVM_";

/// camelCase keys of the deploy-config tables and their snake_case names.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("numDeployConfirmations", "num_deploy_confirmations"),
    ("l1BlockTimeSeconds", "l1_block_time_seconds"),
    ("l2BlockGasLimit", "l2_block_gas_limit"),
    ("l2ChainId", "l2_chain_id"),
    ("ctcL2GasDiscountDivisor", "ctc_l2_gas_discount_divisor"),
    ("ctcEnqueueGasCost", "ctc_enqueue_gas_cost"),
    ("sccFaultProofWindowSeconds", "scc_fault_proof_window_seconds"),
    ("sccSequencerPublishWindowSeconds", "scc_sequencer_publish_window_seconds"),
    ("bvmSequencerAddress", "sequencer_address"),
    ("bvmProposerAddress", "proposer_address"),
    ("bvmBlockSignerAddress", "block_signer_address"),
    ("bvmFeeWalletAddress", "fee_wallet_address"),
    ("bvmAddressManagerOwner", "address_manager_owner"),
    ("bvmGasPriceOracleOwner", "gas_price_oracle_owner"),
    ("bvmTssRewardContractOwner", "tss_reward_contract_owner"),
];

/// Privileged accounts wired into the contract set.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    Sequencer,
    Proposer,
    BlockSigner,
    FeeWallet,
    AddressManagerOwner,
    GasPriceOracleOwner,
    TssRewardContractOwner,
}

/// Built-in parameter tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum NetworkPreset {
    Goerli,
    Local,
}

impl NetworkPreset {
    pub fn config(&self) -> NetworkConfig {
        match self {
            NetworkPreset::Goerli => NetworkConfig::goerli(),
            NetworkPreset::Local => NetworkConfig::local(),
        }
    }
}

/// Network parameters for one deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Confirmations awaited for every transaction sent during the run.
    pub num_deploy_confirmations: u64,
    pub l1_block_time_seconds: u64,
    pub l2_block_gas_limit: u64,
    pub l2_chain_id: u64,
    pub ctc_l2_gas_discount_divisor: u64,
    pub ctc_enqueue_gas_cost: u64,
    pub scc_fault_proof_window_seconds: u64,
    pub scc_sequencer_publish_window_seconds: u64,

    pub sequencer_address: Address,
    pub proposer_address: Address,
    pub block_signer_address: Address,
    pub fee_wallet_address: Address,
    /// Owner of the address manager, and the default recipient of ownership handoffs.
    pub address_manager_owner: Address,
    pub gas_price_oracle_owner: Address,
    pub tss_reward_contract_owner: Address,
}

impl NetworkConfig {
    /// The goerli testnet table.
    pub fn goerli() -> Self {
        Self {
            num_deploy_confirmations: 1,
            l1_block_time_seconds: 15,
            l2_block_gas_limit: 15_000_000,
            l2_chain_id: 420,
            ctc_l2_gas_discount_divisor: 32,
            ctc_enqueue_gas_cost: 60_000,
            scc_fault_proof_window_seconds: 10,
            scc_sequencer_publish_window_seconds: 12_592_000,
            sequencer_address: address!("7431310e026b69bfc676c0013e12a1a11411eec9"),
            proposer_address: address!("02b1786a85ec3f71fbbba46507780db7cf9014f6"),
            block_signer_address: address!("27770a9694e4b4b1e130ab91bc327c36855f612e"),
            fee_wallet_address: address!("fd1d2e729ae8eee2e146c033bf4400fe75284301"),
            address_manager_owner: address!("f80267194936da1e98db10bce06f3147d580a62e"),
            gas_price_oracle_owner: address!("a693b8f8207ff043f6bbc2e2120bbe4c2251efe9"),
            tss_reward_contract_owner: address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266"),
        }
    }

    /// A local dev node (anvil or hardhat) using the default mnemonic accounts.
    ///
    /// Account 0 deploys and also owns the address manager, so a fresh node can
    /// run the whole bring-up without impersonation.
    pub fn local() -> Self {
        Self {
            num_deploy_confirmations: 1,
            l1_block_time_seconds: 1,
            l2_block_gas_limit: 15_000_000,
            l2_chain_id: 17,
            ctc_l2_gas_discount_divisor: 32,
            ctc_enqueue_gas_cost: 60_000,
            scc_fault_proof_window_seconds: 0,
            scc_sequencer_publish_window_seconds: 12_592_000,
            sequencer_address: address!("70997970c51812dc3a010c7d01b50e0d17dc79c8"),
            proposer_address: address!("3c44cdddb6a900fa2b585dd299e03d12fa4293bc"),
            block_signer_address: address!("90f79bf6eb2c4f870365e785982e1f101e93b906"),
            fee_wallet_address: address!("15d34aaf54267db7d7c367839aaf71a00a2c6a65"),
            address_manager_owner: address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266"),
            gas_price_oracle_owner: address!("9965507d1a55bcc2695c58ba16fb37d819b0a4dc"),
            tss_reward_contract_owner: address!("976ea74026e726554db657fa54763abd0c3a0aa9"),
        }
    }

    /// The account bound to `role`.
    pub fn account(&self, role: Role) -> Address {
        match role {
            Role::Sequencer => self.sequencer_address,
            Role::Proposer => self.proposer_address,
            Role::BlockSigner => self.block_signer_address,
            Role::FeeWallet => self.fee_wallet_address,
            Role::AddressManagerOwner => self.address_manager_owner,
            Role::GasPriceOracleOwner => self.gas_price_oracle_owner,
            Role::TssRewardContractOwner => self.tss_reward_contract_owner,
        }
    }

    /// Reject tables that cannot drive a deployment.
    ///
    /// Runs before any transaction is submitted.
    pub fn validate(&self) -> Result<()> {
        if self.num_deploy_confirmations == 0 {
            return Err(DeployError::config(
                "num_deploy_confirmations must be at least 1",
            ));
        }
        if self.l2_chain_id == 0 {
            return Err(DeployError::config("l2_chain_id must be non-zero"));
        }
        if self.l2_block_gas_limit == 0 {
            return Err(DeployError::config("l2_block_gas_limit must be non-zero"));
        }
        if self.ctc_l2_gas_discount_divisor == 0 {
            return Err(DeployError::config(
                "ctc_l2_gas_discount_divisor must be non-zero",
            ));
        }

        for role in <Role as strum::IntoEnumIterator>::iter() {
            if self.account(role).is_zero() {
                return Err(DeployError::config(format!(
                    "{role} account must not be the zero address"
                )));
            }
        }

        Ok(())
    }

    /// SHA-256 of the canonical JSON form, recorded next to deployment outputs.
    pub fn config_hash(&self) -> String {
        let json = serde_json::to_string(self)
            .expect("NetworkConfig serialization should never fail");

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Layered configuration sources.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources<'a> {
    /// Base table the other sources override.
    pub preset: Option<NetworkPreset>,
    /// TOML file with (a subset of) the keys.
    pub file: Option<&'a Path>,
    /// Whether `BVM_*` environment variables are applied last.
    pub env: bool,
}

/// Load and validate a [`NetworkConfig`].
///
/// Sources are merged in order: preset, TOML file, environment. A key missing
/// from all of them, or a malformed value, is a configuration error.
pub fn load(sources: &ConfigSources<'_>) -> Result<NetworkConfig> {
    let mut figment = Figment::new();

    if let Some(preset) = sources.preset {
        figment = figment.merge(Serialized::defaults(preset.config()));
    }

    if let Some(path) = sources.file {
        if !path.exists() {
            return Err(DeployError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        figment = figment.merge(Serialized::defaults(read_table(path)?));
    }

    if sources.env {
        figment = figment.merge(Env::prefixed(ENV_PREFIX));
    }

    let config: NetworkConfig = figment
        .extract()
        .map_err(|e| DeployError::config(e.to_string()))?;

    config.validate()?;

    tracing::debug!(
        l2_chain_id = config.l2_chain_id,
        confirmations = config.num_deploy_confirmations,
        "Network configuration loaded"
    );

    Ok(config)
}

/// Read a TOML table, rewriting camelCase keys to their snake_case names.
fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&content).map_err(|e| {
        DeployError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    Ok(table
        .into_iter()
        .map(|(key, value)| {
            let key = LEGACY_KEYS
                .iter()
                .find(|(legacy, _)| *legacy == key)
                .map(|(_, name)| name.to_string())
                .unwrap_or(key);
            (key, value)
        })
        .collect())
}
