use std::path::PathBuf;

use alloy_core::primitives::Address;
use bvm_deploy::{NetworkPreset, ReusePolicy};
use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use url::Url;

/// The default JSON-RPC endpoint (a local anvil or hardhat node).
const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// The default directory for deployment manifests.
const DEFAULT_OUTDATA: &str = "deployments";

#[derive(Parser)]
#[command(name = "bvmctl")]
#[command(
    author,
    version,
    about = "Deploy and wire the bvm rollup contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "BVM_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// The JSON-RPC endpoint of the target network. The node must sign for the
    /// deployer and the address-manager owner.
    #[arg(long, global = true, env = "BVM_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: Url,

    /// Built-in parameter table the config file and environment override.
    ///
    /// Defaults to `local` when no config file is given.
    #[arg(long, global = true, env = "BVM_NETWORK")]
    pub network: Option<NetworkPreset>,

    /// Path to a TOML network configuration.
    #[arg(long, global = true, env = "BVM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run against an in-process chain instead of the RPC endpoint.
    #[arg(long, global = true, env = "BVM_SIMULATE")]
    pub simulate: bool,

    /// Interval between two post-condition checks, in milliseconds.
    #[arg(long, global = true, env = "BVM_POLL_INTERVAL_MS", default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Deadline for a post-condition to hold, in milliseconds.
    #[arg(long, global = true, env = "BVM_POLL_TIMEOUT_MS", default_value_t = 5000)]
    pub poll_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// The preset to start from.
    pub fn preset(&self) -> Option<NetworkPreset> {
        match (self.network, &self.config) {
            (Some(preset), _) => Some(preset),
            (None, None) => Some(NetworkPreset::Local),
            (None, Some(_)) => None,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy (or reuse) the contract set and register it.
    Deploy(DeployArgs),

    /// Print the address registered under a name.
    Resolve {
        /// Registry name, e.g. `TssStakingSlashing`.
        name: String,

        /// Address manager to query. Read from the manifest when omitted.
        #[arg(long, env = "BVM_REGISTRY")]
        registry: Option<Address>,

        /// Directory holding deployment manifests.
        #[arg(long, env = "BVM_OUTDATA", default_value = DEFAULT_OUTDATA)]
        outdata: PathBuf,
    },

    /// Print the effective network configuration as TOML.
    ShowConfig,
}

#[derive(Args)]
pub struct DeployArgs {
    /// Directory of compiled contract artifacts.
    #[arg(long, env = "BVM_ARTIFACTS")]
    pub artifacts: PathBuf,

    /// Deployment plan. Defaults to the built-in bvm plan.
    #[arg(long, env = "BVM_PLAN")]
    pub plan: Option<PathBuf>,

    /// Address manager from an earlier run. Read from the manifest when omitted.
    #[arg(long, env = "BVM_REGISTRY")]
    pub registry: Option<Address>,

    /// Only run steps carrying one of these tags.
    #[arg(long, env = "BVM_TAGS", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Upgrade run: leave steps marked `preserve_on_upgrade` alone.
    #[arg(long, env = "BVM_UPGRADE")]
    pub upgrade: bool,

    /// Deploy every selected step even if a matching deployment is registered.
    #[arg(long, env = "BVM_FORCE_REDEPLOY")]
    pub force_redeploy: bool,

    /// When a registered deployment is reused.
    #[arg(long, env = "BVM_REUSE", default_value_t = ReusePolicy::CodeHash)]
    pub reuse: ReusePolicy,

    /// Sender of creation transactions. Defaults to the node's first account.
    #[arg(long, env = "BVM_DEPLOYER")]
    pub deployer: Option<Address>,

    /// Directory holding deployment manifests.
    #[arg(long, env = "BVM_OUTDATA", default_value = DEFAULT_OUTDATA)]
    pub outdata: PathBuf,
}
