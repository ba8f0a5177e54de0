//! bvm-deploy - Contract bring-up for the bvm rollup.
//!
//! Deploys the rollup's contract set against one network, reusing what is
//! already on chain, wiring ownership and proxy administration, and recording
//! every address in the `Lib_AddressManager` registry.

pub mod artifacts;
pub mod bindings;
pub mod chain;
pub mod config;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod plan;
pub mod poll;
pub mod post_deploy;
pub mod registry;
pub mod rpc;

pub use artifacts::{Artifact, ArtifactStore, DEFAULT_PROXY_ARTIFACT};
pub use chain::{ChainClient, ConfirmSettings, RpcChain, SimTransaction, SimulatedChain};
pub use config::{ConfigSources, NetworkConfig, NetworkPreset, Role};
pub use error::{DeployError, Result};
pub use manifest::{DeploymentManifest, ManifestEntry};
pub use orchestrator::{
    ContractHandle, DeployMode, DeployRequest, Orchestrator, OrchestratorSettings, Origin,
    ReusePolicy, StepState,
};
pub use plan::{ArgSpec, DeployPlan, RunError, RunOptions, RunReport, StepConfig};
pub use poll::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, PollSettings, await_condition};
pub use post_deploy::{FnPostDeploy, PostDeployAction, PostDeployContext, StandardPostDeploy};
pub use registry::{ADDRESS_MANAGER_NAME, AddressRegistry, RegistryEntry};
