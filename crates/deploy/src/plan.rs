//! Ordered, tagged deployment steps.
//!
//! A plan is read from TOML (or taken from [`DeployPlan::bvm_default`]) and run
//! step by step against one [`Orchestrator`]. The address manager is brought up
//! first and is implied by every plan.

use std::{collections::HashSet, path::Path};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, U256},
};
use derive_more::Deref;
use serde::{Deserialize, Serialize};

use crate::{
    artifacts::DEFAULT_PROXY_ARTIFACT,
    chain::ChainClient,
    config::{NetworkConfig, Role},
    error::{DeployError, Result},
    orchestrator::{ContractHandle, DeployMode, DeployRequest, Orchestrator},
    post_deploy::StandardPostDeploy,
    registry::{ADDRESS_MANAGER_NAME, AddressRegistry},
};

/// A constructor or initializer argument.
///
/// In TOML every argument is a single-key table, e.g.
/// `{ registry = "Lib_AddressManager" }` or `{ uint = "100" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgSpec {
    /// Address currently registered under this name.
    Registry(String),
    /// Account bound to this role in the network configuration.
    Role(Role),
    Address(Address),
    /// Decimal or `0x`-prefixed unsigned integer.
    Uint(String),
    Bool(bool),
    String(String),
}

impl ArgSpec {
    /// The ABI value this argument stands for.
    ///
    /// Registry references fail with [`DeployError::RegistryLookupFailure`]
    /// when the name is not registered yet.
    pub async fn resolve(
        &self,
        chain: &dyn ChainClient,
        registry: Option<&AddressRegistry>,
        config: &NetworkConfig,
    ) -> Result<DynSolValue> {
        let value = match self {
            ArgSpec::Registry(name) => {
                let registry = registry.ok_or_else(|| {
                    DeployError::config(format!(
                        "cannot resolve {name} before the address manager exists"
                    ))
                })?;
                DynSolValue::Address(registry.get_address(chain, name).await?)
            }
            ArgSpec::Role(role) => DynSolValue::Address(config.account(*role)),
            ArgSpec::Address(address) => DynSolValue::Address(*address),
            ArgSpec::Uint(value) => {
                let parsed: U256 = value.parse().map_err(|e| {
                    DeployError::config(format!("invalid uint argument {value:?}: {e}"))
                })?;
                DynSolValue::Uint(parsed, 256)
            }
            ArgSpec::Bool(value) => DynSolValue::Bool(*value),
            ArgSpec::String(value) => DynSolValue::String(value.clone()),
        };
        Ok(value)
    }

    pub async fn resolve_address(
        &self,
        chain: &dyn ChainClient,
        registry: Option<&AddressRegistry>,
        config: &NetworkConfig,
    ) -> Result<Address> {
        match self.resolve(chain, registry, config).await? {
            DynSolValue::Address(address) => Ok(address),
            other => Err(DeployError::config(format!(
                "expected an address argument, got {other:?}"
            ))),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_registry() -> String {
    ADDRESS_MANAGER_NAME.to_string()
}

fn default_proxy_artifact() -> String {
    DEFAULT_PROXY_ARTIFACT.to_string()
}

/// One contract in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    /// Registry name.
    pub name: String,
    /// Artifact name, when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(default)]
    pub mode: DeployMode,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Keep the registry binding untouched during upgrade runs.
    #[serde(default)]
    pub preserve_on_upgrade: bool,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub post_deploy: StandardPostDeploy,
    #[serde(default = "default_true")]
    pub register: bool,
}

impl StepConfig {
    pub fn artifact(&self) -> &str {
        self.artifact.as_deref().unwrap_or(&self.name)
    }

    fn request(&self) -> DeployRequest<'_> {
        let request = DeployRequest::new(&self.name)
            .artifact(self.artifact())
            .args(self.args.clone())
            .mode(self.mode)
            .register(self.register);

        if self.post_deploy.is_empty() {
            request
        } else {
            request.post_deploy(&self.post_deploy)
        }
    }
}

/// An ordered list of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployPlan {
    /// Name the address manager is registered under.
    #[serde(default = "default_registry")]
    pub registry: String,
    #[serde(default = "default_proxy_artifact")]
    pub proxy_artifact: String,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// Which steps of a plan to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Run steps carrying any of these tags. Empty runs every step.
    pub tags: Vec<String>,
    /// Upgrade run: skip steps whose registry binding must be preserved.
    pub upgrade: bool,
    /// Address manager left behind by an earlier run.
    pub registry: Option<Address>,
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq, Deref)]
pub struct RunReport {
    pub registry: Address,
    /// Handles in plan order, address manager first.
    #[deref]
    pub contracts: Vec<ContractHandle>,
    /// Steps left out by tag selection or the upgrade filter.
    pub skipped: Vec<String>,
}

impl RunReport {
    pub fn handle(&self, name: &str) -> Option<&ContractHandle> {
        self.contracts.iter().find(|handle| handle.name == name)
    }
}

/// A run aborted by a fatal step.
#[derive(Debug, thiserror::Error)]
#[error("deployment aborted{}: {source}", completed_suffix(.completed))]
pub struct RunError {
    /// Contracts that reached the end of their step before the abort.
    pub completed: Vec<ContractHandle>,
    pub source: DeployError,
}

fn completed_suffix(completed: &[ContractHandle]) -> String {
    if completed.is_empty() {
        return String::new();
    }
    let names: Vec<&str> = completed.iter().map(|handle| handle.name.as_str()).collect();
    format!(" after {}", names.join(", "))
}

impl DeployPlan {
    /// The bvm contract set.
    pub fn bvm_default() -> Self {
        Self {
            registry: default_registry(),
            proxy_artifact: default_proxy_artifact(),
            steps: vec![StepConfig {
                name: "TssStakingSlashing".to_string(),
                artifact: None,
                mode: DeployMode::Proxy,
                tags: vec!["TssGroupManager".to_string()],
                preserve_on_upgrade: true,
                args: Vec::new(),
                post_deploy: StandardPostDeploy {
                    initialize: Some(ArgSpec::Registry(ADDRESS_MANAGER_NAME.to_string())),
                    change_admin: Some(Role::AddressManagerOwner),
                    transfer_ownership: Some(Role::AddressManagerOwner),
                },
                register: true,
            }],
        }
    }

    /// Read a plan from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::config(format!("failed to read plan {}: {e}", path.display()))
        })?;
        let plan: Self = toml::from_str(&content).map_err(|e| {
            DeployError::config(format!("failed to parse plan {}: {e}", path.display()))
        })?;
        plan.validate()?;
        Ok(plan)
    }

    /// Step names must be unique, non-empty and distinct from the registry.
    ///
    /// A proxy step that transfers ownership must also move the proxy admin
    /// away from the deployer: the admin's calls never reach the logic
    /// contract, so `transferOwnership` through the proxy would revert.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.is_empty() {
                return Err(DeployError::config("plan step with an empty name"));
            }
            if step.name == self.registry {
                return Err(DeployError::config(format!(
                    "{} is deployed implicitly and cannot be a plan step",
                    self.registry
                )));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(DeployError::config(format!(
                    "duplicate plan step {}",
                    step.name
                )));
            }
            if step.mode == DeployMode::Proxy
                && step.post_deploy.transfer_ownership.is_some()
                && step.post_deploy.change_admin.is_none()
            {
                return Err(DeployError::config(format!(
                    "{}: transfer_ownership on a proxy requires change_admin, \
                     the deployer cannot call through its own proxy",
                    step.name
                )));
            }
        }
        Ok(())
    }

    /// Check the plan against the accounts it will run with.
    ///
    /// Rejects a proxy step whose new admin is the deployer while ownership
    /// goes to another account.
    pub fn validate_accounts(&self, config: &NetworkConfig, deployer: Address) -> Result<()> {
        for step in self.steps.iter().filter(|step| step.mode == DeployMode::Proxy) {
            let post = &step.post_deploy;
            let (Some(admin), Some(owner)) = (post.change_admin, post.transfer_ownership) else {
                continue;
            };
            if config.account(admin) == deployer && config.account(owner) != deployer {
                return Err(DeployError::config(format!(
                    "{}: change_admin {admin} resolves to the deployer {deployer}, \
                     transfer_ownership to {owner} would revert",
                    step.name
                )));
            }
        }
        Ok(())
    }

    /// Steps selected by `options`, in plan order.
    pub fn select<'p>(&'p self, options: &RunOptions) -> Vec<&'p StepConfig> {
        self.steps
            .iter()
            .filter(|step| {
                options.tags.is_empty() || step.tags.iter().any(|tag| options.tags.contains(tag))
            })
            .filter(|step| !(options.upgrade && step.preserve_on_upgrade))
            .collect()
    }

    /// Bring up the address manager, then every selected step in order.
    ///
    /// The first failing step aborts the run. The error lists the contracts
    /// that completed before it; rerunning skips them.
    pub async fn run(
        &self,
        orchestrator: &Orchestrator<'_>,
        options: &RunOptions,
    ) -> std::result::Result<RunReport, RunError> {
        let mut completed = Vec::new();

        match self.run_steps(orchestrator, options, &mut completed).await {
            Ok((registry, skipped)) => Ok(RunReport {
                registry,
                contracts: completed,
                skipped,
            }),
            Err(source) => Err(RunError { completed, source }),
        }
    }

    async fn run_steps(
        &self,
        orchestrator: &Orchestrator<'_>,
        options: &RunOptions,
        completed: &mut Vec<ContractHandle>,
    ) -> Result<(Address, Vec<String>)> {
        self.validate()?;
        self.validate_accounts(orchestrator.config(), orchestrator.settings().deployer)?;

        if orchestrator.settings().proxy_artifact != self.proxy_artifact {
            return Err(DeployError::config(format!(
                "plan expects proxy artifact {} but the orchestrator uses {}",
                self.proxy_artifact,
                orchestrator.settings().proxy_artifact
            )));
        }

        let selected = self.select(options);
        let skipped: Vec<String> = self
            .steps
            .iter()
            .filter(|step| !selected.iter().any(|s| s.name == step.name))
            .map(|step| step.name.clone())
            .collect();

        tracing::info!(
            selected = selected.len(),
            skipped = skipped.len(),
            upgrade = options.upgrade,
            "Running deployment plan"
        );

        let owner_handoff = StandardPostDeploy {
            transfer_ownership: Some(Role::AddressManagerOwner),
            ..Default::default()
        };
        let bootstrap = DeployRequest::new(&self.registry).post_deploy(&owner_handoff);
        let (registry, handle) = orchestrator
            .bootstrap_registry(&bootstrap, options.registry)
            .await?;
        completed.push(handle);

        for step in selected {
            let handle = orchestrator.deploy(&registry, &step.request()).await?;
            completed.push(handle);
        }

        Ok((registry.address(), skipped))
    }
}
