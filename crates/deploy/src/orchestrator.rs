//! Deploy-or-reuse orchestration for a single contract.
//!
//! Each step walks `Unresolved → (Existing | Deploying) → Deployed →
//! [PostDeployRunning] → Registered`, or ends in `Failed`. The reuse decision
//! is made from chain state on every run, so rerunning after a failure skips
//! whatever already completed.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes},
    sol_types::SolValue,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{
    artifacts::{Artifact, ArtifactStore, DEFAULT_PROXY_ARTIFACT},
    bindings::{PROXY_IMPLEMENTATION_SLOT, slot_to_address},
    chain::{ChainClient, ConfirmSettings, TxRequest, send_and_confirm},
    config::NetworkConfig,
    error::{DeployError, Result},
    plan::ArgSpec,
    poll::PollSettings,
    post_deploy::{PostDeployAction, PostDeployContext},
    registry::AddressRegistry,
};

/// How a contract is put on chain.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DeployMode {
    /// Calls go straight to the deployed contract.
    #[default]
    Direct,
    /// The contract is the implementation behind a transparent proxy.
    Proxy,
}

/// When a registered deployment counts as "already deployed".
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ReusePolicy {
    /// The on-chain runtime code must hash to the artifact's runtime code. For
    /// proxies both the proxy and its implementation are checked.
    #[default]
    CodeHash,
    /// Any registered address with code is reused.
    NameOnly,
}

/// Whether a handle points at a contract found on chain or one just created.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Origin {
    Existing,
    Deployed,
}

/// A deployed contract, as seen by post-deploy actions and callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractHandle {
    pub name: String,
    /// Address calls are sent to: the proxy in proxy mode.
    pub address: Address,
    /// Logic contract behind the proxy, if any.
    pub implementation: Option<Address>,
    pub origin: Origin,
    /// [`Artifact::creation_fingerprint`] of the deployment, when known.
    pub fingerprint: Option<B256>,
}

/// Lifecycle of one deployment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StepState {
    Unresolved,
    Existing,
    Deploying,
    Deployed,
    PostDeployRunning,
    Registered,
    Failed,
}

/// One contract to bring up.
#[derive(Clone)]
pub struct DeployRequest<'r> {
    /// Registry name.
    pub name: String,
    /// Artifact to deploy, usually the same as `name`.
    pub artifact: String,
    pub args: Vec<ArgSpec>,
    pub mode: DeployMode,
    pub post_deploy: Option<&'r dyn PostDeployAction>,
    /// Write the address back into the registry.
    pub register: bool,
}

impl<'r> DeployRequest<'r> {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            artifact: name.clone(),
            name,
            args: Vec::new(),
            mode: DeployMode::Direct,
            post_deploy: None,
            register: true,
        }
    }

    pub fn artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = artifact.into();
        self
    }

    pub fn args(mut self, args: Vec<ArgSpec>) -> Self {
        self.args = args;
        self
    }

    pub fn mode(mut self, mode: DeployMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn post_deploy(mut self, action: &'r dyn PostDeployAction) -> Self {
        self.post_deploy = Some(action);
        self
    }

    pub fn register(mut self, register: bool) -> Self {
        self.register = register;
        self
    }
}

/// Knobs of an orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Interval and deadline of post-condition polls.
    pub poll: PollSettings,
    /// Interval between receipt and block-number polls.
    pub confirm_interval: Duration,
    /// Deadline for a receipt and its confirmations.
    pub confirm_timeout: Duration,
    pub reuse: ReusePolicy,
    /// Deploy even when a matching deployment is registered.
    pub force_redeploy: bool,
    /// Sender of creation transactions and post-deploy calls.
    pub deployer: Address,
    pub proxy_artifact: String,
}

impl OrchestratorSettings {
    pub fn new(deployer: Address) -> Self {
        let confirm = ConfirmSettings::new(1);
        Self {
            poll: PollSettings::default(),
            confirm_interval: confirm.poll_interval,
            confirm_timeout: confirm.timeout,
            reuse: ReusePolicy::default(),
            force_redeploy: false,
            deployer,
            proxy_artifact: DEFAULT_PROXY_ARTIFACT.to_string(),
        }
    }
}

/// Logs every state change of a step.
struct StepTracker<'n> {
    name: &'n str,
    state: StepState,
}

impl<'n> StepTracker<'n> {
    fn new(name: &'n str) -> Self {
        Self {
            name,
            state: StepState::Unresolved,
        }
    }

    fn advance(&mut self, to: StepState) {
        tracing::debug!(step = %self.name, from = %self.state, %to, "Step state changed");
        self.state = to;
    }
}

/// Brings contracts up one at a time against a single network.
pub struct Orchestrator<'a> {
    chain: &'a dyn ChainClient,
    config: &'a NetworkConfig,
    artifacts: &'a ArtifactStore,
    settings: OrchestratorSettings,
    confirm: ConfirmSettings,
    /// Creation fingerprint per registry name, from earlier runs and this one.
    fingerprints: Mutex<BTreeMap<String, B256>>,
}

impl<'a> Orchestrator<'a> {
    /// Validates `config` up front, so a bad table fails before any transaction.
    pub fn new(
        chain: &'a dyn ChainClient,
        config: &'a NetworkConfig,
        artifacts: &'a ArtifactStore,
        settings: OrchestratorSettings,
    ) -> Result<Self> {
        config.validate()?;

        if settings.deployer.is_zero() {
            return Err(DeployError::config("deployer must not be the zero address"));
        }
        if settings.poll.interval.is_zero() {
            return Err(DeployError::config("poll interval must be non-zero"));
        }

        let confirm = ConfirmSettings {
            confirmations: config.num_deploy_confirmations,
            poll_interval: settings.confirm_interval,
            timeout: settings.confirm_timeout,
        };

        Ok(Self {
            chain,
            config,
            artifacts,
            settings,
            confirm,
            fingerprints: Mutex::default(),
        })
    }

    /// Seed the creation fingerprints recorded by an earlier run.
    ///
    /// A registered deployment whose recorded fingerprint differs from the one
    /// the current artifact and arguments produce is not reused.
    pub fn with_fingerprints(self, fingerprints: BTreeMap<String, B256>) -> Self {
        *self.lock_fingerprints() = fingerprints;
        self
    }

    /// Fingerprints known after the steps run so far.
    pub fn fingerprints(&self) -> BTreeMap<String, B256> {
        self.lock_fingerprints().clone()
    }

    fn lock_fingerprints(&self) -> MutexGuard<'_, BTreeMap<String, B256>> {
        self.fingerprints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn chain(&self) -> &'a dyn ChainClient {
        self.chain
    }

    pub fn config(&self) -> &'a NetworkConfig {
        self.config
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Deploy or reuse `request`, run its post-deploy action, then register it.
    pub async fn deploy(
        &self,
        registry: &AddressRegistry,
        request: &DeployRequest<'_>,
    ) -> Result<ContractHandle> {
        let mut tracker = StepTracker::new(&request.name);
        let result = self.run_step(Some(registry), None, request, &mut tracker).await;
        self.finish(&mut tracker, result)
    }

    /// Bring up the address manager itself.
    ///
    /// `known` is where a previous run left it, if anywhere. The registry has no
    /// entry to look up yet, so reuse is decided on `known` alone. When
    /// `request.register` is set the registry records itself under
    /// `request.name`. `force_redeploy` does not apply here: pass no `known`
    /// address to get a fresh registry.
    pub async fn bootstrap_registry(
        &self,
        request: &DeployRequest<'_>,
        known: Option<Address>,
    ) -> Result<(AddressRegistry, ContractHandle)> {
        if request.mode == DeployMode::Proxy {
            return Err(DeployError::config(format!(
                "{} must be deployed directly",
                request.name
            )));
        }

        let mut tracker = StepTracker::new(&request.name);
        let result = self.run_step(None, known, request, &mut tracker).await;
        let handle = self.finish(&mut tracker, result)?;

        Ok((AddressRegistry::new(handle.address), handle))
    }

    fn finish(
        &self,
        tracker: &mut StepTracker<'_>,
        result: Result<ContractHandle>,
    ) -> Result<ContractHandle> {
        if let Err(e) = &result {
            tracing::error!(step = %tracker.name, state = %tracker.state, error = %e, "Deployment step failed");
            tracker.advance(StepState::Failed);
        }
        result
    }

    async fn run_step(
        &self,
        registry: Option<&AddressRegistry>,
        known: Option<Address>,
        request: &DeployRequest<'_>,
        tracker: &mut StepTracker<'_>,
    ) -> Result<ContractHandle> {
        let artifact = self.artifacts.get(&request.artifact)?;
        let proxy = match request.mode {
            DeployMode::Direct => None,
            DeployMode::Proxy => Some(self.artifacts.get(&self.settings.proxy_artifact)?),
        };

        let mut values = Vec::with_capacity(request.args.len());
        for arg in &request.args {
            values.push(arg.resolve(self.chain, registry, self.config).await?);
        }
        let encoded_args = DynSolValue::Tuple(values).abi_encode_params();
        let fingerprint = artifact.creation_fingerprint(&encoded_args);

        let registered = match (known, registry) {
            (Some(address), _) => Some(address),
            (None, Some(registry)) => registry.lookup(self.chain, &request.name).await?,
            (None, None) => None,
        };

        let existing = match registered {
            Some(address) if registry.is_none() || !self.settings.force_redeploy => {
                self.find_reusable(&request.name, address, artifact, proxy, fingerprint)
                    .await?
            }
            _ => None,
        };

        let handle = match existing {
            Some(handle) => {
                tracker.advance(StepState::Existing);
                tracing::info!(
                    contract = %request.name,
                    address = %handle.address,
                    "Reusing existing deployment"
                );
                handle
            }
            None => {
                tracker.advance(StepState::Deploying);
                self.deploy_new(registry, request, artifact, proxy, &encoded_args)
                    .await?
            }
        };
        tracker.advance(StepState::Deployed);

        if let Some(fingerprint) = handle.fingerprint {
            self.lock_fingerprints()
                .insert(request.name.clone(), fingerprint);
        }

        let registry = registry
            .copied()
            .unwrap_or_else(|| AddressRegistry::new(handle.address));

        if let Some(action) = request.post_deploy {
            tracker.advance(StepState::PostDeployRunning);
            let ctx = self.context(&registry);
            action.run(&ctx, &handle).await?;
        }

        if request.register {
            if registry.lookup(self.chain, &request.name).await? == Some(handle.address) {
                tracing::debug!(contract = %request.name, "Registry already binds this address");
            } else {
                registry
                    .set_address(
                        self.chain,
                        self.config,
                        &request.name,
                        handle.address,
                        &self.confirm,
                        &self.settings.poll,
                    )
                    .await?;
            }
            tracker.advance(StepState::Registered);
        }

        Ok(handle)
    }

    fn context<'c>(&'c self, registry: &'c AddressRegistry) -> PostDeployContext<'c> {
        PostDeployContext {
            chain: self.chain,
            config: self.config,
            registry,
            poll: self.settings.poll,
            confirm: self.confirm,
            deployer: self.settings.deployer,
        }
    }

    /// A handle on `address` if it holds a deployment `artifact` can stand in for.
    ///
    /// Under [`ReusePolicy::CodeHash`] the runtime code must match the artifact
    /// (immutables masked) and, when a fingerprint was recorded for `name`, the
    /// recorded one must equal `fingerprint`. A changed constructor argument,
    /// such as a redeployed dependency, therefore forces a redeploy.
    async fn find_reusable(
        &self,
        name: &str,
        address: Address,
        artifact: &Artifact,
        proxy: Option<&Artifact>,
        fingerprint: B256,
    ) -> Result<Option<ContractHandle>> {
        let code = self.chain.code_at(address).await?;
        if code.is_empty() {
            tracing::warn!(contract = %name, %address, "Registered address has no code, redeploying");
            return Ok(None);
        }

        let code_hash_policy = self.settings.reuse == ReusePolicy::CodeHash;
        let recorded = self.lock_fingerprints().get(name).copied();

        if code_hash_policy && recorded.is_some_and(|recorded| recorded != fingerprint) {
            tracing::warn!(
                contract = %name,
                %address,
                "Constructor arguments changed since the recorded deployment, redeploying"
            );
            return Ok(None);
        }

        let implementation = match proxy {
            None => {
                if code_hash_policy && !artifact.runtime_matches(&code) {
                    tracing::warn!(contract = %name, %address, "Registered code differs from artifact, redeploying");
                    return Ok(None);
                }
                None
            }
            Some(proxy) => {
                let implementation = slot_to_address(
                    self.chain
                        .storage_at(address, PROXY_IMPLEMENTATION_SLOT)
                        .await?,
                );
                if implementation.is_zero() {
                    tracing::warn!(contract = %name, %address, "Registered address is not a proxy, redeploying");
                    return Ok(None);
                }

                if code_hash_policy {
                    let logic_code = self.chain.code_at(implementation).await?;
                    if !proxy.runtime_matches(&code) || !artifact.runtime_matches(&logic_code) {
                        tracing::warn!(
                            contract = %name,
                            %address,
                            %implementation,
                            "Registered proxy or implementation differs from artifacts, redeploying"
                        );
                        return Ok(None);
                    }
                }
                Some(implementation)
            }
        };

        Ok(Some(ContractHandle {
            name: name.to_string(),
            address,
            implementation,
            origin: Origin::Existing,
            // Name-only reuse says nothing about how the contract was built.
            fingerprint: if code_hash_policy {
                Some(fingerprint)
            } else {
                recorded
            },
        }))
    }

    async fn deploy_new(
        &self,
        registry: Option<&AddressRegistry>,
        request: &DeployRequest<'_>,
        artifact: &Artifact,
        proxy: Option<&Artifact>,
        encoded_args: &[u8],
    ) -> Result<ContractHandle> {
        let logic = self.create(artifact, encoded_args).await?;
        let fingerprint = Some(artifact.creation_fingerprint(encoded_args));

        let Some(proxy) = proxy else {
            return Ok(ContractHandle {
                name: request.name.clone(),
                address: logic,
                implementation: None,
                origin: Origin::Deployed,
                fingerprint,
            });
        };

        let init_data = match (request.post_deploy, registry) {
            (Some(action), Some(registry)) => {
                let ctx = self.context(registry);
                action.proxy_init_data(&ctx).await?.unwrap_or_default()
            }
            _ => Bytes::new(),
        };

        let constructor = (logic, self.settings.deployer, init_data).abi_encode_params();
        let address = self.create(proxy, &constructor).await?;

        Ok(ContractHandle {
            name: request.name.clone(),
            address,
            implementation: Some(logic),
            origin: Origin::Deployed,
            fingerprint,
        })
    }

    /// Send a creation transaction and wait for its confirmations.
    async fn create(&self, artifact: &Artifact, encoded_args: &[u8]) -> Result<Address> {
        tracing::info!(contract = %artifact.contract_name, deployer = %self.settings.deployer, "Deploying contract");

        let tx = TxRequest::create(self.settings.deployer, artifact.creation_code(encoded_args));
        let receipt = send_and_confirm(self.chain, tx, &self.confirm).await?;

        let address = receipt.contract_address.ok_or_else(|| {
            DeployError::tx(format!(
                "receipt of {} carries no contract address",
                receipt.transaction_hash
            ))
        })?;

        tracing::info!(
            contract = %artifact.contract_name,
            %address,
            block = receipt.block_number,
            tx_hash = %receipt.transaction_hash,
            "Contract deployed"
        );

        Ok(address)
    }
}
