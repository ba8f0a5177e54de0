//! Post-deploy actions: one-time initialization and permission handoff.
//!
//! An action runs once the contract is deployed (or found) and before it is
//! registered. Every write it performs is followed by a poll of the contract's
//! own accessor; the action only returns once the new state is observable.

use std::future::Future;

use alloy_core::{
    primitives::{Address, B256, Bytes},
    sol_types::SolCall,
};
use futures::{FutureExt, future::BoxFuture};
use serde::{Deserialize, Serialize};

use crate::{
    bindings::{AddressResolver, Ownable, PROXY_ADMIN_SLOT, TransparentUpgradeableProxy, slot_to_address},
    chain::{ChainClient, ConfirmSettings, TxReceipt, TxRequest, send_and_confirm, view},
    config::{NetworkConfig, Role},
    error::Result,
    orchestrator::{ContractHandle, Origin},
    plan::ArgSpec,
    poll::{PollSettings, await_condition},
    registry::AddressRegistry,
};

/// What a post-deploy action may touch.
pub struct PostDeployContext<'a> {
    pub chain: &'a dyn ChainClient,
    pub config: &'a NetworkConfig,
    pub registry: &'a AddressRegistry,
    pub poll: PollSettings,
    pub confirm: ConfirmSettings,
    /// Sender of every transaction the action issues.
    pub deployer: Address,
}

impl PostDeployContext<'_> {
    /// Send `call` to `to` from the deployer and wait for confirmations.
    pub async fn send(&self, to: Address, call: &impl SolCall) -> Result<TxReceipt> {
        send_and_confirm(
            self.chain,
            TxRequest::call(self.deployer, to, call),
            &self.confirm,
        )
        .await
    }

    pub async fn view<C: SolCall>(&self, to: Address, call: &C) -> Result<C::Return> {
        view(self.chain, to, call).await
    }

    pub async fn storage_at(&self, address: Address, slot: B256) -> Result<B256> {
        self.chain.storage_at(address, slot).await
    }

    /// Poll `condition` with the run's interval and deadline.
    pub async fn await_condition<F, Fut>(&self, description: &str, condition: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        await_condition(description, &self.poll, condition).await
    }

    /// Resolve an argument that must evaluate to an address.
    pub async fn resolve_address(&self, spec: &ArgSpec) -> Result<Address> {
        spec.resolve_address(self.chain, Some(self.registry), self.config)
            .await
    }
}

/// Caller-supplied logic run against a deployed contract.
pub trait PostDeployAction: Send + Sync {
    /// Calldata the proxy constructor executes when the contract is deployed
    /// behind a fresh proxy. The proxy admin cannot call through its own proxy,
    /// so initialization of a new proxy happens here instead of in [`run`].
    ///
    /// [`run`]: PostDeployAction::run
    fn proxy_init_data<'a>(
        &'a self,
        _ctx: &'a PostDeployContext<'a>,
    ) -> BoxFuture<'a, Result<Option<Bytes>>> {
        futures::future::ready(Ok(None)).boxed()
    }

    fn run<'a>(
        &'a self,
        ctx: &'a PostDeployContext<'a>,
        handle: &'a ContractHandle,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Adapts a closure into a [`PostDeployAction`].
pub struct FnPostDeploy<F> {
    f: F,
}

impl<F> FnPostDeploy<F>
where
    F: for<'a> Fn(&'a PostDeployContext<'a>, &'a ContractHandle) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> PostDeployAction for FnPostDeploy<F>
where
    F: for<'a> Fn(&'a PostDeployContext<'a>, &'a ContractHandle) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync,
{
    fn run<'a>(
        &'a self,
        ctx: &'a PostDeployContext<'a>,
        handle: &'a ContractHandle,
    ) -> BoxFuture<'a, Result<()>> {
        (self.f)(ctx, handle)
    }
}

/// Initialize, hand the proxy admin over, then hand ownership over.
///
/// Each step is skipped when its post-condition already holds, so running the
/// action against an already configured contract sends nothing. The admin
/// handoff comes before the ownership transfer: once the deployer is no longer
/// the proxy admin its calls are forwarded to the implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandardPostDeploy {
    /// Argument to `initialize(address)`, usually the address manager.
    #[serde(default)]
    pub initialize: Option<ArgSpec>,
    /// New proxy admin. Ignored for direct deployments.
    #[serde(default)]
    pub change_admin: Option<Role>,
    #[serde(default)]
    pub transfer_ownership: Option<Role>,
}

impl StandardPostDeploy {
    /// Whether the action does anything at all.
    pub fn is_empty(&self) -> bool {
        self.initialize.is_none() && self.change_admin.is_none() && self.transfer_ownership.is_none()
    }

    async fn initialize(
        &self,
        ctx: &PostDeployContext<'_>,
        handle: &ContractHandle,
        spec: &ArgSpec,
    ) -> Result<()> {
        let target = handle.address;
        let manager = ctx.resolve_address(spec).await?;

        let constructor_initialized =
            handle.origin == Origin::Deployed && handle.implementation.is_some();
        let current = ctx
            .view(target, &AddressResolver::libAddressManagerCall {})
            .await
            .ok()
            .map(|ret| ret.manager);

        if constructor_initialized || current == Some(manager) {
            tracing::debug!(contract = %handle.name, %manager, "Already initialized");
        } else {
            tracing::info!(contract = %handle.name, %manager, "Initializing contract");
            ctx.send(
                target,
                &AddressResolver::initializeCall {
                    libAddressManager: manager,
                },
            )
            .await?;
        }

        let description = format!("{}.libAddressManager() == {manager}", handle.name);
        ctx.await_condition(&description, || async move {
            let ret = ctx
                .view(target, &AddressResolver::libAddressManagerCall {})
                .await?;
            Ok(ret.manager == manager)
        })
        .await
    }

    async fn change_admin(
        &self,
        ctx: &PostDeployContext<'_>,
        handle: &ContractHandle,
        role: Role,
    ) -> Result<()> {
        if handle.implementation.is_none() {
            tracing::debug!(contract = %handle.name, "Direct deployment has no proxy admin, skipping");
            return Ok(());
        }

        let proxy = handle.address;
        let new_admin = ctx.config.account(role);
        let current = ctx
            .storage_at(proxy, PROXY_ADMIN_SLOT)
            .await
            .ok()
            .map(slot_to_address);

        if current == Some(new_admin) {
            tracing::debug!(contract = %handle.name, admin = %new_admin, "Proxy admin already set");
        } else {
            tracing::info!(contract = %handle.name, admin = %new_admin, %role, "Changing proxy admin");
            ctx.send(
                proxy,
                &TransparentUpgradeableProxy::changeAdminCall {
                    newAdmin: new_admin,
                },
            )
            .await?;
        }

        let description = format!("{} proxy admin == {new_admin}", handle.name);
        ctx.await_condition(&description, || async move {
            let word = ctx.storage_at(proxy, PROXY_ADMIN_SLOT).await?;
            Ok(slot_to_address(word) == new_admin)
        })
        .await
    }

    async fn transfer_ownership(
        &self,
        ctx: &PostDeployContext<'_>,
        handle: &ContractHandle,
        role: Role,
    ) -> Result<()> {
        let target = handle.address;
        let new_owner = ctx.config.account(role);
        let current = ctx
            .view(target, &Ownable::ownerCall {})
            .await
            .ok()
            .map(|ret| ret.owner);

        if current == Some(new_owner) {
            tracing::debug!(contract = %handle.name, owner = %new_owner, "Owner already set");
        } else {
            tracing::info!(contract = %handle.name, owner = %new_owner, %role, "Transferring ownership");
            ctx.send(
                target,
                &Ownable::transferOwnershipCall {
                    newOwner: new_owner,
                },
            )
            .await?;
        }

        let description = format!("{}.owner() == {new_owner}", handle.name);
        ctx.await_condition(&description, || async move {
            Ok(ctx.view(target, &Ownable::ownerCall {}).await?.owner == new_owner)
        })
        .await
    }
}

impl PostDeployAction for StandardPostDeploy {
    fn proxy_init_data<'a>(
        &'a self,
        ctx: &'a PostDeployContext<'a>,
    ) -> BoxFuture<'a, Result<Option<Bytes>>> {
        async move {
            let Some(spec) = &self.initialize else {
                return Ok(None);
            };
            let manager = ctx.resolve_address(spec).await?;
            let call = AddressResolver::initializeCall {
                libAddressManager: manager,
            };
            Ok(Some(call.abi_encode().into()))
        }
        .boxed()
    }

    fn run<'a>(
        &'a self,
        ctx: &'a PostDeployContext<'a>,
        handle: &'a ContractHandle,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if let Some(spec) = &self.initialize {
                self.initialize(ctx, handle, spec).await?;
            }
            if let Some(role) = self.change_admin {
                self.change_admin(ctx, handle, role).await?;
            }
            if let Some(role) = self.transfer_ownership {
                self.transfer_ownership(ctx, handle, role).await?;
            }
            Ok(())
        }
        .boxed()
    }
}
