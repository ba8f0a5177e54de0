//! Registry resolver over `Lib_AddressManager`.
//!
//! The registry contract is the source of truth for every `(name → address)`
//! binding. Nothing here caches an entry: each lookup is an `eth_call`.

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{
    bindings::{AddressManager, PROXY_IMPLEMENTATION_SLOT, slot_to_address},
    chain::{ChainClient, ConfirmSettings, TxReceipt, TxRequest, send_and_confirm, view},
    config::NetworkConfig,
    error::{DeployError, Result},
    orchestrator::{ContractHandle, Origin},
    poll::{PollSettings, await_condition},
};

/// Name the address manager registers itself under.
pub const ADDRESS_MANAGER_NAME: &str = "Lib_AddressManager";

/// A `(name → address)` binding read from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub address: Address,
}

/// Handle on a deployed address manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRegistry {
    address: Address,
}

impl AddressRegistry {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The binding for `name`, or `None` if the registry holds the zero address.
    pub async fn lookup(&self, chain: &dyn ChainClient, name: &str) -> Result<Option<Address>> {
        let call = AddressManager::getAddressCall {
            name: name.to_string(),
        };
        let addr = view(chain, self.address, &call).await?.addr;
        Ok((!addr.is_zero()).then_some(addr))
    }

    /// The binding for `name`.
    ///
    /// # Errors
    /// [`DeployError::RegistryLookupFailure`] if `name` is unregistered.
    pub async fn get_address(&self, chain: &dyn ChainClient, name: &str) -> Result<Address> {
        self.lookup(chain, name)
            .await?
            .ok_or_else(|| DeployError::not_registered(name))
    }

    /// Resolve a prerequisite contract into a callable handle.
    ///
    /// Fails with [`DeployError::RegistryLookupFailure`] if `name` is
    /// unregistered or bound to an address without code. The handle's
    /// implementation is read from the EIP-1967 slot when one is set.
    pub async fn resolve(&self, chain: &dyn ChainClient, name: &str) -> Result<ContractHandle> {
        let address = self.get_address(chain, name).await?;

        if chain.code_at(address).await?.is_empty() {
            tracing::warn!(%name, %address, "Registered address has no code");
            return Err(DeployError::not_registered(name));
        }

        let implementation =
            slot_to_address(chain.storage_at(address, PROXY_IMPLEMENTATION_SLOT).await?);

        Ok(ContractHandle {
            name: name.to_string(),
            address,
            implementation: (!implementation.is_zero()).then_some(implementation),
            origin: Origin::Existing,
            fingerprint: None,
        })
    }

    /// Bind `name` to `address` and wait until readers observe the binding.
    ///
    /// The write is sent from the configured address-manager owner. After the
    /// receipt is confirmed, `getAddress(name)` is polled until it returns
    /// `address`.
    pub async fn set_address(
        &self,
        chain: &dyn ChainClient,
        config: &NetworkConfig,
        name: &str,
        address: Address,
        confirm: &ConfirmSettings,
        poll: &PollSettings,
    ) -> Result<TxReceipt> {
        tracing::info!(%name, %address, registry = %self.address, "Registering address");

        let call = AddressManager::setAddressCall {
            name: name.to_string(),
            addr: address,
        };
        let receipt = send_and_confirm(
            chain,
            TxRequest::call(config.address_manager_owner, self.address, &call),
            confirm,
        )
        .await?;

        let description = format!("getAddress(\"{name}\") == {address}");
        await_condition(&description, poll, || async move {
            Ok(self.lookup(chain, name).await? == Some(address))
        })
        .await?;

        Ok(receipt)
    }

    /// Current binding of every name in `names`, skipping unregistered ones.
    pub async fn entries(
        &self,
        chain: &dyn ChainClient,
        names: &[&str],
    ) -> Result<Vec<RegistryEntry>> {
        let mut entries = Vec::new();
        for name in names.iter().copied() {
            if let Some(address) = self.lookup(chain, name).await? {
                entries.push(RegistryEntry {
                    name: name.to_string(),
                    address,
                });
            }
        }
        Ok(entries)
    }
}
