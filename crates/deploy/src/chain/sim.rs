//! In-process execution environment for dry runs and tests.
//!
//! [`SimulatedChain`] knows the call surfaces the bring-up touches (address
//! manager, ownable, address-resolver initialization and the transparent
//! proxy) and nothing else. Every transaction is mined into its own block and
//! every `block_number` query mines an empty block, so confirmations always
//! arrive. Writes can be hidden from readers for a configurable lag, which
//! reproduces a node answering reads before it has indexed the latest block.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use alloy_core::{
    primitives::{Address, B256, Bytes, address, keccak256},
    sol_types::{SolCall, SolValue},
};
use futures::{FutureExt, future::BoxFuture};
use tokio::time::Instant;

use super::{ChainClient, TxReceipt, TxRequest};
use crate::{
    artifacts::{ArtifactStore, DEFAULT_PROXY_ARTIFACT},
    bindings::{
        AddressManager, AddressResolver, Ownable, PROXY_ADMIN_SLOT, PROXY_IMPLEMENTATION_SLOT,
        TransparentUpgradeableProxy, address_to_slot, slot_to_address,
    },
    error::{DeployError, Result},
};

/// First account of the default dev mnemonic.
pub const DEFAULT_SIM_ACCOUNT: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

const UNKNOWN_SELECTOR: &str = "function selector was not recognized and there's no fallback function";

#[derive(Debug, Clone, Default)]
struct Contract {
    code: Bytes,
    proxy: bool,
    owner: Address,
    initialized: bool,
    lib_address_manager: Address,
    names: BTreeMap<String, Address>,
    storage: HashMap<B256, B256>,
}

impl Contract {
    fn slot(&self, slot: B256) -> B256 {
        self.storage.get(&slot).copied().unwrap_or_default()
    }

    fn only_owner(&self, sender: Address) -> std::result::Result<(), String> {
        if sender != self.owner {
            return Err("Ownable: caller is not the owner".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct World {
    contracts: HashMap<Address, Contract>,
}

/// A transaction the simulated chain has mined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimTransaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub selector: Option<[u8; 4]>,
    pub input: Bytes,
    pub block_number: u64,
    pub status: bool,
    pub created: Option<Address>,
}

impl SimTransaction {
    pub fn is_creation(&self) -> bool {
        self.to.is_none()
    }

    /// Whether this transaction called `C` on some contract.
    pub fn calls<C: SolCall>(&self) -> bool {
        self.selector == Some(C::SELECTOR)
    }
}

#[derive(Debug, Default)]
struct State {
    head: World,
    visible: World,
    pending: VecDeque<(Instant, World)>,
    read_lag: Duration,
    nonces: HashMap<Address, u64>,
    block_number: u64,
    receipts: HashMap<B256, TxReceipt>,
    history: Vec<SimTransaction>,
    reject_next: Option<String>,
    revert_selectors: Vec<[u8; 4]>,
}

impl State {
    /// Expose every write whose lag has passed.
    fn refresh(&mut self) {
        let now = Instant::now();
        while self.pending.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, world)) = self.pending.pop_front() {
                self.visible = world;
            }
        }
    }
}

/// An in-memory chain.
#[derive(Debug)]
pub struct SimulatedChain {
    state: Mutex<State>,
    accounts: Vec<Address>,
    /// Creation and runtime code per artifact name.
    codes: BTreeMap<String, (Bytes, Bytes)>,
    proxy_artifact: String,
}

impl SimulatedChain {
    /// A chain that recognizes the creation code of every artifact in `artifacts`.
    pub fn new(artifacts: &ArtifactStore) -> Self {
        let codes = artifacts
            .iter()
            .filter(|artifact| artifact.is_deployable())
            .map(|artifact| {
                (
                    artifact.contract_name.clone(),
                    (artifact.bytecode.clone(), artifact.deployed_bytecode.clone()),
                )
            })
            .collect();

        Self {
            state: Mutex::new(State::default()),
            accounts: vec![DEFAULT_SIM_ACCOUNT],
            codes,
            proxy_artifact: DEFAULT_PROXY_ARTIFACT.to_string(),
        }
    }

    /// Accounts returned by `accounts()`. Any sender is accepted regardless.
    pub fn with_accounts(mut self, accounts: Vec<Address>) -> Self {
        self.accounts = accounts;
        self
    }

    /// Name of the artifact deployed as transparent proxy.
    pub fn with_proxy_artifact(mut self, name: impl Into<String>) -> Self {
        self.proxy_artifact = name.into();
        self
    }

    /// Delay between a write being mined and readers observing it.
    pub fn set_read_lag(&self, lag: Duration) {
        self.lock().read_lag = lag;
    }

    /// Make the next `send_transaction` fail with `message` without mining.
    pub fn reject_next_transaction(&self, message: impl Into<String>) {
        self.lock().reject_next = Some(message.into());
    }

    /// Mine every later call to `selector` as reverted.
    pub fn revert_calls_to(&self, selector: [u8; 4]) {
        self.lock().revert_selectors.push(selector);
    }

    /// Stop reverting the selectors passed to [`Self::revert_calls_to`].
    pub fn clear_reverts(&self) {
        self.lock().revert_selectors.clear();
    }

    /// All mined transactions, oldest first.
    pub fn history(&self) -> Vec<SimTransaction> {
        self.lock().history.clone()
    }

    pub fn transaction_count(&self) -> usize {
        self.lock().history.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mine(&self, tx: TxRequest) -> Result<B256> {
        let mut guard = self.lock();
        let state = &mut *guard;

        if let Some(message) = state.reject_next.take() {
            return Err(DeployError::rpc(message));
        }

        let nonce_entry = state.nonces.entry(tx.from).or_default();
        let nonce = *nonce_entry;
        *nonce_entry += 1;

        state.block_number += 1;
        let block_number = state.block_number;

        let hash = keccak256(
            [
                tx.from.as_slice(),
                &nonce.to_be_bytes()[..],
                &tx.data[..],
            ]
            .concat(),
        );
        let selector = tx
            .to
            .and_then(|_| tx.data.get(..4))
            .and_then(|s| <[u8; 4]>::try_from(s).ok());

        let mut world = state.head.clone();
        let outcome = self
            .apply(&state.revert_selectors, &mut world, &tx, nonce)
            .map(|(created, _)| created);

        let (status, created) = match outcome {
            Ok(created) => {
                state.head = world;
                state
                    .pending
                    .push_back((Instant::now() + state.read_lag, state.head.clone()));
                (true, created)
            }
            Err(reason) => {
                tracing::debug!(tx_hash = %hash, %reason, "Simulated transaction reverted");
                (false, None)
            }
        };

        state.receipts.insert(
            hash,
            TxReceipt {
                transaction_hash: hash,
                block_number,
                status,
                contract_address: created,
            },
        );
        state.history.push(SimTransaction {
            hash,
            from: tx.from,
            to: tx.to,
            selector,
            input: tx.data,
            block_number,
            status,
            created,
        });

        Ok(hash)
    }

    /// Run `tx` against `world`: the created address, if any, and the return data.
    fn apply(
        &self,
        revert_selectors: &[[u8; 4]],
        world: &mut World,
        tx: &TxRequest,
        nonce: u64,
    ) -> std::result::Result<(Option<Address>, Bytes), String> {
        let selector = tx.data.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok());
        match tx.to {
            Some(_) if selector.is_some_and(|s| revert_selectors.contains(&s)) => {
                Err("reverted by simulation".to_string())
            }
            Some(to) => execute(world, tx.from, to, &tx.data).map(|ret| (None, ret)),
            None => self
                .create(world, tx.from, nonce, &tx.data)
                .map(|created| (Some(created), Bytes::new())),
        }
    }

    /// Replay `tx` against the current head. History is not kept, so `block`
    /// only has to exist.
    fn replay(&self, tx: &TxRequest, block: u64) -> Result<Bytes> {
        let state = self.lock();
        if block > state.block_number {
            return Err(DeployError::rpc(format!("unknown block {block}")));
        }

        let mut scratch = state.head.clone();
        let nonce = state.nonces.get(&tx.from).copied().unwrap_or_default();
        self.apply(&state.revert_selectors, &mut scratch, tx, nonce)
            .map(|(_, ret)| ret)
            .map_err(|reason| DeployError::rpc(format!("execution reverted: {reason}")))
    }

    fn create(
        &self,
        world: &mut World,
        from: Address,
        nonce: u64,
        data: &[u8],
    ) -> std::result::Result<Address, String> {
        let address = from.create(nonce);

        let matched = self
            .codes
            .iter()
            .filter(|(_, (init, _))| !init.is_empty() && data.starts_with(init))
            .max_by_key(|(_, (init, _))| init.len());

        let (name, runtime, args) = match matched {
            Some((name, (init, runtime))) => {
                (Some(name.as_str()), runtime.clone(), &data[init.len()..])
            }
            None => (None, Bytes::copy_from_slice(data), &[][..]),
        };

        if name == Some(self.proxy_artifact.as_str()) {
            let (logic, admin, init_data) =
                <(Address, Address, Bytes)>::abi_decode_params(args, true)
                    .map_err(|e| format!("invalid proxy constructor arguments: {e}"))?;

            let mut proxy = Contract {
                code: runtime,
                proxy: true,
                ..Default::default()
            };
            proxy
                .storage
                .insert(PROXY_IMPLEMENTATION_SLOT, address_to_slot(logic));
            proxy.storage.insert(PROXY_ADMIN_SLOT, address_to_slot(admin));
            world.contracts.insert(address, proxy);

            if !init_data.is_empty() {
                // The constructor delegates the init call on behalf of the deployer.
                let contract = world
                    .contracts
                    .get_mut(&address)
                    .ok_or_else(|| "proxy vanished".to_string())?;
                dispatch(contract, from, &init_data)?;
            }
        } else {
            world.contracts.insert(
                address,
                Contract {
                    code: runtime,
                    owner: from,
                    ..Default::default()
                },
            );
        }

        Ok(address)
    }

    fn read<T>(&self, f: impl FnOnce(&World) -> T) -> T {
        let mut state = self.lock();
        state.refresh();
        f(&state.visible)
    }
}

/// Run a call against `to`, applying the transparent proxy rules.
fn execute(
    world: &mut World,
    sender: Address,
    to: Address,
    data: &[u8],
) -> std::result::Result<Bytes, String> {
    let Some(contract) = world.contracts.get_mut(&to) else {
        // Plain transfer to an account without code.
        return Ok(Bytes::new());
    };

    if contract.proxy {
        let admin = slot_to_address(contract.slot(PROXY_ADMIN_SLOT));

        if data.starts_with(&TransparentUpgradeableProxy::changeAdminCall::SELECTOR)
            && sender == admin
        {
            let call = TransparentUpgradeableProxy::changeAdminCall::abi_decode(data, true)
                .map_err(|e| format!("invalid calldata: {e}"))?;
            if call.newAdmin.is_zero() {
                return Err("ERC1967: new admin is the zero address".to_string());
            }
            contract
                .storage
                .insert(PROXY_ADMIN_SLOT, address_to_slot(call.newAdmin));
            return Ok(Bytes::new());
        }

        if sender == admin {
            return Err(
                "TransparentUpgradeableProxy: admin cannot fallback to proxy target".to_string(),
            );
        }
    }

    dispatch(contract, sender, data)
}

/// The logic shared by every simulated contract, run against its own storage.
fn dispatch(
    contract: &mut Contract,
    sender: Address,
    data: &[u8],
) -> std::result::Result<Bytes, String> {
    let invalid = |e: alloy_core::sol_types::Error| format!("invalid calldata: {e}");

    if data.len() < 4 {
        return Err(UNKNOWN_SELECTOR.to_string());
    }

    if data.starts_with(&AddressManager::setAddressCall::SELECTOR) {
        let call = AddressManager::setAddressCall::abi_decode(data, true).map_err(invalid)?;
        contract.only_owner(sender)?;
        contract.names.insert(call.name, call.addr);
        Ok(Bytes::new())
    } else if data.starts_with(&AddressManager::getAddressCall::SELECTOR) {
        let call = AddressManager::getAddressCall::abi_decode(data, true).map_err(invalid)?;
        let addr = contract.names.get(&call.name).copied().unwrap_or_default();
        Ok(addr.abi_encode().into())
    } else if data.starts_with(&Ownable::ownerCall::SELECTOR) {
        Ok(contract.owner.abi_encode().into())
    } else if data.starts_with(&Ownable::transferOwnershipCall::SELECTOR) {
        let call = Ownable::transferOwnershipCall::abi_decode(data, true).map_err(invalid)?;
        contract.only_owner(sender)?;
        if call.newOwner.is_zero() {
            return Err("Ownable: new owner is the zero address".to_string());
        }
        contract.owner = call.newOwner;
        Ok(Bytes::new())
    } else if data.starts_with(&AddressResolver::initializeCall::SELECTOR) {
        let call = AddressResolver::initializeCall::abi_decode(data, true).map_err(invalid)?;
        if contract.initialized {
            return Err("Initializable: contract is already initialized".to_string());
        }
        contract.initialized = true;
        contract.lib_address_manager = call.libAddressManager;
        contract.owner = sender;
        Ok(Bytes::new())
    } else if data.starts_with(&AddressResolver::libAddressManagerCall::SELECTOR) {
        Ok(contract.lib_address_manager.abi_encode().into())
    } else {
        Err(UNKNOWN_SELECTOR.to_string())
    }
}

impl ChainClient for SimulatedChain {
    fn accounts(&self) -> BoxFuture<'_, Result<Vec<Address>>> {
        futures::future::ready(Ok(self.accounts.clone())).boxed()
    }

    fn block_number(&self) -> BoxFuture<'_, Result<u64>> {
        let number = {
            let mut state = self.lock();
            state.block_number += 1;
            state.block_number
        };
        futures::future::ready(Ok(number)).boxed()
    }

    fn send_transaction(&self, tx: TxRequest) -> BoxFuture<'_, Result<B256>> {
        futures::future::ready(self.mine(tx)).boxed()
    }

    fn transaction_receipt(&self, hash: B256) -> BoxFuture<'_, Result<Option<TxReceipt>>> {
        let receipt = self.lock().receipts.get(&hash).cloned();
        futures::future::ready(Ok(receipt)).boxed()
    }

    fn call(&self, to: Address, data: Bytes) -> BoxFuture<'_, Result<Bytes>> {
        let result = self.read(|world| {
            let mut scratch = world.clone();
            execute(&mut scratch, Address::ZERO, to, &data)
                .map_err(|reason| DeployError::rpc(format!("execution reverted: {reason}")))
        });
        futures::future::ready(result).boxed()
    }

    fn call_at(&self, tx: TxRequest, block: u64) -> BoxFuture<'_, Result<Bytes>> {
        futures::future::ready(self.replay(&tx, block)).boxed()
    }

    fn code_at(&self, address: Address) -> BoxFuture<'_, Result<Bytes>> {
        let code = self.read(|world| {
            world
                .contracts
                .get(&address)
                .map(|c| c.code.clone())
                .unwrap_or_default()
        });
        futures::future::ready(Ok(code)).boxed()
    }

    fn storage_at(&self, address: Address, slot: B256) -> BoxFuture<'_, Result<B256>> {
        let value = self.read(|world| {
            world
                .contracts
                .get(&address)
                .map(|c| c.slot(slot))
                .unwrap_or_default()
        });
        futures::future::ready(Ok(value)).boxed()
    }
}
