//! End-to-end bring-up against the in-process chain.
//!
//! Every test runs with paused tokio time, so poll and confirmation timings
//! are exact. Run with: cargo test --test orchestrator_test

use std::time::Duration;

use alloy_core::{
    primitives::{Address, address},
    sol_types::SolValue,
};
use bvm_deploy::{
    ADDRESS_MANAGER_NAME, AddressRegistry, ArgSpec, Artifact, ArtifactStore, ChainClient,
    ConfirmSettings, DEFAULT_PROXY_ARTIFACT, DeployError, DeployMode, DeployPlan, DeployRequest,
    FnPostDeploy, NetworkConfig, Orchestrator, OrchestratorSettings, Origin, PollSettings,
    ReusePolicy, Role, RunOptions, SimTransaction, SimulatedChain, StandardPostDeploy, StepConfig,
    bindings::{
        AddressManager, AddressResolver, Ownable, PROXY_ADMIN_SLOT, TransparentUpgradeableProxy,
        slot_to_address,
    },
    chain::{DEFAULT_SIM_ACCOUNT, TxRequest, view},
};
use futures::FutureExt;
use tokio::time::Instant;

const DEPLOYER: Address = DEFAULT_SIM_ACCOUNT;
const OWNER: Address = address!("70997970c51812dc3a010c7d01b50e0d17dc79c8");

fn artifacts() -> ArtifactStore {
    let mut store = ArtifactStore::new();
    let contracts: [(&str, [u8; 2], [u8; 1]); 6] = [
        (ADDRESS_MANAGER_NAME, [0xa0, 0x01], [0xa1]),
        ("TssStakingSlashing", [0xb0, 0x01], [0xb1]),
        ("X", [0xc0, 0x01], [0xc1]),
        (DEFAULT_PROXY_ARTIFACT, [0xd0, 0x01], [0xd1]),
        ("A", [0xe0, 0x01], [0xe1]),
        ("B", [0xf0, 0x01], [0xf1]),
    ];
    for (name, init, runtime) in contracts {
        store.insert(Artifact::new(name, init.to_vec(), runtime.to_vec()));
    }
    store
}

/// Test setup context containing the simulated network and its inputs.
struct TestContext {
    artifacts: ArtifactStore,
    config: NetworkConfig,
    chain: SimulatedChain,
}

impl TestContext {
    /// A local network whose address-manager owner is not the deployer.
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();

        let artifacts = artifacts();
        let mut config = NetworkConfig::local();
        config.address_manager_owner = OWNER;
        let chain = SimulatedChain::new(&artifacts);

        Self {
            artifacts,
            config,
            chain,
        }
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        self.orchestrator_with(&self.artifacts, OrchestratorSettings::new(DEPLOYER))
    }

    fn orchestrator_with<'a>(
        &'a self,
        artifacts: &'a ArtifactStore,
        settings: OrchestratorSettings,
    ) -> Orchestrator<'a> {
        Orchestrator::new(&self.chain, &self.config, artifacts, settings)
            .expect("Failed to create orchestrator")
    }

    /// Deploy the address manager and hand it to the configured owner.
    async fn bootstrap(&self) -> AddressRegistry {
        let handoff = StandardPostDeploy {
            transfer_ownership: Some(Role::AddressManagerOwner),
            ..Default::default()
        };
        let request = DeployRequest::new(ADDRESS_MANAGER_NAME).post_deploy(&handoff);

        let (registry, _) = self
            .orchestrator()
            .bootstrap_registry(&request, None)
            .await
            .expect("Failed to bootstrap the address manager");
        registry
    }

    fn sent_since(&self, index: usize) -> Vec<SimTransaction> {
        self.chain.history().split_off(index)
    }

    async fn owner_of(&self, contract: Address) -> Address {
        view(&self.chain, contract, &Ownable::ownerCall {})
            .await
            .expect("Failed to read owner")
            .owner
    }
}

fn transfer_to_owner() -> StandardPostDeploy {
    StandardPostDeploy {
        transfer_ownership: Some(Role::AddressManagerOwner),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_hands_registry_to_owner() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;

    assert_eq!(ctx.owner_of(registry.address()).await, OWNER);
    assert_eq!(
        registry.get_address(&ctx.chain, ADDRESS_MANAGER_NAME).await.unwrap(),
        registry.address()
    );
}

#[tokio::test(start_paused = true)]
async fn test_fresh_deploy_creates_and_registers() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    let before = ctx.chain.transaction_count();

    let handle = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap();

    let sent = ctx.sent_since(before);
    assert_eq!(sent.len(), 2);
    assert!(sent[0].is_creation());
    assert_eq!(sent[0].from, DEPLOYER);
    assert_eq!(sent[0].created, Some(handle.address));
    assert!(sent[1].calls::<AddressManager::setAddressCall>());
    assert_eq!(sent[1].from, OWNER);

    assert_eq!(handle.origin, Origin::Deployed);
    assert_eq!(handle.implementation, None);
    assert_eq!(
        registry.get_address(&ctx.chain, "X").await.unwrap(),
        handle.address
    );
}

#[tokio::test(start_paused = true)]
async fn test_second_run_sends_nothing() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    let action = transfer_to_owner();
    let request = DeployRequest::new("X").post_deploy(&action);

    let first = ctx.orchestrator().deploy(&registry, &request).await.unwrap();
    let before = ctx.chain.transaction_count();

    let second = ctx.orchestrator().deploy(&registry, &request).await.unwrap();

    assert_eq!(ctx.chain.transaction_count(), before);
    assert_eq!(second.address, first.address);
    assert_eq!(second.origin, Origin::Existing);
    assert_eq!(
        registry.get_address(&ctx.chain, "X").await.unwrap(),
        first.address
    );
}

#[tokio::test(start_paused = true)]
async fn test_registered_matching_code_is_reused() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;

    let code = ctx.artifacts.get("X").unwrap().creation_code(&[]);
    let hash = ctx
        .chain
        .send_transaction(TxRequest::create(DEPLOYER, code))
        .await
        .unwrap();
    let existing = ctx
        .chain
        .transaction_receipt(hash)
        .await
        .unwrap()
        .and_then(|receipt| receipt.contract_address)
        .unwrap();
    registry
        .set_address(
            &ctx.chain,
            &ctx.config,
            "X",
            existing,
            &ConfirmSettings::new(1),
            &PollSettings::default(),
        )
        .await
        .unwrap();

    let before = ctx.chain.transaction_count();
    let handle = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap();

    assert_eq!(ctx.chain.transaction_count(), before);
    assert_eq!(handle.address, existing);
    assert_eq!(handle.origin, Origin::Existing);
    assert_eq!(
        registry.resolve(&ctx.chain, "X").await.unwrap().address,
        existing
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_dependency_then_embedded_address() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    let orchestrator = ctx.orchestrator();
    let dependent = DeployRequest::new("B").args(vec![ArgSpec::Registry("A".to_string())]);

    let before = ctx.chain.transaction_count();
    let err = orchestrator.deploy(&registry, &dependent).await.unwrap_err();
    assert!(matches!(err, DeployError::RegistryLookupFailure { ref name } if name == "A"));
    assert_eq!(ctx.chain.transaction_count(), before);

    let a = orchestrator
        .deploy(&registry, &DeployRequest::new("A"))
        .await
        .unwrap();
    let b = orchestrator.deploy(&registry, &dependent).await.unwrap();

    let history = ctx.chain.history();
    let creation = history
        .iter()
        .find(|tx| tx.created == Some(b.address))
        .expect("B should have been created");
    assert_eq!(
        creation.input,
        ctx.artifacts
            .get("B")
            .unwrap()
            .creation_code(&a.address.abi_encode())
    );
}

#[tokio::test(start_paused = true)]
async fn test_ownership_transfer_is_verified() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    let action = transfer_to_owner();

    let handle = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X").post_deploy(&action))
        .await
        .unwrap();

    assert_eq!(ctx.owner_of(handle.address).await, OWNER);
    assert!(
        ctx.chain
            .history()
            .iter()
            .any(|tx| tx.calls::<Ownable::transferOwnershipCall>() && tx.to == Some(handle.address))
    );
}

#[tokio::test(start_paused = true)]
async fn test_lagging_write_observed_at_first_poll_after_it_lands() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    ctx.chain.set_read_lag(Duration::from_millis(300));
    let action = transfer_to_owner();

    let start = Instant::now();
    let handle = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X").post_deploy(&action))
        .await
        .unwrap();

    // 300 ms for the ownership poll, 300 ms for the registration poll.
    assert_eq!(start.elapsed(), Duration::from_millis(600));
    assert_eq!(ctx.owner_of(handle.address).await, OWNER);
}

#[tokio::test(start_paused = true)]
async fn test_write_that_never_lands_times_out_at_deadline() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    ctx.chain.set_read_lag(Duration::from_secs(60));
    let action = transfer_to_owner();
    let before = ctx.chain.transaction_count();

    let start = Instant::now();
    let err = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X").post_deploy(&action))
        .await
        .unwrap_err();

    assert_eq!(start.elapsed(), Duration::from_millis(5000));
    match err {
        DeployError::VerificationTimeout {
            condition, timeout, ..
        } => {
            assert!(condition.contains("owner()"), "condition: {condition}");
            assert_eq!(timeout, Duration::from_millis(5000));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(
        !ctx.sent_since(before)
            .iter()
            .any(|tx| tx.calls::<AddressManager::setAddressCall>())
    );
}

#[tokio::test(start_paused = true)]
async fn test_shrunk_poll_settings() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    ctx.chain.set_read_lag(Duration::from_secs(60));
    let action = transfer_to_owner();

    let settings = OrchestratorSettings {
        poll: PollSettings::new(Duration::from_millis(10), Duration::from_millis(50)),
        ..OrchestratorSettings::new(DEPLOYER)
    };

    let start = Instant::now();
    let err = ctx
        .orchestrator_with(&ctx.artifacts, settings)
        .deploy(&registry, &DeployRequest::new("X").post_deploy(&action))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::VerificationTimeout { .. }));
    assert_eq!(start.elapsed(), Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_confirmations_gate_registration() {
    let mut ctx = TestContext::new();
    ctx.config.num_deploy_confirmations = 3;
    let registry = ctx.bootstrap().await;
    let before = ctx.chain.transaction_count();

    ctx.orchestrator()
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap();

    let sent = ctx.sent_since(before);
    assert_eq!(sent.len(), 2);
    // Two more blocks are observed on top of the creation before registering.
    assert_eq!(sent[1].block_number, sent[0].block_number + 3);

    let mut ctx = TestContext::new();
    ctx.config.num_deploy_confirmations = 1;
    let registry = ctx.bootstrap().await;
    let before = ctx.chain.transaction_count();

    ctx.orchestrator()
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap();

    let sent = ctx.sent_since(before);
    assert_eq!(sent[1].block_number, sent[0].block_number + 2);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_transaction_surfaces_node_message() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    ctx.chain
        .reject_next_transaction("insufficient funds for gas * price + value");

    let err = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "transaction failed: insufficient funds for gas * price + value"
    );
    assert_eq!(registry.lookup(&ctx.chain, "X").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_reverted_handoff_is_fatal() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    ctx.chain
        .revert_calls_to(<Ownable::transferOwnershipCall as alloy_core::sol_types::SolCall>::SELECTOR);
    let action = transfer_to_owner();

    let err = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X").post_deploy(&action))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeployError::TransactionFailure(ref msg) if msg.ends_with(": execution reverted: reverted by simulation")
    ));
    assert_eq!(registry.lookup(&ctx.chain, "X").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_registration_by_non_owner_reports_revert_reason() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    let mut config = ctx.config.clone();
    config.address_manager_owner = DEPLOYER;

    let err = registry
        .set_address(
            &ctx.chain,
            &config,
            "X",
            OWNER,
            &ConfirmSettings::new(1),
            &PollSettings::default(),
        )
        .await
        .unwrap_err();

    let DeployError::TransactionFailure(message) = err else {
        panic!("expected a transaction failure, got {err}");
    };
    assert!(message.contains("reverted in block"));
    assert!(message.ends_with("Ownable: caller is not the owner"));
    assert_eq!(registry.lookup(&ctx.chain, "X").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_failed_registration_is_repaired_by_rerun() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    ctx.chain
        .revert_calls_to(<AddressManager::setAddressCall as alloy_core::sol_types::SolCall>::SELECTOR);

    let err = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::TransactionFailure(_)));
    assert_eq!(registry.lookup(&ctx.chain, "X").await.unwrap(), None);

    ctx.chain.clear_reverts();
    let handle = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap();

    assert_eq!(
        registry.get_address(&ctx.chain, "X").await.unwrap(),
        handle.address
    );
}

#[tokio::test(start_paused = true)]
async fn test_reuse_policy_on_code_mismatch() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    let original = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap();

    // Same creation code, different expected runtime code.
    let mut altered = artifacts();
    altered.insert(Artifact::new("X", vec![0xc0u8, 0x01], vec![0xc9u8]));

    let before = ctx.chain.transaction_count();
    let name_only = OrchestratorSettings {
        reuse: ReusePolicy::NameOnly,
        ..OrchestratorSettings::new(DEPLOYER)
    };
    let reused = ctx
        .orchestrator_with(&altered, name_only)
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap();
    assert_eq!(reused.address, original.address);
    assert_eq!(ctx.chain.transaction_count(), before);

    let redeployed = ctx
        .orchestrator_with(&altered, OrchestratorSettings::new(DEPLOYER))
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap();
    assert_ne!(redeployed.address, original.address);
    assert_eq!(redeployed.origin, Origin::Deployed);
    assert_eq!(
        registry.get_address(&ctx.chain, "X").await.unwrap(),
        redeployed.address
    );
}

#[tokio::test(start_paused = true)]
async fn test_force_redeploy() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    let original = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap();

    let forced = OrchestratorSettings {
        force_redeploy: true,
        ..OrchestratorSettings::new(DEPLOYER)
    };
    let handle = ctx
        .orchestrator_with(&ctx.artifacts, forced)
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap();

    assert_ne!(handle.address, original.address);
    assert_eq!(
        registry.get_address(&ctx.chain, "X").await.unwrap(),
        handle.address
    );
}

#[tokio::test(start_paused = true)]
async fn test_redeployed_dependency_invalidates_dependent() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    let dependency = DeployRequest::new("A");
    let dependent = DeployRequest::new("B").args(vec![ArgSpec::Registry("A".to_string())]);

    let first = ctx.orchestrator();
    let old_a = first.deploy(&registry, &dependency).await.unwrap();
    let old_b = first.deploy(&registry, &dependent).await.unwrap();

    let forced = OrchestratorSettings {
        force_redeploy: true,
        ..OrchestratorSettings::new(DEPLOYER)
    };
    let new_a = ctx
        .orchestrator_with(&ctx.artifacts, forced)
        .with_fingerprints(first.fingerprints())
        .deploy(&registry, &dependency)
        .await
        .unwrap();
    assert_ne!(new_a.address, old_a.address);

    let later = ctx.orchestrator().with_fingerprints(first.fingerprints());
    let new_b = later.deploy(&registry, &dependent).await.unwrap();

    assert_eq!(new_b.origin, Origin::Deployed);
    assert_ne!(new_b.address, old_b.address);
    let history = ctx.chain.history();
    let creation = history
        .iter()
        .find(|tx| tx.created == Some(new_b.address))
        .expect("B should have been recreated");
    assert_eq!(
        creation.input,
        ctx.artifacts
            .get("B")
            .unwrap()
            .creation_code(&new_a.address.abi_encode())
    );
    assert_eq!(
        registry.get_address(&ctx.chain, "B").await.unwrap(),
        new_b.address
    );

    // Same arguments as recorded now, so the next run leaves B alone.
    let before = ctx.chain.transaction_count();
    let again = later.deploy(&registry, &dependent).await.unwrap();
    assert_eq!(again.address, new_b.address);
    assert_eq!(again.origin, Origin::Existing);
    assert_eq!(ctx.chain.transaction_count(), before);
}

#[tokio::test(start_paused = true)]
async fn test_unrecorded_deployment_is_adopted() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;
    let original = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap();

    let orchestrator = ctx.orchestrator();
    let handle = orchestrator
        .deploy(&registry, &DeployRequest::new("X"))
        .await
        .unwrap();

    assert_eq!(handle.address, original.address);
    assert_eq!(handle.origin, Origin::Existing);
    assert_eq!(handle.fingerprint, original.fingerprint);
    assert_eq!(
        orchestrator.fingerprints().get("X").copied(),
        original.fingerprint
    );
}

#[tokio::test(start_paused = true)]
async fn test_closure_post_deploy_failure_blocks_registration() {
    let ctx = TestContext::new();
    let registry = ctx.bootstrap().await;

    let action = FnPostDeploy::new(|ctx, handle| {
        async move {
            let owner = ctx.view(handle.address, &Ownable::ownerCall {}).await?.owner;
            if owner != OWNER {
                return Err(DeployError::config(format!("{} is owned by {owner}", handle.name)));
            }
            Ok::<_, DeployError>(())
        }
        .boxed()
    });

    let err = ctx
        .orchestrator()
        .deploy(&registry, &DeployRequest::new("X").post_deploy(&action))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("X is owned by"));
    assert_eq!(registry.lookup(&ctx.chain, "X").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_bvm_plan_wires_proxy() {
    let ctx = TestContext::new();
    let plan = DeployPlan::bvm_default();

    let report = plan
        .run(&ctx.orchestrator(), &RunOptions::default())
        .await
        .unwrap();

    let slashing = report.handle("TssStakingSlashing").unwrap();
    let implementation = slashing.implementation.expect("deployed behind a proxy");
    assert_eq!(slashing.origin, Origin::Deployed);

    let admin = ctx
        .chain
        .storage_at(slashing.address, PROXY_ADMIN_SLOT)
        .await
        .unwrap();
    assert_eq!(slot_to_address(admin), OWNER);
    assert_eq!(ctx.owner_of(slashing.address).await, OWNER);

    let manager = view(
        &ctx.chain,
        slashing.address,
        &AddressResolver::libAddressManagerCall {},
    )
    .await
    .unwrap()
    .manager;
    assert_eq!(manager, report.registry);

    let history = ctx.chain.history();
    assert!(history.iter().any(|tx| {
        tx.calls::<TransparentUpgradeableProxy::changeAdminCall>() && tx.to == Some(slashing.address)
    }));
    // Initialized through the proxy constructor, never directly.
    assert!(
        !history
            .iter()
            .any(|tx| tx.calls::<AddressResolver::initializeCall>())
    );
    assert_ne!(implementation, slashing.address);

    let registry = AddressRegistry::new(report.registry);
    assert_eq!(
        registry
            .get_address(&ctx.chain, "TssStakingSlashing")
            .await
            .unwrap(),
        slashing.address
    );
}

#[tokio::test(start_paused = true)]
async fn test_bvm_plan_rerun_is_a_noop() {
    let ctx = TestContext::new();
    let plan = DeployPlan::bvm_default();
    let first = plan
        .run(&ctx.orchestrator(), &RunOptions::default())
        .await
        .unwrap();
    let before = ctx.chain.transaction_count();

    let options = RunOptions {
        registry: Some(first.registry),
        ..Default::default()
    };
    let second = plan.run(&ctx.orchestrator(), &options).await.unwrap();

    assert_eq!(ctx.chain.transaction_count(), before);
    assert_eq!(second.registry, first.registry);
    assert!(second.iter().all(|handle| handle.origin == Origin::Existing));
    assert_eq!(
        second.handle("TssStakingSlashing").unwrap().address,
        first.handle("TssStakingSlashing").unwrap().address
    );
}

#[tokio::test(start_paused = true)]
async fn test_upgrade_run_keeps_preserved_binding() {
    let ctx = TestContext::new();
    let plan = DeployPlan::bvm_default();
    let options = RunOptions {
        upgrade: true,
        ..Default::default()
    };

    let report = plan.run(&ctx.orchestrator(), &options).await.unwrap();

    assert_eq!(report.len(), 1);
    assert_eq!(report[0].name, ADDRESS_MANAGER_NAME);
    assert_eq!(report.skipped, ["TssStakingSlashing"]);
}

#[tokio::test(start_paused = true)]
async fn test_aborted_run_lists_completed_steps() {
    let ctx = TestContext::new();
    let mut plan = DeployPlan::bvm_default();
    plan.steps.insert(
        0,
        StepConfig {
            name: "B".to_string(),
            artifact: None,
            mode: DeployMode::Direct,
            tags: vec![],
            preserve_on_upgrade: false,
            args: vec![ArgSpec::Registry("A".to_string())],
            post_deploy: StandardPostDeploy::default(),
            register: true,
        },
    );

    let err = plan
        .run(&ctx.orchestrator(), &RunOptions::default())
        .await
        .unwrap_err();

    let completed: Vec<&str> = err.completed.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(completed, [ADDRESS_MANAGER_NAME]);
    assert!(matches!(err.source, DeployError::RegistryLookupFailure { .. }));
}
