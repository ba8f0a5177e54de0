//! bvmctl deploys the bvm rollup contracts and wires their permissions.

mod cli;

use std::time::Duration;

use anyhow::{Context, Result};
use bvm_deploy::{
    AddressRegistry, ArtifactStore, ChainClient, ConfigSources, DeployPlan, DeploymentManifest,
    NetworkConfig, Orchestrator, OrchestratorSettings, PollSettings, RpcChain, RunOptions,
    RunReport, SimulatedChain,
};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command, DeployArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = bvm_deploy::config::load(&ConfigSources {
        preset: cli.preset(),
        file: cli.config.as_deref(),
        env: true,
    })
    .context("Failed to load network configuration")?;

    match &cli.command {
        Command::ShowConfig => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("# config hash: {}", config.config_hash());
            print!("{rendered}");
        }
        Command::Resolve {
            name,
            registry,
            outdata,
        } => {
            if cli.simulate {
                anyhow::bail!("resolve needs a live node, drop --simulate");
            }

            let registry = match registry {
                Some(address) => *address,
                None => DeploymentManifest::load(outdata, config.l2_chain_id)?
                    .map(|manifest| manifest.registry)
                    .context("No manifest found, pass --registry")?,
            };

            let chain = RpcChain::new(cli.rpc_url.clone())?;
            let handle = AddressRegistry::new(registry)
                .resolve(&chain, name)
                .await
                .context(format!("Failed to resolve {name}"))?;

            match handle.implementation {
                Some(implementation) => {
                    println!("{} (implementation {implementation})", handle.address)
                }
                None => println!("{}", handle.address),
            }
        }
        Command::Deploy(args) => deploy(&cli, &config, args).await?,
    }

    Ok(())
}

async fn deploy(cli: &Cli, config: &NetworkConfig, args: &DeployArgs) -> Result<()> {
    let artifacts = ArtifactStore::load_dir(&args.artifacts).context(format!(
        "Failed to load artifacts from {}",
        args.artifacts.display()
    ))?;

    let plan = match &args.plan {
        Some(path) => DeployPlan::load(path)?,
        None => DeployPlan::bvm_default(),
    };

    let chain: Box<dyn ChainClient> = if cli.simulate {
        tracing::info!("Running against a simulated chain, nothing is sent to the network");
        Box::new(SimulatedChain::new(&artifacts).with_proxy_artifact(plan.proxy_artifact.clone()))
    } else {
        tracing::info!(rpc_url = %cli.rpc_url, "Connecting to network");
        Box::new(RpcChain::new(cli.rpc_url.clone())?)
    };

    let deployer = match args.deployer {
        Some(deployer) => deployer,
        None => chain
            .accounts()
            .await?
            .first()
            .copied()
            .context("The node signs for no account, pass --deployer")?,
    };

    // A simulated run starts from an empty chain, earlier manifests do not apply.
    let manifest = if cli.simulate {
        None
    } else {
        DeploymentManifest::load(&args.outdata, config.l2_chain_id)?
    };
    if let Some(manifest) = &manifest {
        if !manifest.matches_config(config) {
            tracing::warn!(
                deployed_at = %manifest.deployed_at,
                "Network configuration changed since the last recorded run"
            );
        }
    }

    let settings = OrchestratorSettings {
        poll: PollSettings::new(
            Duration::from_millis(cli.poll_interval_ms),
            Duration::from_millis(cli.poll_timeout_ms),
        ),
        reuse: args.reuse,
        force_redeploy: args.force_redeploy,
        proxy_artifact: plan.proxy_artifact.clone(),
        ..OrchestratorSettings::new(deployer)
    };
    let fingerprints = manifest
        .as_ref()
        .map(DeploymentManifest::fingerprints)
        .unwrap_or_default();
    let orchestrator = Orchestrator::new(chain.as_ref(), config, &artifacts, settings)?
        .with_fingerprints(fingerprints);

    let options = RunOptions {
        tags: args.tags.clone(),
        upgrade: args.upgrade,
        registry: args.registry.or(manifest.map(|manifest| manifest.registry)),
    };

    let report = plan.run(&orchestrator, &options).await?;
    print_report(&report);

    if !cli.simulate {
        let path = DeploymentManifest::from_report(&report, config).save(&args.outdata)?;
        tracing::info!(path = %path.display(), "Deployment manifest written");
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Contract", "Address", "Implementation", "Origin"]);

    for handle in report.iter() {
        table.add_row(vec![
            handle.name.clone(),
            handle.address.to_string(),
            handle
                .implementation
                .map(|address| address.to_string())
                .unwrap_or_else(|| "-".to_string()),
            handle.origin.to_string(),
        ]);
    }

    println!("{table}");

    if !report.skipped.is_empty() {
        println!("Skipped: {}", report.skipped.join(", "));
    }
}
