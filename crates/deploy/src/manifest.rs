//! On-disk record of the last successful run.
//!
//! The manifest tells later runs (and off-chain tooling) where the address
//! manager lives. Reuse is decided from chain state; the only thing a later run
//! takes from the manifest is the creation fingerprint of each contract.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::NetworkConfig,
    orchestrator::Origin,
    plan::RunReport,
};

/// One contract recorded by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<Address>,
    pub origin: Origin,
    /// keccak256 of the creation code and constructor arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<B256>,
}

/// Deployment record stored at `{outdata}/deployments-{l2_chain_id}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    /// Address manager of the run.
    pub registry: Address,
    pub l2_chain_id: u64,
    /// [`NetworkConfig::config_hash`] of the configuration the run used.
    pub config_hash: String,
    pub deployed_at: DateTime<Utc>,
    /// Version of the tool that wrote the file.
    pub version: String,
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl DeploymentManifest {
    pub fn from_report(report: &RunReport, config: &NetworkConfig) -> Self {
        let entries = report
            .iter()
            .map(|handle| {
                (
                    handle.name.clone(),
                    ManifestEntry {
                        address: handle.address,
                        implementation: handle.implementation,
                        origin: handle.origin,
                        fingerprint: handle.fingerprint,
                    },
                )
            })
            .collect();

        Self {
            registry: report.registry,
            l2_chain_id: config.l2_chain_id,
            config_hash: config.config_hash(),
            deployed_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            entries,
        }
    }

    /// Where the manifest for `l2_chain_id` lives under `outdata`.
    pub fn path(outdata: &Path, l2_chain_id: u64) -> PathBuf {
        outdata.join(format!("deployments-{l2_chain_id}.json"))
    }

    /// Recorded creation fingerprints by contract name, for
    /// [`Orchestrator::with_fingerprints`](crate::orchestrator::Orchestrator::with_fingerprints).
    pub fn fingerprints(&self) -> BTreeMap<String, B256> {
        self.entries
            .iter()
            .filter_map(|(name, entry)| Some((name.clone(), entry.fingerprint?)))
            .collect()
    }

    /// Whether the run that wrote this manifest used `config`.
    pub fn matches_config(&self, config: &NetworkConfig) -> bool {
        self.config_hash == config.config_hash()
    }

    /// Save the manifest as formatted JSON, creating `outdata` if needed.
    pub fn save(&self, outdata: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(outdata).context(format!(
            "Failed to create output directory {}",
            outdata.display()
        ))?;

        let path = Self::path(outdata, self.l2_chain_id);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        std::fs::write(&path, json)
            .context(format!("Failed to write manifest to {}", path.display()))?;

        tracing::debug!(path = %path.display(), entries = self.entries.len(), "Manifest saved");
        Ok(path)
    }

    /// Load the manifest for `l2_chain_id`. A missing file is `Ok(None)`.
    pub fn load(outdata: &Path, l2_chain_id: u64) -> Result<Option<Self>> {
        let path = Self::path(outdata, l2_chain_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .context(format!("Failed to read manifest from {}", path.display()))?;
        let manifest: Self = serde_json::from_str(&content)
            .context(format!("Failed to parse manifest {}", path.display()))?;

        Ok(Some(manifest))
    }
}
