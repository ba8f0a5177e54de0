//! Compiled contract artifacts.
//!
//! Artifacts are read from the JSON files the contract toolchain emits. Both the
//! hardhat layout (`bytecode` / `deployedBytecode` as hex strings) and the
//! foundry layout (`{ "object": "0x..." }`) are understood.

use std::{
    collections::BTreeMap,
    ops::Range,
    path::{Path, PathBuf},
};

use alloy_core::primitives::{B256, Bytes, keccak256};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{DeployError, Result};

/// Default name of the upgradeable proxy artifact.
pub const DEFAULT_PROXY_ARTIFACT: &str = "TransparentUpgradeableProxy";

/// A compiled contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub contract_name: String,
    pub abi: Value,
    /// Creation code, without constructor arguments.
    pub bytecode: Bytes,
    /// Runtime code as returned by `eth_getCode` after deployment.
    pub deployed_bytecode: Bytes,
    /// Byte ranges of the runtime code filled in by the constructor
    /// (`immutable` variables). They differ between deployments.
    pub immutable_references: Vec<Range<usize>>,
}

impl Artifact {
    pub fn new(
        contract_name: impl Into<String>,
        bytecode: impl Into<Bytes>,
        deployed_bytecode: impl Into<Bytes>,
    ) -> Self {
        Self {
            contract_name: contract_name.into(),
            abi: Value::Array(vec![]),
            bytecode: bytecode.into(),
            deployed_bytecode: deployed_bytecode.into(),
            immutable_references: Vec::new(),
        }
    }

    /// keccak256 of the runtime code, compared against on-chain code.
    pub fn code_hash(&self) -> B256 {
        keccak256(&self.deployed_bytecode)
    }

    /// Whether `code` read from chain is this artifact's runtime code.
    ///
    /// Bytes covered by [`Self::immutable_references`] are ignored.
    pub fn runtime_matches(&self, code: &[u8]) -> bool {
        if self.immutable_references.is_empty() {
            return keccak256(code) == self.code_hash();
        }
        if code.len() != self.deployed_bytecode.len() {
            return false;
        }

        code.iter()
            .zip(self.deployed_bytecode.iter())
            .enumerate()
            .all(|(i, (actual, expected))| {
                actual == expected
                    || self
                        .immutable_references
                        .iter()
                        .any(|range| range.contains(&i))
            })
    }

    /// keccak256 of the creation code followed by `encoded_args`.
    ///
    /// Identifies one deployment of the artifact with one set of constructor
    /// arguments.
    pub fn creation_fingerprint(&self, encoded_args: &[u8]) -> B256 {
        keccak256(self.creation_code(encoded_args))
    }

    /// Whether the artifact can be deployed at all (interfaces and abstract
    /// contracts compile to empty bytecode).
    pub fn is_deployable(&self) -> bool {
        !self.bytecode.is_empty()
    }

    /// Creation code followed by the ABI-encoded constructor arguments.
    pub fn creation_code(&self, encoded_args: &[u8]) -> Bytes {
        let mut code = Vec::with_capacity(self.bytecode.len() + encoded_args.len());
        code.extend_from_slice(&self.bytecode);
        code.extend_from_slice(encoded_args);
        code.into()
    }
}

#[derive(Debug, Deserialize)]
struct ImmutableReference {
    start: usize,
    length: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CodeField {
    Hex(Bytes),
    #[serde(rename_all = "camelCase")]
    Object {
        object: Bytes,
        /// Keyed by AST id of the immutable variable.
        #[serde(default)]
        immutable_references: BTreeMap<String, Vec<ImmutableReference>>,
    },
}

impl CodeField {
    fn immutable_references(&self) -> Vec<Range<usize>> {
        let CodeField::Object {
            immutable_references,
            ..
        } = self
        else {
            return Vec::new();
        };

        let mut ranges: Vec<Range<usize>> = immutable_references
            .values()
            .flatten()
            .map(|r| r.start..r.start + r.length)
            .collect();
        ranges.sort_by_key(|range| range.start);
        ranges
    }
}

impl From<CodeField> for Bytes {
    fn from(field: CodeField) -> Self {
        match field {
            CodeField::Hex(code) => code,
            CodeField::Object { object, .. } => object,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    contract_name: Option<String>,
    #[serde(default)]
    abi: Value,
    bytecode: CodeField,
    deployed_bytecode: CodeField,
}

/// Artifacts indexed by contract name.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    artifacts: BTreeMap<String, Artifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every artifact JSON below `dir`.
    ///
    /// Hardhat debug files (`*.dbg.json`) and files without bytecode fields are
    /// skipped. A file that has bytecode fields but does not parse is an error.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(DeployError::Artifact(format!(
                "artifacts directory not found: {}",
                dir.display()
            )));
        }

        let mut store = Self::new();
        let mut files = Vec::new();
        collect_json_files(dir, &mut files)?;

        for path in files {
            if let Some(artifact) = load_file(&path)? {
                tracing::trace!(
                    contract = %artifact.contract_name,
                    path = %path.display(),
                    "Loaded artifact"
                );
                store.insert(artifact);
            }
        }

        tracing::debug!(count = store.len(), dir = %dir.display(), "Artifacts loaded");
        Ok(store)
    }

    pub fn insert(&mut self, artifact: Artifact) {
        self.artifacts
            .insert(artifact.contract_name.clone(), artifact);
    }

    /// The artifact for `name`, which must be deployable.
    pub fn get(&self, name: &str) -> Result<&Artifact> {
        let artifact = self
            .artifacts
            .get(name)
            .ok_or_else(|| DeployError::Artifact(format!("no artifact named {name}")))?;

        if !artifact.is_deployable() {
            return Err(DeployError::Artifact(format!(
                "{name} has no creation bytecode"
            )));
        }

        Ok(artifact)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json")
            && !path.to_string_lossy().ends_with(".dbg.json")
        {
            out.push(path);
        }
    }
    out.sort();
    Ok(())
}

fn load_file(path: &Path) -> Result<Option<Artifact>> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        DeployError::Artifact(format!("failed to parse {}: {e}", path.display()))
    })?;

    if value.get("bytecode").is_none() || value.get("deployedBytecode").is_none() {
        return Ok(None);
    }

    let file: ArtifactFile = serde_json::from_value(value).map_err(|e| {
        DeployError::Artifact(format!("malformed artifact {}: {e}", path.display()))
    })?;

    let contract_name = match file.contract_name {
        Some(name) => name,
        None => path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                DeployError::Artifact(format!("cannot name artifact {}", path.display()))
            })?,
    };

    let immutable_references = file.deployed_bytecode.immutable_references();

    Ok(Some(Artifact {
        contract_name,
        abi: file.abi,
        bytecode: file.bytecode.into(),
        deployed_bytecode: file.deployed_bytecode.into(),
        immutable_references,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).expect("Failed to write artifact");
    }

    #[test]
    fn test_load_hardhat_and_foundry_layouts() {
        let dir = TempDir::new("bvm-artifacts").expect("Failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();

        write(
            dir.path(),
            "Lib_AddressManager.json",
            r#"{"contractName":"Lib_AddressManager","abi":[],"bytecode":"0x6080","deployedBytecode":"0x60ff"}"#,
        );
        write(
            &dir.path().join("nested"),
            "TssStakingSlashing.json",
            r#"{"abi":[],"bytecode":{"object":"0x6001"},"deployedBytecode":{"object":"0x6002"}}"#,
        );
        write(
            dir.path(),
            "Lib_AddressManager.dbg.json",
            r#"{"buildInfo":"../build-info/x.json"}"#,
        );
        write(dir.path(), "build-info.json", r#"{"solcVersion":"0.8.9"}"#);

        let store = ArtifactStore::load_dir(dir.path()).expect("Failed to load artifacts");
        assert_eq!(store.len(), 2);

        let manager = store.get("Lib_AddressManager").unwrap();
        assert_eq!(manager.bytecode, Bytes::from(vec![0x60, 0x80]));
        assert_eq!(manager.code_hash(), keccak256([0x60u8, 0xff]));

        let slashing = store.get("TssStakingSlashing").unwrap();
        assert_eq!(slashing.deployed_bytecode, Bytes::from(vec![0x60, 0x02]));
    }

    #[test]
    fn test_missing_artifact() {
        let store = ArtifactStore::new();
        assert!(matches!(
            store.get("Nope"),
            Err(DeployError::Artifact(_))
        ));
    }

    #[test]
    fn test_interface_is_not_deployable() {
        let mut store = ArtifactStore::new();
        store.insert(Artifact::new("IOwnable", Bytes::new(), Bytes::new()));
        assert!(store.get("IOwnable").is_err());
    }

    #[test]
    fn test_malformed_artifact_is_error() {
        let dir = TempDir::new("bvm-artifacts").expect("Failed to create temp dir");
        write(
            dir.path(),
            "Broken.json",
            r#"{"bytecode":"0xzz","deployedBytecode":"0x00"}"#,
        );
        assert!(ArtifactStore::load_dir(dir.path()).is_err());
    }

    #[test]
    fn test_load_immutable_references() {
        let dir = TempDir::new("bvm-artifacts").expect("Failed to create temp dir");
        write(
            dir.path(),
            "L1StandardBridge.json",
            r#"{
                "abi": [],
                "bytecode": {"object": "0x6001"},
                "deployedBytecode": {
                    "object": "0x60000000ff",
                    "immutableReferences": {"812": [{"start": 1, "length": 3}]}
                }
            }"#,
        );

        let store = ArtifactStore::load_dir(dir.path()).expect("Failed to load artifacts");
        let bridge = store.get("L1StandardBridge").unwrap();
        assert_eq!(bridge.immutable_references, vec![1..4]);

        assert!(bridge.runtime_matches(&[0x60, 0xaa, 0xbb, 0xcc, 0xff]));
        assert!(!bridge.runtime_matches(&[0x61, 0xaa, 0xbb, 0xcc, 0xff]));
        assert!(!bridge.runtime_matches(&[0x60, 0xaa, 0xbb, 0xcc]));
    }

    #[test]
    fn test_runtime_match_without_immutables() {
        let artifact = Artifact::new("A", vec![0x60u8, 0x80], vec![0x01u8, 0x02]);
        assert!(artifact.runtime_matches(&[0x01, 0x02]));
        assert!(!artifact.runtime_matches(&[0x01, 0x03]));
    }

    #[test]
    fn test_fingerprint_depends_on_args() {
        let artifact = Artifact::new("B", vec![0x60u8, 0x80], vec![0x01u8]);
        assert_ne!(
            artifact.creation_fingerprint(&[0x01]),
            artifact.creation_fingerprint(&[0x02])
        );
        assert_eq!(
            artifact.creation_fingerprint(&[]),
            keccak256([0x60u8, 0x80])
        );
    }

    #[test]
    fn test_creation_code_appends_args() {
        let artifact = Artifact::new("A", vec![0x60u8, 0x80], vec![0x01u8]);
        assert_eq!(
            artifact.creation_code(&[0xaa, 0xbb]),
            Bytes::from(vec![0x60, 0x80, 0xaa, 0xbb])
        );
    }
}
