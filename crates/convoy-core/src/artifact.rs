//! Compiler artifact loading
//!
//! The coordinator consumes compiler output, it never invokes a compiler.
//! Artifacts are JSON files in the Hardhat layout (`contractName`, `abi`,
//! `bytecode`), discovered by a recursive scan of a configured directory.

use anyhow::{Context, Result};
use ethers::abi::Abi;
use ethers::types::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Compiler output for a single contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    /// Contract name as emitted by the compiler
    pub contract_name: String,

    /// Full contract ABI
    pub abi: Abi,

    /// Creation bytecode
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Load a single artifact JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid artifact {}", path.display()))
    }
}

/// Artifact lookup backed by a directory of compiler-output JSON files.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    artifacts: HashMap<String, ContractArtifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recursively scan `dir` for artifact files and index them by contract
    /// name.
    ///
    /// Hardhat output directories also contain debug files (`*.dbg.json`)
    /// and build-info blobs; anything that does not parse as an artifact is
    /// skipped. A later file for the same contract name replaces an earlier
    /// one, so keep one compilation output per directory.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut store = Self::new();

        for entry in WalkDir::new(dir) {
            let entry =
                entry.with_context(|| format!("Failed to scan artifacts in {}", dir.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if !file_name.ends_with(".json") || file_name.ends_with(".dbg.json") {
                continue;
            }

            match ContractArtifact::load(path) {
                Ok(artifact) => {
                    debug!(
                        contract = %artifact.contract_name,
                        file = %path.display(),
                        "Loaded contract artifact"
                    );
                    store.insert(artifact);
                }
                Err(e) => {
                    // Not every JSON file in a compiler output tree is an artifact.
                    debug!(file = %path.display(), error = %e, "Skipping non-artifact JSON file");
                }
            }
        }

        info!(count = store.len(), dir = %dir.display(), "Artifact store loaded");
        Ok(store)
    }

    /// Register an artifact directly, replacing any previous entry with the
    /// same contract name.
    pub fn insert(&mut self, artifact: ContractArtifact) {
        self.artifacts.insert(artifact.contract_name.clone(), artifact);
    }

    pub fn get(&self, contract: &str) -> Option<&ContractArtifact> {
        self.artifacts.get(contract)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
