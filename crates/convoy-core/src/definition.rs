//! Bundle definition format
//!
//! A bundle definition is an ordered JSON array of steps. The `action` field
//! selects the step kind; any other value is rejected by serde when the
//! definition is loaded, before anything touches the network.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("Failed to read bundle definition {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid bundle definition: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// One entry in a bundle definition.
///
/// Execution order is the order steps appear in the definition. `Deploy`
/// steps create a contract and record it in the registry under `name`
/// (falling back to `contract`); `Call` steps invoke a function on a
/// previously deployed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum BundleStep {
    #[serde(rename_all = "camelCase")]
    Deploy {
        /// Artifact name of the contract to deploy
        contract: String,

        /// Registry name for later references; defaults to `contract`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,

        /// Constructor arguments
        #[serde(default)]
        arguments: Vec<Value>,

        /// Gas limit forwarded to the executor for this step
        gas_limit: u64,
    },

    #[serde(rename_all = "camelCase")]
    Call {
        /// Registry name of the contract to call
        target: String,

        /// Function name on the target's ABI
        function: String,

        /// Call arguments
        #[serde(default)]
        arguments: Vec<Value>,

        /// Gas limit forwarded to the executor for this step
        gas_limit: u64,
    },
}

impl BundleStep {
    /// The name this step is registered or looked up under.
    pub fn display_name(&self) -> &str {
        match self {
            BundleStep::Deploy { contract, name, .. } => name.as_deref().unwrap_or(contract),
            BundleStep::Call { target, .. } => target,
        }
    }

    pub fn gas_limit(&self) -> u64 {
        match self {
            BundleStep::Deploy { gas_limit, .. } | BundleStep::Call { gas_limit, .. } => *gas_limit,
        }
    }

    pub fn is_deploy(&self) -> bool {
        matches!(self, BundleStep::Deploy { .. })
    }
}

/// An ordered bundle definition as authored in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleDefinition {
    pub steps: Vec<BundleStep>,
}

impl BundleDefinition {
    /// Parse a definition from raw JSON.
    pub fn from_json(raw: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load a definition from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DefinitionError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| DefinitionError::Read {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of deploy steps, i.e. how many nonces the bundle will consume.
    pub fn deploy_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_deploy()).count()
    }
}
