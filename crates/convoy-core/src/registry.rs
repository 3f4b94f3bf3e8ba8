//! Append-only contract registry
//!
//! The registry records the address and ABI of every deploy step while a
//! bundle is being built. Entries can be added and read but never replaced
//! or removed, so a reference resolved early in the build cannot change
//! meaning later.

use crate::error::BuildError;
use crate::placeholder::Placeholder;
use ethers::abi::Abi;
use ethers::types::Address;
use ethers::utils::to_checksum;
use std::collections::HashMap;

/// A contract recorded for one deploy step.
#[derive(Debug, Clone)]
pub struct RegisteredContract {
    pub address: Address,
    pub abi: Abi,
}

#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    entries: HashMap<String, RegisteredContract>,
    // Insertion order, for deterministic display
    order: Vec<String>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deployed contract under `name`. Names are single-assignment;
    /// registering an existing name fails.
    pub fn register(&mut self, name: &str, address: Address, abi: Abi) -> Result<(), BuildError> {
        if self.entries.contains_key(name) {
            return Err(BuildError::DuplicateName(name.to_string()));
        }
        self.entries
            .insert(name.to_string(), RegisteredContract { address, abi });
        self.order.push(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredContract> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Resolve a placeholder to its field value.
    ///
    /// `address` is the only field currently exposed; it renders as a
    /// checksummed hex string so it can be substituted into arguments.
    pub fn field(&self, placeholder: &Placeholder) -> Result<String, BuildError> {
        let entry = self
            .get(&placeholder.name)
            .ok_or_else(|| BuildError::UnresolvedReference(placeholder.name.clone()))?;

        match placeholder.field.as_str() {
            "address" => Ok(to_checksum(&entry.address, None)),
            _ => Err(BuildError::UnknownField {
                step: placeholder.name.clone(),
                field: placeholder.field.clone(),
            }),
        }
    }

    /// Registered `(name, contract)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegisteredContract)> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name).map(|entry| (name.as_str(), entry)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
