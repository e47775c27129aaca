//! Typed build-configuration assembly.
//!
//! [`ConfigBuilder`] is a pure mapping from flat parameter paths to the
//! nested [`BuildConfig`] shape: each logical account slot is sourced from
//! exactly one resolved path plus a fixed region, and each external
//! identifier passes through by name. Given the same resolved map the
//! builder always produces the same configuration.

use std::collections::{BTreeMap, BTreeSet};

use convoy_core::{AccountTarget, BuildConfig, Region, RemovalPolicy};

use crate::error::{Error, Result};

/// Declares one logical account slot.
#[derive(Debug, Clone)]
pub struct SlotSpec {
    /// Logical slot name (e.g. `backend`, `frontend`, `deployment`).
    pub slot: String,
    /// Parameter path holding the account identifier.
    pub path: String,
    /// Fixed region for this slot.
    pub region: Region,
}

impl SlotSpec {
    /// Creates a new slot spec.
    #[must_use]
    pub fn new(
        slot: impl Into<String>,
        path: impl Into<String>,
        region: impl Into<Region>,
    ) -> Self {
        Self {
            slot: slot.into(),
            path: path.into(),
            region: region.into(),
        }
    }
}

/// Declares one external resource identifier passed through by name.
#[derive(Debug, Clone)]
pub struct ExternalSpec {
    /// Name the value is exposed under in `BuildConfig`.
    pub name: String,
    /// Parameter path holding the value.
    pub path: String,
}

impl ExternalSpec {
    /// Creates a new external spec.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Assembles a [`BuildConfig`] from resolved parameters.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    stage: String,
    slots: Vec<SlotSpec>,
    externals: Vec<ExternalSpec>,
    removal_policy: RemovalPolicy,
}

impl ConfigBuilder {
    /// Creates a builder for the given deployment stage.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            slots: Vec::new(),
            externals: Vec::new(),
            removal_policy: RemovalPolicy::default(),
        }
    }

    /// Returns the deployment stage this builder targets.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Declares a logical account slot.
    #[must_use]
    pub fn slot(mut self, spec: SlotSpec) -> Self {
        self.slots.push(spec);
        self
    }

    /// Declares an external resource identifier.
    #[must_use]
    pub fn external(mut self, spec: ExternalSpec) -> Self {
        self.externals.push(spec);
        self
    }

    /// Sets the removal policy carried by the configuration.
    #[must_use]
    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    /// Returns every parameter path this builder needs resolved.
    #[must_use]
    pub fn required_paths(&self) -> BTreeSet<String> {
        self.slots
            .iter()
            .map(|s| s.path.clone())
            .chain(self.externals.iter().map(|e| e.path.clone()))
            .collect()
    }

    /// Builds the configuration from a fully resolved parameter map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigShape`] if any declared slot or external
    /// references a path absent from `resolved`. Callers are expected to
    /// have resolved [`Self::required_paths`] first, so hitting this is a
    /// declaration mismatch, not an unset parameter.
    pub fn build(&self, resolved: &BTreeMap<String, String>) -> Result<BuildConfig> {
        let mut accounts = BTreeMap::new();
        for spec in &self.slots {
            let account = resolved.get(&spec.path).ok_or_else(|| Error::ConfigShape {
                slot: spec.slot.clone(),
                path: spec.path.clone(),
            })?;
            accounts.insert(
                spec.slot.clone(),
                AccountTarget::new(account.clone(), spec.region.clone()),
            );
        }

        let mut external_parameters = BTreeMap::new();
        for spec in &self.externals {
            let value = resolved.get(&spec.path).ok_or_else(|| Error::ConfigShape {
                slot: spec.name.clone(),
                path: spec.path.clone(),
            })?;
            external_parameters.insert(spec.name.clone(), value.clone());
        }

        Ok(BuildConfig {
            stage: self.stage.clone(),
            accounts,
            external_parameters,
            removal_policy: self.removal_policy,
        })
    }
}
