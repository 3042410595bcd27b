//! Runtime environment assembly for the code-execution sandbox.
//!
//! The sandbox itself is external; this only collects what to hand it:
//! packages to install and env vars to set for the active modules.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::modules::model::{EnvVarRequirement, Module, ModuleConfiguration};

/// Packages and env vars for a chat's enabled, configured modules.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEnv {
    /// De-duplicated, in module priority order.
    pub packages: Vec<String>,
    /// Requirement name to user value. BTreeMap for a stable wire shape.
    pub env: BTreeMap<String, String>,
}

impl RuntimeEnv {
    /// Merge one module's packages and filled-in requirement values.
    pub fn add_module(
        &mut self,
        module: &Module,
        requirements: &[EnvVarRequirement],
        configurations: &[ModuleConfiguration],
    ) {
        for package in &module.packages {
            if !self.packages.contains(package) {
                self.packages.push(package.clone());
            }
        }

        for requirement in requirements {
            let value = configurations
                .iter()
                .find(|c| c.requirement_id == requirement.id && !c.value.is_empty());
            if let Some(config) = value {
                self.env
                    .insert(requirement.name.clone(), config.value.clone());
            }
        }
    }
}
