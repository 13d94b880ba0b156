//! JSON inputs of the command line: run settings and model descriptions.

use anyhow::{Context, Result};
use eqdif_core::equation_engine::parse_equation;
use eqdif_core::launcher::LauncherSettings;
use eqdif_core::solvers::IntegrationMethod;
use eqdif_core::system::{EquationSystem, Range};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Settings of a `run`, usually read from `--config` and then overridden by
/// command line flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub launcher: LauncherSettings,
    pub method: Option<IntegrationMethod>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!("Loaded run config {:?} from {}", config, path.display());
        Ok(config)
    }
}

/// One variable of a model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(default)]
    pub initial: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Right-hand side of the derivative, e.g. `0.9*prey - 0.2*prey*predator`.
    pub equation: String,
}

/// A user-provided equation system:
///
/// ```json
/// { "variables": [
///     { "name": "prey", "initial": 15, "equation": "0.9*prey - 0.2*prey*predator" },
///     { "name": "predator", "initial": 1, "equation": "0.2*prey*predator - 0.5*predator" }
/// ] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub variables: Vec<VariableSpec>,
}

impl ModelFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse model file {}", path.display()))
    }

    /// Resolves the equations against the variable names and validates the
    /// resulting system. Missing bounds default to `[0, f64::MAX]`.
    pub fn into_system(self) -> Result<EquationSystem> {
        let names: Vec<String> = self.variables.iter().map(|v| v.name.clone()).collect();
        let default_range = Range::positive();

        let mut initial_values = Vec::with_capacity(names.len());
        let mut ranges = Vec::with_capacity(names.len());
        let mut equations = Vec::with_capacity(names.len());
        for variable in &self.variables {
            initial_values.push(variable.initial);
            ranges.push(Range::new(
                variable.min.unwrap_or(default_range.min),
                variable.max.unwrap_or(default_range.max),
            ));
            let equation = parse_equation(&variable.equation, &names)
                .with_context(|| format!("Invalid equation for variable '{}'", variable.name))?;
            equations.push(equation);
        }

        Ok(EquationSystem::from_parts(
            names,
            initial_values,
            ranges,
            equations,
        )?)
    }
}
