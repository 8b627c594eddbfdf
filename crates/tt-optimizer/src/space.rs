//! Parameter space definition and normalization.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tt_types::{ConfigError, ParameterSpec, PhysicalParameters};

/// The full search space: an ordered list of bounded parameters.
///
/// Order matters. It fixes the coordinate order of the normalized search
/// vector, the order of [`PhysicalParameters`] handed to the oracle, and the
/// column order of the trial log.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSpace {
    pub parameters: Vec<ParameterSpec>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add(mut self, name: impl Into<String>, lower: f64, upper: f64) -> Self {
        self.parameters.push(ParameterSpec::new(name, lower, upper));
        self
    }

    pub fn dimension(&self) -> usize {
        self.parameters.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parameters.is_empty() {
            return Err(ConfigError::NoParameters);
        }
        let mut seen = HashSet::new();
        for spec in &self.parameters {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateParameter {
                    name: spec.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Map a normalized search vector to physical units.
    pub fn denormalize(&self, x: &[f64]) -> Result<PhysicalParameters, ConfigError> {
        denormalize(x, &self.parameters)
    }

    /// Map physical values back into [0, 1]. Parameters missing from
    /// `physical` sit at the center of their range.
    pub fn normalize(&self, physical: &PhysicalParameters) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|spec| physical.get(&spec.name).map_or(0.5, |v| spec.normalize(v)))
            .collect()
    }

    /// Normalized start point for the minimizer.
    pub fn start_point(&self, baseline: Option<&PhysicalParameters>) -> Vec<f64> {
        match baseline {
            Some(baseline) => self.normalize(baseline),
            None => vec![0.5; self.dimension()],
        }
    }

    /// Reject baseline entries that name parameters outside the space.
    pub fn check_baseline(&self, baseline: &PhysicalParameters) -> Result<(), ConfigError> {
        for (name, value) in baseline.iter() {
            if self.get(name).is_none() {
                return Err(ConfigError::UnknownParameter {
                    name: name.to_string(),
                    context: "baseline".to_string(),
                });
            }
            if !value.is_finite() {
                return Err(ConfigError::NonFinite {
                    field: format!("baseline.{name}"),
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Map each coordinate linearly onto `lo + x_i * (hi - lo)`.
///
/// Coordinates outside [0, 1] are clamped rather than rejected: the simplex
/// may step past the unit cube during reflection and expansion, and those
/// points must still be evaluable.
pub fn denormalize(x: &[f64], specs: &[ParameterSpec]) -> Result<PhysicalParameters, ConfigError> {
    if x.len() != specs.len() {
        return Err(ConfigError::DimensionMismatch {
            expected: specs.len(),
            actual: x.len(),
        });
    }
    Ok(specs
        .iter()
        .zip(x)
        .map(|(spec, &xi)| (spec.name.clone(), spec.denormalize(xi)))
        .collect())
}
