//! Run configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tt_types::{ConfigError, ObjectiveConfig, PhysicalParameters, TtResult};

use crate::constraint::InscribedCylinder;
use crate::simplex::Tolerance;
use crate::space::ParameterSpace;

fn default_max_iterations() -> usize {
    50
}

fn default_initial_step() -> f64 {
    0.05
}

fn default_tolerance() -> f64 {
    1e-9
}

/// Top-level configuration for an optimization run. Immutable once the run
/// starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    #[serde(default)]
    pub name: String,

    /// The parameter search space.
    pub parameters: ParameterSpace,

    /// Physical start point. Missing entries start mid-range.
    #[serde(default)]
    pub baseline: Option<PhysicalParameters>,

    #[serde(default)]
    pub objective: ObjectiveConfig,

    /// Iteration cap. Each iteration is exactly one oracle evaluation.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Convergence threshold on simplex size, in normalized units.
    #[serde(default = "default_tolerance")]
    pub x_tolerance: f64,

    /// Convergence threshold on objective spread across the simplex.
    #[serde(default = "default_tolerance")]
    pub f_tolerance: f64,

    /// Initial simplex edge length, in normalized units.
    #[serde(default = "default_initial_step")]
    pub initial_step: f64,

    /// Abort after this many oracle failures in a row. Unlimited when unset.
    #[serde(default)]
    pub max_consecutive_failures: Option<usize>,

    #[serde(default)]
    pub constraint: Option<InscribedCylinder>,
}

impl OptimizationConfig {
    pub fn new(name: impl Into<String>, parameters: ParameterSpace) -> Self {
        Self {
            name: name.into(),
            parameters,
            baseline: None,
            objective: ObjectiveConfig::default(),
            max_iterations: default_max_iterations(),
            x_tolerance: default_tolerance(),
            f_tolerance: default_tolerance(),
            initial_step: default_initial_step(),
            max_consecutive_failures: None,
            constraint: None,
        }
    }

    /// Load a JSON configuration file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> TtResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_objective(mut self, objective: ObjectiveConfig) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_baseline(mut self, baseline: PhysicalParameters) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn with_tolerances(mut self, x_tolerance: f64, f_tolerance: f64) -> Self {
        self.x_tolerance = x_tolerance;
        self.f_tolerance = f_tolerance;
        self
    }

    pub fn with_initial_step(mut self, step: f64) -> Self {
        self.initial_step = step;
        self
    }

    pub fn with_max_consecutive_failures(mut self, n: usize) -> Self {
        self.max_consecutive_failures = Some(n);
        self
    }

    pub fn with_constraint(mut self, constraint: InscribedCylinder) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn tolerance(&self) -> Tolerance {
        Tolerance {
            x: self.x_tolerance,
            f: self.f_tolerance,
        }
    }

    /// Check every setup invariant. Any error here is fatal before the first
    /// trial.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parameters.validate()?;
        if let Some(baseline) = &self.baseline {
            self.parameters.check_baseline(baseline)?;
        }
        self.objective.validate()?;

        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_iterations".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for (field, value) in [
            ("x_tolerance", self.x_tolerance),
            ("f_tolerance", self.f_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be a non-negative number, got {value}"),
                });
            }
        }
        if !(self.initial_step > 0.0 && self.initial_step <= 0.5) {
            return Err(ConfigError::InvalidValue {
                field: "initial_step".to_string(),
                message: format!("must be in (0, 0.5], got {}", self.initial_step),
            });
        }
        if self.max_consecutive_failures == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_consecutive_failures".to_string(),
                message: "must be at least 1 when set".to_string(),
            });
        }
        if let Some(constraint) = &self.constraint {
            constraint.validate(&self.parameters)?;
        }
        Ok(())
    }
}
