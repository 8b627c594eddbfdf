//! Objective weighting and thresholds.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Relative priority of confinement, centering and drive efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    pub depth: f64,
    pub offset: f64,
    pub power: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            depth: 1.0,
            offset: 1.0,
            power: 1.0,
        }
    }
}

impl ObjectiveWeights {
    pub fn new(depth: f64, offset: f64, power: f64) -> Self {
        Self {
            depth,
            offset,
            power,
        }
    }
}

/// Targets, thresholds and weights that shape the scalar objective.
///
/// Magnitudes are empirical; the defaults reproduce the values the trap
/// design was originally tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveConfig {
    pub weights: ObjectiveWeights,
    /// Depth below this is penalized; excess depth is free.
    pub target_depth_ev: f64,
    /// Offset magnitude that counts as one unit of offset penalty.
    pub offset_scale_mm: f64,
    pub target_power_mw: f64,
    /// Anything shallower than this is treated as a non-confining geometry.
    pub depth_floor_ev: f64,
    /// Offsets larger than this are treated as unphysical when set.
    pub offset_ceiling_mm: Option<f64>,
    /// Score assigned to unphysical results and oracle failures.
    pub penalty: f64,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            weights: ObjectiveWeights::default(),
            target_depth_ev: 5.0,
            offset_scale_mm: 1.0,
            target_power_mw: 1000.0,
            depth_floor_ev: 1e-5,
            offset_ceiling_mm: None,
            penalty: 1e6,
        }
    }
}

impl ObjectiveConfig {
    pub fn with_weights(mut self, weights: ObjectiveWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_target_depth(mut self, depth_ev: f64) -> Self {
        self.target_depth_ev = depth_ev;
        self
    }

    pub fn with_target_power(mut self, power_mw: f64) -> Self {
        self.target_power_mw = power_mw;
        self
    }

    pub fn with_depth_floor(mut self, depth_ev: f64) -> Self {
        self.depth_floor_ev = depth_ev;
        self
    }

    pub fn with_offset_ceiling(mut self, offset_mm: f64) -> Self {
        self.offset_ceiling_mm = Some(offset_mm);
        self
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("weights.depth", self.weights.depth),
            ("weights.offset", self.weights.offset),
            ("weights.power", self.weights.power),
        ];
        for (field, value) in weights {
            finite(field, value)?;
            if value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("weight must be non-negative, got {value}"),
                });
            }
        }

        let scales = [
            ("target_depth_ev", self.target_depth_ev),
            ("offset_scale_mm", self.offset_scale_mm),
            ("target_power_mw", self.target_power_mw),
            ("penalty", self.penalty),
        ];
        for (field, value) in scales {
            finite(field, value)?;
            if value <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be positive, got {value}"),
                });
            }
        }

        finite("depth_floor_ev", self.depth_floor_ev)?;
        if let Some(ceiling) = self.offset_ceiling_mm {
            finite("offset_ceiling_mm", ceiling)?;
            if ceiling <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "offset_ceiling_mm".to_string(),
                    message: format!("must be positive, got {ceiling}"),
                });
            }
        }
        Ok(())
    }
}

fn finite(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite {
            field: field.to_string(),
            value,
        })
    }
}
