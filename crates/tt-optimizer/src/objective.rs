//! Scalar objective over trap metrics. Lower is better.

use serde::{Deserialize, Serialize};
use tt_types::{ObjectiveConfig, TrapMetrics};

/// Weighted contribution of each sub-term to a non-penalty score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub depth: f64,
    pub offset: f64,
    pub power: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.depth + self.offset + self.power
    }
}

/// Result of judging one set of metrics.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// Confining geometry; scored on the weighted sub-terms.
    Scored(ScoreBreakdown),
    /// Hard rejection, scored at the configured penalty.
    Unphysical { reason: String },
}

impl Assessment {
    pub fn score(&self, config: &ObjectiveConfig) -> f64 {
        match self {
            Self::Scored(breakdown) => breakdown.total(),
            Self::Unphysical { .. } => config.penalty,
        }
    }
}

/// Classify metrics as scorable or unphysical and compute the sub-terms.
pub fn assess(metrics: &TrapMetrics, config: &ObjectiveConfig) -> Assessment {
    if metrics.depth_ev < config.depth_floor_ev {
        return Assessment::Unphysical {
            reason: format!(
                "depth {} eV below floor {} eV",
                metrics.depth_ev, config.depth_floor_ev
            ),
        };
    }
    if let Some(ceiling) = config.offset_ceiling_mm {
        if metrics.offset_mm.abs() > ceiling {
            return Assessment::Unphysical {
                reason: format!(
                    "offset {} mm above ceiling {} mm",
                    metrics.offset_mm, ceiling
                ),
            };
        }
    }

    let weights = &config.weights;
    let depth_shortfall =
        (config.target_depth_ev - metrics.depth_ev).max(0.0) / config.target_depth_ev;
    let offset = metrics.offset_mm.abs() / config.offset_scale_mm;
    let power = (metrics.power_mw - config.target_power_mw).abs() / config.target_power_mw;

    Assessment::Scored(ScoreBreakdown {
        depth: weights.depth * depth_shortfall,
        offset: weights.offset * offset,
        power: weights.power * power,
    })
}

/// Score metrics against the objective configuration.
pub fn score(metrics: &TrapMetrics, config: &ObjectiveConfig) -> f64 {
    assess(metrics, config).score(config)
}
