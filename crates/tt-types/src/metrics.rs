use serde::{Deserialize, Serialize};

use crate::errors::OracleError;

/// Trap figures of merit reported by the simulation oracle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrapMetrics {
    /// Trap depth in electron-volts.
    #[serde(rename = "depth_eV")]
    pub depth_ev: f64,
    /// Displacement of the potential minimum from the trap center, in mm.
    pub offset_mm: f64,
    /// Estimated RF drive power in mW.
    #[serde(rename = "P_est_mW")]
    pub power_mw: f64,
}

impl TrapMetrics {
    pub fn new(depth_ev: f64, offset_mm: f64, power_mw: f64) -> Self {
        Self {
            depth_ev,
            offset_mm,
            power_mw,
        }
    }

    /// Reject NaN or infinite metrics. A solver that produced no scalar is
    /// indistinguishable from a failed solve as far as scoring is concerned.
    pub fn ensure_finite(self) -> Result<Self, OracleError> {
        for (metric, value) in [
            ("depth_eV", self.depth_ev),
            ("offset_mm", self.offset_mm),
            ("P_est_mW", self.power_mw),
        ] {
            if !value.is_finite() {
                return Err(OracleError::NonFiniteMetric {
                    metric: metric.to_string(),
                    value,
                });
            }
        }
        Ok(self)
    }
}

/// Column names used wherever metrics are tabulated.
pub const METRIC_COLUMNS: [&str; 3] = ["depth_eV", "offset_mm", "P_est_mW"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_physics_names() {
        let metrics = TrapMetrics::new(6.0, 0.1, 950.0);
        let json = serde_json::to_value(metrics).unwrap();
        assert_eq!(json["depth_eV"], 6.0);
        assert_eq!(json["offset_mm"], 0.1);
        assert_eq!(json["P_est_mW"], 950.0);
    }

    #[test]
    fn non_finite_metrics_are_oracle_failures() {
        let metrics = TrapMetrics::new(6.0, f64::NAN, 950.0);
        match metrics.ensure_finite() {
            Err(OracleError::NonFiniteMetric { metric, .. }) => assert_eq!(metric, "offset_mm"),
            other => panic!("expected NonFiniteMetric, got {other:?}"),
        }
        assert!(TrapMetrics::new(6.0, 0.1, 950.0).ensure_finite().is_ok());
    }
}
