//! Geometry constraints applied to a candidate before it reaches the oracle.

use serde::{Deserialize, Serialize};
use tt_types::{ConfigError, PhysicalParameters};

use crate::space::ParameterSpace;

/// Endcap thickness: either a searched parameter or a fixed model value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndcapThickness {
    Fixed(f64),
    Parameter(String),
}

impl Default for EndcapThickness {
    fn default() -> Self {
        Self::Fixed(0.0)
    }
}

fn default_sphere_factor() -> f64 {
    20.0
}

/// Keeps the rod assembly inside the simulation sphere.
///
/// The electrodes are bounded by a cylinder of radius `spacing/2 + rod_radius`
/// and height `length + 2*(endcap_offset + endcap_thickness)`. Its corner must
/// lie within a sphere of radius `sphere_factor * rod_radius`. Otherwise the
/// spacing, length and endcap offset are scaled by the ratio of the sphere
/// radius to the corner distance. Rod radius is never changed, and scaled
/// values may end up below their search bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InscribedCylinder {
    pub spacing: String,
    pub rod_radius: String,
    pub length: String,
    pub endcap_offset: String,
    #[serde(default)]
    pub endcap_thickness: EndcapThickness,
    #[serde(default = "default_sphere_factor")]
    pub sphere_factor: f64,
}

impl InscribedCylinder {
    /// The rod-trap layout with the conventional parameter names.
    pub fn rod_trap() -> Self {
        Self {
            spacing: "rod_spacing".to_string(),
            rod_radius: "rod_radius".to_string(),
            length: "rod_length".to_string(),
            endcap_offset: "endcap_offset".to_string(),
            endcap_thickness: EndcapThickness::default(),
            sphere_factor: default_sphere_factor(),
        }
    }

    pub fn validate(&self, space: &ParameterSpace) -> Result<(), ConfigError> {
        let mut names = vec![
            &self.spacing,
            &self.rod_radius,
            &self.length,
            &self.endcap_offset,
        ];
        if let EndcapThickness::Parameter(name) = &self.endcap_thickness {
            names.push(name);
        }
        for name in names {
            if space.get(name).is_none() {
                return Err(ConfigError::UnknownParameter {
                    name: name.clone(),
                    context: "inscribed cylinder constraint".to_string(),
                });
            }
        }
        if !(self.sphere_factor.is_finite() && self.sphere_factor > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "sphere_factor".to_string(),
                message: format!("must be positive, got {}", self.sphere_factor),
            });
        }
        Ok(())
    }

    /// Scale the geometry into the sphere if needed. Returns whether any
    /// value was changed.
    pub fn apply(&self, params: &mut PhysicalParameters) -> bool {
        let value = |name: &str| params.get(name).unwrap_or(0.0);
        let spacing = value(&self.spacing);
        let rod_radius = value(&self.rod_radius);
        let length = value(&self.length);
        let endcap_offset = value(&self.endcap_offset);
        let endcap_thickness = match &self.endcap_thickness {
            EndcapThickness::Fixed(t) => *t,
            EndcapThickness::Parameter(name) => value(name),
        };

        let cylinder_radius = spacing / 2.0 + rod_radius;
        let half_height = (length + 2.0 * (endcap_offset + endcap_thickness)) / 2.0;
        let sphere_radius = self.sphere_factor * rod_radius;

        let corner_sq = half_height * half_height + cylinder_radius * cylinder_radius;
        let sphere_sq = sphere_radius * sphere_radius;
        if corner_sq <= sphere_sq || sphere_sq <= 0.0 {
            return false;
        }

        let scale = (sphere_radius / corner_sq.sqrt()).min(1.0);
        for name in [&self.spacing, &self.length, &self.endcap_offset] {
            if let Some(v) = params.get_mut(name) {
                *v *= scale;
            }
        }
        true
    }
}
