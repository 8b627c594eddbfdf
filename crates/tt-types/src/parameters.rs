//! Parameter bounds and physical parameter sets.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::errors::ConfigError;

/// A single tunable trap parameter with its physical bounds.
///
/// The minimizer works in the normalized domain [0, 1]; `lower` and `upper`
/// define the linear map back to physical units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name as understood by the oracle (e.g. "V_rf").
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
        }
    }

    /// Check the bounds invariant: both finite and `lower < upper`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        for (field, value) in [("lower", self.lower), ("upper", self.upper)] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite {
                    field: format!("{}.{}", self.name, field),
                    value,
                });
            }
        }
        if self.lower >= self.upper {
            return Err(ConfigError::InvalidBounds {
                name: self.name.clone(),
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }

    pub fn span(&self) -> f64 {
        self.upper - self.lower
    }

    /// Map a normalized coordinate to physical units. The coordinate is
    /// clamped to [0, 1] first, so the result always lies within bounds.
    pub fn denormalize(&self, x: f64) -> f64 {
        let t = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
        let value = self.lower + t * self.span();
        // Guard against rounding past the upper bound at t == 1.
        value.clamp(self.lower, self.upper)
    }

    /// Inverse of [`denormalize`](Self::denormalize), clamped to [0, 1].
    pub fn normalize(&self, value: f64) -> f64 {
        let t = (value - self.lower) / self.span();
        if t.is_nan() {
            0.0
        } else {
            t.clamp(0.0, 1.0)
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Ordered mapping from parameter name to physical value.
///
/// Order follows the parameter space, which is also the column order of the
/// trial log. Serializes as a JSON object with keys in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicalParameters {
    entries: Vec<(String, f64)>,
}

impl PhysicalParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    /// Insert or overwrite a value, keeping the original position on overwrite.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut f64> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, f64)> for PhysicalParameters {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

impl fmt::Display for PhysicalParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for PhysicalParameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PhysicalParameters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParamsVisitor;

        impl<'de> Visitor<'de> for ParamsVisitor {
            type Value = PhysicalParameters;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter names to numbers")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut params = PhysicalParameters::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, f64>()? {
                    params.insert(name, value);
                }
                Ok(params)
            }
        }

        deserializer.deserialize_map(ParamsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denormalize_maps_linearly() {
        let spec = ParameterSpec::new("V_rf", 0.0, 1000.0);
        assert_eq!(spec.denormalize(0.0), 0.0);
        assert_eq!(spec.denormalize(0.3), 300.0);
        assert_eq!(spec.denormalize(1.0), 1000.0);
    }

    #[test]
    fn denormalize_clamps_out_of_range() {
        let spec = ParameterSpec::new("f", 1e6, 1e8);
        assert_eq!(spec.denormalize(-0.2), 1e6);
        assert_eq!(spec.denormalize(1.7), 1e8);
        assert_eq!(spec.denormalize(f64::NAN), 1e6);
    }

    #[test]
    fn normalize_is_clamped_inverse() {
        let spec = ParameterSpec::new("V_dc", 0.0, 500.0);
        assert!((spec.normalize(50.0) - 0.1).abs() < 1e-12);
        assert_eq!(spec.normalize(-10.0), 0.0);
        assert_eq!(spec.normalize(900.0), 1.0);
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let spec = ParameterSpec::new("rod_radius", 0.004, 0.002);
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::InvalidBounds { .. })
        ));

        let equal = ParameterSpec::new("umax", 1.0, 1.0);
        assert!(equal.validate().is_err());

        let infinite = ParameterSpec::new("f", 0.0, f64::INFINITY);
        assert!(matches!(
            infinite.validate(),
            Err(ConfigError::NonFinite { .. })
        ));
    }

    #[test]
    fn physical_parameters_preserve_order_in_json() {
        let mut params = PhysicalParameters::new();
        params.insert("V_rf", 300.0);
        params.insert("V_dc", 50.0);
        params.insert("f", 1e7);

        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"V_rf":300.0,"V_dc":50.0,"f":10000000.0}"#);

        let back: PhysicalParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back.names().collect::<Vec<_>>(), vec!["V_rf", "V_dc", "f"]);
    }

    #[test]
    fn insert_overwrites_in_place() {
        let mut params = PhysicalParameters::new();
        params.insert("a", 1.0);
        params.insert("b", 2.0);
        params.insert("a", 3.0);
        assert_eq!(params.len(), 2);
        assert_eq!(params.iter().next(), Some(("a", 3.0)));
    }
}
