use super::{check_bounds, Variable, VariableSpec};
use crate::error::{Error, Result};
use crate::particle::ParticleRecord;
use serde::{Deserialize, Serialize};

/// Which position components become features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionCoords {
    /// (x, y, z)
    #[default]
    Cartesian,
    /// (x, y); z is taken from the base record (plane source)
    Planar,
    /// (rho, z) around the z axis; the azimuth is taken from the base record
    RadialAxial,
}

impl PositionCoords {
    fn dimension(&self) -> usize {
        match self {
            PositionCoords::Cartesian => 3,
            PositionCoords::Planar | PositionCoords::RadialAxial => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub coords: PositionCoords,
    /// Optional accepted range per feature component, in cm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Vec<(f64, f64)>>,
}

impl Position {
    pub fn cartesian() -> Self {
        Self::default()
    }

    pub fn planar() -> Self {
        Self {
            coords: PositionCoords::Planar,
            bounds: None,
        }
    }

    pub fn radial_axial() -> Self {
        Self {
            coords: PositionCoords::RadialAxial,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, bounds: Vec<(f64, f64)>) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

impl Variable for Position {
    fn name(&self) -> &'static str {
        "position"
    }

    fn dimension(&self) -> usize {
        self.coords.dimension()
    }

    fn validate(&self) -> Result<()> {
        if let Some(bounds) = &self.bounds {
            if bounds.len() != self.dimension() {
                return Err(Error::Configuration(format!(
                    "position bounds need {} ranges, got {}",
                    self.dimension(),
                    bounds.len()
                )));
            }
            for (i, &(low, high)) in bounds.iter().enumerate() {
                if !(low.is_finite() && high.is_finite() && low < high) {
                    return Err(Error::Configuration(format!(
                        "position bound {} must satisfy low < high, got ({}, {})",
                        i, low, high
                    )));
                }
            }
        }
        Ok(())
    }

    fn features(&self, record: &ParticleRecord, out: &mut [f64]) {
        let [x, y, z] = record.position;
        match self.coords {
            PositionCoords::Cartesian => out.copy_from_slice(&[x, y, z]),
            PositionCoords::Planar => out.copy_from_slice(&[x, y]),
            PositionCoords::RadialAxial => out.copy_from_slice(&[x.hypot(y), z]),
        }
    }

    fn reconstruct(&self, features: &[f64], record: &mut ParticleRecord) {
        match self.coords {
            PositionCoords::Cartesian => record.position.copy_from_slice(&features[..3]),
            PositionCoords::Planar => {
                record.position[0] = features[0];
                record.position[1] = features[1];
            }
            PositionCoords::RadialAxial => {
                let phi = record.position[1].atan2(record.position[0]);
                let rho = features[0];
                record.position = [rho * phi.cos(), rho * phi.sin(), features[1]];
            }
        }
    }

    fn accepts(&self, features: &[f64]) -> bool {
        if self.coords == PositionCoords::RadialAxial && features[0] < 0.0 {
            return false;
        }
        match &self.bounds {
            Some(bounds) => check_bounds(features, bounds),
            None => true,
        }
    }

    fn spec(&self) -> Option<VariableSpec> {
        Some(VariableSpec::Position(self.clone()))
    }
}
