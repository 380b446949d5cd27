use super::{check_bounds, Variable, VariableSpec};
use crate::error::{Error, Result};
use crate::particle::ParticleRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyScale {
    /// Feature is the energy itself
    #[default]
    Linear,
    /// Feature is ln(E); perturbed energies stay positive
    Log,
}

/// Kinetic energy as a single feature dimension
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Energy {
    #[serde(default)]
    pub scale: EnergyScale,
    /// Optional accepted energy range [low, high] in eV
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<(f64, f64)>,
}

impl Energy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log() -> Self {
        Self {
            scale: EnergyScale::Log,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, low: f64, high: f64) -> Self {
        self.bounds = Some((low, high));
        self
    }

    #[inline]
    fn energy_of(&self, feature: f64) -> f64 {
        match self.scale {
            EnergyScale::Linear => feature,
            EnergyScale::Log => feature.exp(),
        }
    }
}

impl Variable for Energy {
    fn name(&self) -> &'static str {
        "energy"
    }

    fn dimension(&self) -> usize {
        1
    }

    fn validate(&self) -> Result<()> {
        if let Some((low, high)) = self.bounds {
            if !(low.is_finite() && high.is_finite() && low >= 0.0 && low < high) {
                return Err(Error::Configuration(format!(
                    "energy bounds must satisfy 0 <= low < high, got ({}, {})",
                    low, high
                )));
            }
        }
        Ok(())
    }

    fn features(&self, record: &ParticleRecord, out: &mut [f64]) {
        out[0] = match self.scale {
            EnergyScale::Linear => record.energy,
            EnergyScale::Log => record.energy.ln(),
        };
    }

    fn reconstruct(&self, features: &[f64], record: &mut ParticleRecord) {
        record.energy = self.energy_of(features[0]);
    }

    fn accepts(&self, features: &[f64]) -> bool {
        let e = self.energy_of(features[0]);
        if !(e.is_finite() && e > 0.0) {
            return false;
        }
        match self.bounds {
            Some(bounds) => check_bounds(&[e], std::slice::from_ref(&bounds)),
            None => true,
        }
    }

    fn spec(&self) -> Option<VariableSpec> {
        Some(VariableSpec::Energy(self.clone()))
    }
}
