use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tolerance on |direction| - 1 for a record to count as physical
pub const DIRECTION_NORM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParticleType {
    #[default]
    #[serde(rename = "neutron")]
    Neutron,
    #[serde(rename = "photon")]
    Photon,
    #[serde(rename = "electron")]
    Electron,
    #[serde(rename = "positron")]
    Positron,
}

impl ParticleType {
    pub fn from_str_option(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "neutron" | "n" => Some(ParticleType::Neutron),
            "photon" | "gamma" | "p" => Some(ParticleType::Photon),
            "electron" | "e" => Some(ParticleType::Electron),
            "positron" => Some(ParticleType::Positron),
            _ => None,
        }
    }
}

/// A single recorded particle state crossing a reference surface or volume.
///
/// Energies are in eV and positions in cm, matching the transport code that
/// consumes emitted particles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    pub position: [f64; 3],
    pub direction: [f64; 3],
    pub energy: f64,
    pub weight: f64,
    #[serde(default)]
    pub kind: ParticleType,
}

impl ParticleRecord {
    /// Create a unit-weight neutron record. The direction is normalized.
    pub fn new(position: [f64; 3], direction: [f64; 3], energy: f64) -> Self {
        Self {
            position,
            direction: normalize(direction),
            energy,
            weight: 1.0,
            kind: ParticleType::Neutron,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_kind(mut self, kind: ParticleType) -> Self {
        self.kind = kind;
        self
    }

    pub fn direction_norm(&self) -> f64 {
        let [u, v, w] = self.direction;
        (u * u + v * v + w * w).sqrt()
    }

    /// True when energy, direction and position describe a transportable particle
    pub fn is_physical(&self) -> bool {
        self.energy.is_finite()
            && self.energy > 0.0
            && self.position.iter().all(|x| x.is_finite())
            && (self.direction_norm() - 1.0).abs() <= DIRECTION_NORM_TOLERANCE
    }

    /// Check the record invariants, including a finite non-negative weight
    pub fn validate(&self) -> Result<()> {
        if !(self.weight.is_finite() && self.weight >= 0.0) {
            return Err(Error::Configuration(format!(
                "particle weight must be finite and >= 0, got {}",
                self.weight
            )));
        }
        if !(self.energy.is_finite() && self.energy > 0.0) {
            return Err(Error::Configuration(format!(
                "particle energy must be finite and > 0, got {}",
                self.energy
            )));
        }
        if self.position.iter().any(|x| !x.is_finite()) {
            return Err(Error::Configuration(format!(
                "particle position must be finite, got {:?}",
                self.position
            )));
        }
        let norm = self.direction_norm();
        if (norm - 1.0).abs() > DIRECTION_NORM_TOLERANCE {
            return Err(Error::Configuration(format!(
                "particle direction must be a unit vector, |u| = {}",
                norm
            )));
        }
        Ok(())
    }
}

impl Default for ParticleRecord {
    fn default() -> Self {
        // 1 MeV neutron at the origin travelling along +x
        Self::new([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1e6)
    }
}

pub(crate) fn normalize(v: [f64; 3]) -> [f64; 3] {
    let mag = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if mag == 0.0 || !mag.is_finite() {
        return v;
    }
    [v[0] / mag, v[1] / mag, v[2] / mag]
}
