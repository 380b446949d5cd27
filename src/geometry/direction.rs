use super::{Variable, VariableSpec};
use crate::particle::{normalize, ParticleRecord};
use serde::{Deserialize, Serialize};

/// Smallest |u| a perturbed Cartesian direction may have before it is
/// considered degenerate
const MIN_DIRECTION_NORM: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionParam {
    /// (theta, phi): polar angle from +z and azimuth, in radians
    #[default]
    Angles,
    /// (mu, phi): polar cosine and azimuth
    Cosine,
    /// (u, v, w), renormalized on reconstruction
    Cartesian,
}

/// Flight direction; every parametrization reconstructs a unit vector
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Direction {
    #[serde(default)]
    pub param: DirectionParam,
}

impl Direction {
    pub fn angles() -> Self {
        Self {
            param: DirectionParam::Angles,
        }
    }

    pub fn cosine() -> Self {
        Self {
            param: DirectionParam::Cosine,
        }
    }

    pub fn cartesian() -> Self {
        Self {
            param: DirectionParam::Cartesian,
        }
    }
}

impl Variable for Direction {
    fn name(&self) -> &'static str {
        "direction"
    }

    fn dimension(&self) -> usize {
        match self.param {
            DirectionParam::Angles | DirectionParam::Cosine => 2,
            DirectionParam::Cartesian => 3,
        }
    }

    fn features(&self, record: &ParticleRecord, out: &mut [f64]) {
        let [u, v, w] = record.direction;
        match self.param {
            DirectionParam::Angles => {
                out[0] = w.clamp(-1.0, 1.0).acos();
                out[1] = v.atan2(u);
            }
            DirectionParam::Cosine => {
                out[0] = w.clamp(-1.0, 1.0);
                out[1] = v.atan2(u);
            }
            DirectionParam::Cartesian => out.copy_from_slice(&[u, v, w]),
        }
    }

    fn reconstruct(&self, features: &[f64], record: &mut ParticleRecord) {
        record.direction = match self.param {
            DirectionParam::Angles => {
                let (sin_theta, cos_theta) = features[0].sin_cos();
                let (sin_phi, cos_phi) = features[1].sin_cos();
                [sin_theta * cos_phi, sin_theta * sin_phi, cos_theta]
            }
            DirectionParam::Cosine => {
                let mu = features[0].clamp(-1.0, 1.0);
                let sin_theta = (1.0 - mu * mu).max(0.0).sqrt();
                let (sin_phi, cos_phi) = features[1].sin_cos();
                [sin_theta * cos_phi, sin_theta * sin_phi, mu]
            }
            DirectionParam::Cartesian => normalize([features[0], features[1], features[2]]),
        };
    }

    fn accepts(&self, features: &[f64]) -> bool {
        match self.param {
            DirectionParam::Angles => features[0].is_finite() && features[1].is_finite(),
            DirectionParam::Cosine => features[0].abs() <= 1.0 && features[1].is_finite(),
            DirectionParam::Cartesian => {
                let norm = (features[0] * features[0]
                    + features[1] * features[1]
                    + features[2] * features[2])
                    .sqrt();
                norm.is_finite() && norm >= MIN_DIRECTION_NORM
            }
        }
    }

    fn spec(&self) -> Option<VariableSpec> {
        Some(VariableSpec::Direction(self.clone()))
    }
}
