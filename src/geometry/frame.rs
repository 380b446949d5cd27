use crate::error::{Error, Result};
use crate::particle::ParticleRecord;
use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Serialized form of a [`Frame`]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameSpec {
    /// Origin of the local frame in global coordinates, cm
    #[serde(default)]
    pub translation: [f64; 3],
    /// Rotation vector (axis times angle in radians) taking local axes to global
    #[serde(default)]
    pub rotation: [f64; 3],
}

/// Local reference frame of a source geometry.
///
/// Features are computed in local coordinates: `x_local = Rᵀ (x - t)` and
/// `u_local = Rᵀ u`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    spec: FrameSpec,
    translation: Vector3<f64>,
    rotation: Rotation3<f64>,
}

impl Frame {
    pub fn new(translation: [f64; 3], rotation: [f64; 3]) -> Result<Self> {
        if translation.iter().chain(rotation.iter()).any(|x| !x.is_finite()) {
            return Err(Error::Configuration(format!(
                "frame translation {:?} and rotation {:?} must be finite",
                translation, rotation
            )));
        }
        Ok(Self {
            spec: FrameSpec {
                translation,
                rotation,
            },
            translation: Vector3::from(translation),
            rotation: Rotation3::from_scaled_axis(Vector3::from(rotation)),
        })
    }

    pub fn from_spec(spec: &FrameSpec) -> Result<Self> {
        Self::new(spec.translation, spec.rotation)
    }

    /// The exact inputs this frame was built from, so a reloaded frame is
    /// bit-identical
    pub fn spec(&self) -> FrameSpec {
        self.spec
    }

    /// Rotation vector recovered from the rotation matrix
    pub fn scaled_axis(&self) -> [f64; 3] {
        let axis = self.rotation.scaled_axis();
        [axis.x, axis.y, axis.z]
    }

    pub fn to_local(&self, record: &ParticleRecord) -> ParticleRecord {
        let inverse = self.rotation.inverse();
        let x = inverse * (Vector3::from(record.position) - self.translation);
        let u = inverse * Vector3::from(record.direction);
        ParticleRecord {
            position: [x.x, x.y, x.z],
            direction: [u.x, u.y, u.z],
            ..*record
        }
    }

    pub fn to_global(&self, record: &ParticleRecord) -> ParticleRecord {
        let x = self.rotation * Vector3::from(record.position) + self.translation;
        let u = self.rotation * Vector3::from(record.direction);
        ParticleRecord {
            position: [x.x, x.y, x.z],
            direction: [u.x, u.y, u.z],
            ..*record
        }
    }
}
