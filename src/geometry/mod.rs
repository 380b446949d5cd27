// Phase-space geometry: which particle quantities become density-estimation
// variables and how they map to and from feature space.
pub mod direction;
pub mod energy;
pub mod frame;
pub mod position;

pub use direction::{Direction, DirectionParam};
pub use energy::{Energy, EnergyScale};
pub use frame::{Frame, FrameSpec};
pub use position::{Position, PositionCoords};

use crate::error::{Error, Result};
use crate::particle::ParticleRecord;
use crate::stats::column_std;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One block of the feature vector.
///
/// `features` followed by `reconstruct` on the same record must give the record
/// back within floating-point tolerance.
pub trait Variable: fmt::Debug + Send + Sync {
    /// Physical quantity this variable describes; unique within a geometry
    fn name(&self) -> &'static str;

    /// Number of feature components
    fn dimension(&self) -> usize;

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Write the features of `record` into `out` (`out.len() == dimension()`)
    fn features(&self, record: &ParticleRecord, out: &mut [f64]);

    /// Overwrite the quantities this variable owns in `record`, which arrives
    /// holding the base record's values
    fn reconstruct(&self, features: &[f64], record: &mut ParticleRecord);

    /// Whether a (perturbed) feature block describes a physical particle
    fn accepts(&self, _features: &[f64]) -> bool {
        true
    }

    /// Persistable description, `None` for variables that cannot be saved
    fn spec(&self) -> Option<VariableSpec> {
        None
    }
}

/// Serialized form of the built-in variable kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariableSpec {
    Energy(Energy),
    Position(Position),
    Direction(Direction),
}

impl VariableSpec {
    pub fn build(&self) -> Box<dyn Variable> {
        match self {
            VariableSpec::Energy(v) => Box::new(v.clone()),
            VariableSpec::Position(v) => Box::new(v.clone()),
            VariableSpec::Direction(v) => Box::new(v.clone()),
        }
    }
}

/// Serialized form of a [`GeometryModel`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometrySpec {
    pub variables: Vec<VariableSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<FrameSpec>,
}

pub(crate) fn check_bounds(values: &[f64], bounds: &[(f64, f64)]) -> bool {
    values
        .iter()
        .zip(bounds)
        .all(|(&x, &(low, high))| x >= low && x <= high)
}

/// Ordered list of variables spanning a `D`-dimensional feature space
#[derive(Debug)]
pub struct GeometryModel {
    variables: Vec<Box<dyn Variable>>,
    offsets: Vec<usize>,
    dimension: usize,
    frame: Option<Frame>,
}

impl GeometryModel {
    pub fn new(variables: Vec<Box<dyn Variable>>) -> Result<Self> {
        if variables.is_empty() {
            return Err(Error::Configuration(
                "a geometry needs at least one variable".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut offsets = Vec::with_capacity(variables.len());
        let mut dimension = 0;
        for var in &variables {
            var.validate()?;
            if var.dimension() == 0 {
                return Err(Error::Configuration(format!(
                    "variable '{}' has zero dimension",
                    var.name()
                )));
            }
            if !names.insert(var.name()) {
                return Err(Error::Configuration(format!(
                    "variable '{}' appears more than once",
                    var.name()
                )));
            }
            offsets.push(dimension);
            dimension += var.dimension();
        }

        Ok(Self {
            variables,
            offsets,
            dimension,
            frame: None,
        })
    }

    /// Build from persisted variable descriptions
    pub fn from_specs(specs: &[VariableSpec]) -> Result<Self> {
        Self::new(specs.iter().map(VariableSpec::build).collect())
    }

    pub fn from_spec(spec: &GeometrySpec) -> Result<Self> {
        let geometry = Self::from_specs(&spec.variables)?;
        match &spec.frame {
            Some(frame) => Ok(geometry.with_frame(Frame::from_spec(frame)?)),
            None => Ok(geometry),
        }
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn spec(&self) -> Result<GeometrySpec> {
        let variables = self
            .variables
            .iter()
            .map(|v| {
                v.spec().ok_or_else(|| {
                    Error::Configuration(format!(
                        "variable '{}' has no persistable description",
                        v.name()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(GeometrySpec {
            variables,
            frame: self.frame.as_ref().map(Frame::spec),
        })
    }

    /// Feature-space dimension `D`
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn variables(&self) -> &[Box<dyn Variable>] {
        &self.variables
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Feature-vector label per dimension, e.g. `direction[1]`
    pub fn labels(&self) -> Vec<String> {
        self.variables
            .iter()
            .flat_map(|v| {
                let name = v.name();
                let dim = v.dimension();
                (0..dim).map(move |i| {
                    if dim == 1 {
                        name.to_string()
                    } else {
                        format!("{}[{}]", name, i)
                    }
                })
            })
            .collect()
    }

    fn local(&self, record: &ParticleRecord) -> ParticleRecord {
        match &self.frame {
            Some(frame) => frame.to_local(record),
            None => *record,
        }
    }

    pub fn features_into(&self, record: &ParticleRecord, out: &mut [f64]) {
        let local = self.local(record);
        for (var, &offset) in self.variables.iter().zip(&self.offsets) {
            var.features(&local, &mut out[offset..offset + var.dimension()]);
        }
    }

    pub fn features(&self, record: &ParticleRecord) -> Vec<f64> {
        let mut out = vec![0.0; self.dimension];
        self.features_into(record, &mut out);
        out
    }

    /// Row-major `n × D` feature matrix
    pub fn feature_matrix(&self, records: &[ParticleRecord]) -> Vec<f64> {
        let mut rows = vec![0.0; records.len() * self.dimension];
        for (record, row) in records.iter().zip(rows.chunks_exact_mut(self.dimension.max(1))) {
            self.features_into(record, row);
        }
        rows
    }

    /// Record built from `base` with every variable overwritten from `features`
    pub fn reconstruct(&self, base: &ParticleRecord, features: &[f64]) -> ParticleRecord {
        let mut local = self.local(base);
        for (var, &offset) in self.variables.iter().zip(&self.offsets) {
            var.reconstruct(&features[offset..offset + var.dimension()], &mut local);
        }
        match &self.frame {
            Some(frame) => frame.to_global(&local),
            None => local,
        }
    }

    /// Whether every variable accepts its block of `features`
    pub fn accepts(&self, features: &[f64]) -> bool {
        self.variables
            .iter()
            .zip(&self.offsets)
            .all(|(var, &offset)| var.accepts(&features[offset..offset + var.dimension()]))
    }

    /// Per-dimension (population) standard deviation of the features of `records`
    pub fn std(&self, records: &[ParticleRecord]) -> Result<Vec<f64>> {
        self.checked_std(records, None)
    }

    /// Per-dimension weighted standard deviation
    pub fn weighted_std(&self, records: &[ParticleRecord], weights: &[f64]) -> Result<Vec<f64>> {
        if weights.len() != records.len() {
            return Err(Error::Configuration(format!(
                "{} weights given for {} records",
                weights.len(),
                records.len()
            )));
        }
        self.checked_std(records, Some(weights))
    }

    fn checked_std(&self, records: &[ParticleRecord], weights: Option<&[f64]>) -> Result<Vec<f64>> {
        if records.len() < 2 {
            return Err(Error::InsufficientData(format!(
                "standard deviation needs at least 2 records, got {}",
                records.len()
            )));
        }
        let rows = self.feature_matrix(records);
        Ok(column_std(&rows, self.dimension, weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn full_geometry() -> GeometryModel {
        GeometryModel::new(vec![
            Box::new(Energy::log()),
            Box::new(Position::cartesian()),
            Box::new(Direction::angles()),
        ])
        .unwrap()
    }

    #[test]
    fn test_dimension_is_sum_of_variables() {
        let geom = full_geometry();
        assert_eq!(geom.dimension(), 6);
        assert_eq!(
            geom.labels(),
            vec![
                "energy",
                "position[0]",
                "position[1]",
                "position[2]",
                "direction[0]",
                "direction[1]"
            ]
        );
    }

    #[test]
    fn test_empty_geometry_is_configuration_error() {
        let err = GeometryModel::new(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        let err = GeometryModel::new(vec![Box::new(Energy::new()), Box::new(Energy::log())])
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_round_trip_with_frame() {
        let geom = full_geometry()
            .with_frame(Frame::new([10.0, -5.0, 2.0], [0.3, -0.2, 1.1]).unwrap());
        let p = ParticleRecord::new([1.0, 2.0, 3.0], [0.2, -0.5, 0.7], 3.3e6).with_weight(0.25);
        let back = geom.reconstruct(&p, &geom.features(&p));
        for i in 0..3 {
            assert_abs_diff_eq!(back.position[i], p.position[i], epsilon = 1e-9);
            assert_abs_diff_eq!(back.direction[i], p.direction[i], epsilon = 1e-12);
        }
        assert_abs_diff_eq!(back.energy, p.energy, epsilon = 1e-6);
        assert_eq!(back.weight, 0.25);
    }

    #[test]
    fn test_std_requires_two_records() {
        let geom = GeometryModel::new(vec![Box::new(Energy::new())]).unwrap();
        let one = [ParticleRecord::default()];
        assert!(matches!(geom.std(&one), Err(Error::InsufficientData(_))));

        let records: Vec<ParticleRecord> = (0..10)
            .map(|i| ParticleRecord::new([0.0; 3], [1.0, 0.0, 0.0], 1e6 + i as f64))
            .collect();
        let std = geom.std(&records).unwrap();
        assert_abs_diff_eq!(std[0], 8.25f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_spec_round_trip() {
        let geom = full_geometry().with_frame(Frame::new([1.0, 0.0, 0.0], [0.0; 3]).unwrap());
        let spec = geom.spec().unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        let back: GeometrySpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
        let rebuilt = GeometryModel::from_spec(&back).unwrap();
        assert_eq!(rebuilt.dimension(), geom.dimension());
    }

    fn all_parametrizations() -> Vec<GeometryModel> {
        let mut out = Vec::new();
        for energy in [Energy::new(), Energy::log()] {
            for position in [Position::cartesian(), Position::planar(), Position::radial_axial()] {
                for direction in [Direction::angles(), Direction::cosine(), Direction::cartesian()] {
                    out.push(
                        GeometryModel::new(vec![
                            Box::new(energy.clone()),
                            Box::new(position.clone()),
                            Box::new(direction),
                        ])
                        .unwrap(),
                    );
                }
            }
        }
        out
    }

    proptest::proptest! {
        #[test]
        fn prop_features_then_reconstruct_is_identity(
            position in proptest::array::uniform3(-100.0f64..100.0),
            direction in proptest::array::uniform3(-1.0f64..1.0),
            log_energy in -5.0f64..17.0,
            translation in proptest::array::uniform3(-10.0f64..10.0),
            rotation in proptest::array::uniform3(-2.0f64..2.0),
        ) {
            let norm = direction.iter().map(|x| x * x).sum::<f64>().sqrt();
            proptest::prop_assume!(norm > 0.1);
            let p = ParticleRecord::new(position, direction, log_energy.exp());
            let frame = Frame::new(translation, rotation).unwrap();

            for geom in all_parametrizations() {
                let geom = geom.with_frame(frame.clone());
                let back = geom.reconstruct(&p, &geom.features(&p));
                for i in 0..3 {
                    proptest::prop_assert!((back.position[i] - p.position[i]).abs() < 1e-8);
                    proptest::prop_assert!((back.direction[i] - p.direction[i]).abs() < 1e-9);
                }
                proptest::prop_assert!((back.energy - p.energy).abs() <= 1e-12 * p.energy);
            }
            for geom in all_parametrizations() {
                let back = geom.reconstruct(&p, &geom.features(&p));
                proptest::prop_assert!((back.energy - p.energy).abs() <= 1e-12 * p.energy);
                proptest::prop_assert!(back.is_physical());
            }
        }
    }

    #[derive(Debug)]
    struct Weight;

    impl Variable for Weight {
        fn name(&self) -> &'static str {
            "weight"
        }
        fn dimension(&self) -> usize {
            1
        }
        fn features(&self, record: &ParticleRecord, out: &mut [f64]) {
            out[0] = record.weight;
        }
        fn reconstruct(&self, features: &[f64], record: &mut ParticleRecord) {
            record.weight = features[0];
        }
    }

    #[test]
    fn test_custom_variable_cannot_be_persisted() {
        let geom = GeometryModel::new(vec![Box::new(Energy::new()), Box::new(Weight)]).unwrap();
        assert_eq!(geom.dimension(), 2);
        assert!(matches!(geom.spec(), Err(Error::Configuration(_))));
    }
}
