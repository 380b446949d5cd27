// Fitted kernel density model over a geometry's feature space

use crate::bandwidth::{validate_scaling, Bandwidth, BandwidthMethod, BandwidthSelector};
use crate::error::{Error, Result};
use crate::geometry::GeometryModel;
use crate::particle::ParticleRecord;
use crate::particle_list::{ParticleList, ALL};
use crate::stats::{effective_sample_size, log_sum_exp, standard_normal_logpdf};
use log::info;

/// Kernel family tag written to model descriptors
pub const GAUSSIAN_KERNEL: &str = "gaussian";

/// Options of [`DensityModel::fit`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitConfig {
    pub method: BandwidthMethod,
    /// Explicit scaling vector; computed from the weighted feature spread when unset
    pub scaling: Option<Vec<f64>>,
    /// Per-dimension importance dividing the computed spread
    pub importance: Option<Vec<f64>>,
    /// Keep only the first `n` training records
    pub max_training: Option<usize>,
    /// Override of `Config::cv_max_points` for MLCV
    pub cv_max_points: Option<usize>,
}

impl FitConfig {
    pub fn new(method: BandwidthMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn with_scaling(mut self, scaling: Vec<f64>) -> Self {
        self.scaling = Some(scaling);
        self
    }

    pub fn with_importance(mut self, importance: Vec<f64>) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_max_training(mut self, n: usize) -> Self {
        self.max_training = Some(n);
        self
    }

    pub fn with_cv_max_points(mut self, n: usize) -> Self {
        self.cv_max_points = Some(n);
        self
    }

    fn selector(&self) -> BandwidthSelector {
        match self.cv_max_points {
            Some(n) => BandwidthSelector::new(n),
            None => BandwidthSelector::default(),
        }
    }
}

/// Weighted Gaussian product-kernel density estimate.
///
/// Training point `i` carries a kernel with standard deviation
/// `bandwidth.factor(i, d) * scaling[d]` along feature dimension `d`. The
/// model is read-only after fitting apart from [`DensityModel::refit_bandwidth`],
/// so one instance can be shared by any number of samplers.
#[derive(Debug)]
pub struct DensityModel {
    geometry: GeometryModel,
    records: Vec<ParticleRecord>,
    features: Vec<f64>,
    weights: Vec<f64>,
    cumulative: Vec<f64>,
    scaling: Vec<f64>,
    bandwidth: Bandwidth,
    method: BandwidthMethod,
}

fn cumulative_weights(weights: &[f64]) -> Vec<f64> {
    weights
        .iter()
        .scan(0.0, |acc, &w| {
            *acc += w;
            Some(*acc)
        })
        .collect()
}

impl DensityModel {
    /// Fit a model to `list`. The list is not modified.
    pub fn fit(list: &ParticleList, geometry: GeometryModel, config: FitConfig) -> Result<Self> {
        let n = config.max_training.map(|n| n.min(list.len()) as isize).unwrap_or(ALL);
        let records = list.get(n)?.to_vec();
        if records.is_empty() {
            return Err(Error::InsufficientData(
                "cannot fit a density model to an empty particle list".to_string(),
            ));
        }
        let weights: Vec<f64> = records.iter().map(|p| p.weight).collect();
        if !(weights.iter().sum::<f64>() > 0.0) {
            return Err(Error::InsufficientData(
                "training particles have zero total weight".to_string(),
            ));
        }

        let dim = geometry.dimension();
        let scaling = match &config.scaling {
            Some(scaling) => scaling.clone(),
            None => {
                let std = geometry.weighted_std(&records, &weights)?;
                match &config.importance {
                    Some(importance) => divide_by_importance(&std, importance)?,
                    None => std,
                }
            }
        };

        let features = geometry.feature_matrix(&records);
        let bandwidth = config
            .selector()
            .select(&config.method, &features, dim, &weights, &scaling)?;

        let model = Self {
            cumulative: cumulative_weights(&weights),
            geometry,
            records,
            features,
            weights,
            scaling,
            bandwidth,
            method: config.method,
        };
        info!(
            "fitted {}-dimensional KDE on {} particles (N_eff = {:.1}) with {} bandwidth {}",
            dim,
            model.len(),
            model.effective_size(),
            model.method.tag(),
            model.bandwidth
        );
        Ok(model)
    }

    /// Rebuild a model from stored parts without re-running bandwidth selection
    pub fn from_parts(
        geometry: GeometryModel,
        list: ParticleList,
        scaling: Vec<f64>,
        bandwidth: Bandwidth,
        method: BandwidthMethod,
    ) -> Result<Self> {
        let dim = geometry.dimension();
        let records = list.records().to_vec();
        if records.is_empty() {
            return Err(Error::InsufficientData(
                "density model has no training particles".to_string(),
            ));
        }
        if scaling.len() != dim {
            return Err(Error::ConfigurationMismatch(format!(
                "geometry has {} dimensions but the scaling vector has {} entries",
                dim,
                scaling.len()
            )));
        }
        bandwidth
            .check_shape(dim, records.len())
            .map_err(Error::ConfigurationMismatch)?;

        let features = geometry.feature_matrix(&records);
        validate_scaling(&scaling, &features, dim)?;
        bandwidth.validate(dim, records.len())?;

        let weights: Vec<f64> = records.iter().map(|p| p.weight).collect();
        if !(weights.iter().sum::<f64>() > 0.0) {
            return Err(Error::InsufficientData(
                "training particles have zero total weight".to_string(),
            ));
        }
        Ok(Self {
            cumulative: cumulative_weights(&weights),
            geometry,
            records,
            features,
            weights,
            scaling,
            bandwidth,
            method,
        })
    }

    /// Re-estimate the bandwidth on the stored training sample
    pub fn refit_bandwidth(&mut self, method: BandwidthMethod) -> Result<()> {
        self.bandwidth = BandwidthSelector::default().select(
            &method,
            &self.features,
            self.dimension(),
            &self.weights,
            &self.scaling,
        )?;
        self.method = method;
        info!("re-estimated {} bandwidth: {}", self.method.tag(), self.bandwidth);
        Ok(())
    }

    pub fn geometry(&self) -> &GeometryModel {
        &self.geometry
    }

    pub fn dimension(&self) -> usize {
        self.geometry.dimension()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ParticleRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> &ParticleRecord {
        &self.records[index]
    }

    /// Feature vector of training point `index`
    pub fn features(&self, index: usize) -> &[f64] {
        let dim = self.dimension();
        &self.features[index * dim..(index + 1) * dim]
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn total_weight(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    pub fn effective_size(&self) -> f64 {
        effective_sample_size(self.weights.iter().copied())
    }

    pub fn scaling(&self) -> &[f64] {
        &self.scaling
    }

    pub fn bandwidth(&self) -> &Bandwidth {
        &self.bandwidth
    }

    pub fn method(&self) -> &BandwidthMethod {
        &self.method
    }

    pub fn kernel(&self) -> &'static str {
        GAUSSIAN_KERNEL
    }

    /// Index of the training point covering fraction `u ∈ [0, 1)` of the
    /// cumulative weight: the first `i` with `cum[i] > u · total`. Zero-weight
    /// points are never selected and equal `u` always gives the same index.
    #[inline]
    pub fn select_index(&self, u: f64) -> usize {
        self.index_at_weight(u * self.total_weight())
    }

    /// Index of the first training point whose cumulative weight exceeds
    /// `target`, clamped to the last point with positive weight
    #[inline]
    pub fn index_at_weight(&self, target: f64) -> usize {
        let last = self.cumulative.partition_point(|&c| c < self.total_weight());
        self.cumulative.partition_point(|&c| c <= target).min(last)
    }

    /// Kernel standard deviation of training point `index`, per dimension
    pub fn kernel_std(&self, index: usize) -> Vec<f64> {
        self.scaling
            .iter()
            .enumerate()
            .map(|(d, s)| self.bandwidth.factor(index, d) * s)
            .collect()
    }

    /// Log-density of a particle's feature vector
    pub fn log_density(&self, record: &ParticleRecord) -> f64 {
        self.log_density_features(&self.geometry.features(record))
    }

    /// Normalized log-density in feature space (no Jacobian of the variable
    /// transforms is applied)
    pub fn log_density_features(&self, x: &[f64]) -> f64 {
        let dim = self.dimension();
        let terms = (0..self.len()).filter(|&i| self.weights[i] > 0.0).map(|i| {
            let xi = self.features(i);
            let log_kernel: f64 = (0..dim)
                .map(|d| {
                    let sigma = self.bandwidth.factor(i, d) * self.scaling[d];
                    standard_normal_logpdf((x[d] - xi[d]) / sigma) - sigma.ln()
                })
                .sum();
            self.weights[i].ln() + log_kernel
        });
        log_sum_exp(terms) - self.total_weight().ln()
    }
}

fn divide_by_importance(std: &[f64], importance: &[f64]) -> Result<Vec<f64>> {
    if importance.len() != std.len() {
        return Err(Error::Configuration(format!(
            "importance has {} entries for {} dimensions",
            importance.len(),
            std.len()
        )));
    }
    if let Some(bad) = importance.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        return Err(Error::Configuration(format!(
            "importance entries must be finite and > 0, got {}",
            bad
        )));
    }
    Ok(std.iter().zip(importance).map(|(s, v)| s / v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Direction, Energy, Position};
    use approx::assert_relative_eq;

    fn line_of_particles(n: usize) -> ParticleList {
        let records = (0..n)
            .map(|i| {
                ParticleRecord::new([i as f64, 0.0, 0.0], [0.0, 0.0, 1.0], 1e6 + 1e3 * i as f64)
                    .with_weight(1.0 + (i % 3) as f64)
            })
            .collect();
        ParticleList::new(records).unwrap()
    }

    fn energy_only() -> GeometryModel {
        GeometryModel::new(vec![Box::new(Energy::new())]).unwrap()
    }

    #[test]
    fn test_fit_does_not_mutate_list() {
        let list = line_of_particles(20);
        let before = list.clone();
        let model = DensityModel::fit(&list, energy_only(), FitConfig::default()).unwrap();
        assert_eq!(list, before);
        assert_eq!(model.len(), 20);
        assert_eq!(model.kernel(), "gaussian");
        assert!(matches!(model.bandwidth(), Bandwidth::Scalar(_)));
    }

    #[test]
    fn test_max_training_bounds_cache() {
        let list = line_of_particles(50);
        let model = DensityModel::fit(
            &list,
            energy_only(),
            FitConfig::default().with_max_training(10),
        )
        .unwrap();
        assert_eq!(model.len(), 10);
        assert_eq!(model.record(9), &list.records()[9]);
    }

    #[test]
    fn test_constant_variable_rejected() {
        // Every particle sits at y = z = 0
        let list = line_of_particles(10);
        let geometry = GeometryModel::new(vec![Box::new(Position::cartesian())]).unwrap();
        let err = DensityModel::fit(&list, geometry, FitConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidBandwidth(_)));
    }

    #[test]
    fn test_importance_divides_scaling() {
        let list = line_of_particles(10);
        let plain = DensityModel::fit(&list, energy_only(), FitConfig::default()).unwrap();
        let weighted = DensityModel::fit(
            &list,
            energy_only(),
            FitConfig::default().with_importance(vec![2.0]),
        )
        .unwrap();
        assert_relative_eq!(weighted.scaling()[0], plain.scaling()[0] / 2.0);

        let err = DensityModel::fit(
            &list,
            energy_only(),
            FitConfig::default().with_importance(vec![1.0, 1.0]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_select_index_follows_cumulative_weight() {
        let records = [1.0, 0.0, 3.0]
            .iter()
            .map(|&w| ParticleRecord::default().with_weight(w))
            .collect();
        let list = ParticleList::new(records).unwrap();
        let model = DensityModel::fit(
            &list,
            energy_only(),
            FitConfig::default().with_scaling(vec![1.0]),
        )
        .unwrap();
        assert_eq!(model.select_index(0.0), 0);
        assert_eq!(model.select_index(0.2499), 0);
        // Boundary belongs to the next positive-weight point, skipping index 1
        assert_eq!(model.select_index(0.25), 2);
        assert_eq!(model.select_index(0.999_999), 2);
    }

    #[test]
    fn test_select_index_at_upper_edge_skips_trailing_zero_weight() {
        let records = [1.0, 2.0, 0.0, 0.0]
            .iter()
            .map(|&w| ParticleRecord::default().with_weight(w))
            .collect();
        let list = ParticleList::new(records).unwrap();
        let model = DensityModel::fit(
            &list,
            energy_only(),
            FitConfig::default().with_scaling(vec![1.0]),
        )
        .unwrap();
        assert_eq!(model.select_index(1.0), 1);
        assert_eq!(model.index_at_weight(model.total_weight()), 1);
        assert_eq!(model.index_at_weight(1e9), 1);
    }

    #[test]
    fn test_log_density_single_kernel() {
        let records = vec![
            ParticleRecord::new([0.0; 3], [0.0, 0.0, 1.0], 2.0),
            ParticleRecord::new([0.0; 3], [0.0, 0.0, 1.0], 4.0),
        ];
        let list = ParticleList::new(records).unwrap();
        let model = DensityModel::fit(
            &list,
            energy_only(),
            FitConfig::new(BandwidthMethod::Fixed(Bandwidth::Scalar(0.5))).with_scaling(vec![2.0]),
        )
        .unwrap();
        assert_eq!(model.kernel_std(0), vec![1.0]);

        // Equal mixture of N(2, 1) and N(4, 1) evaluated at 3
        let expected = standard_normal_logpdf(1.0);
        assert_relative_eq!(model.log_density_features(&[3.0]), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_refit_bandwidth_in_place() {
        let list = line_of_particles(30);
        let geometry = GeometryModel::new(vec![
            Box::new(Energy::log()),
            Box::new(Direction::cosine()),
        ])
        .unwrap();
        let fixed = vec![1.0, 0.5, 0.5];
        let mut model =
            DensityModel::fit(&list, geometry, FitConfig::default().with_scaling(fixed)).unwrap();
        model
            .refit_bandwidth(BandwidthMethod::Fixed(Bandwidth::PerDimension(vec![0.1, 0.2, 0.3])))
            .unwrap();
        assert_eq!(model.method().tag(), "fixed");
        assert_relative_eq!(model.kernel_std(4)[2], 0.15);
    }

    #[test]
    fn test_from_parts_dimension_mismatch() {
        let list = line_of_particles(5);
        let err = DensityModel::from_parts(
            energy_only(),
            list,
            vec![1.0, 1.0],
            Bandwidth::Scalar(0.3),
            BandwidthMethod::Silverman,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigurationMismatch(_)));
    }
}
