// Bandwidth selection for the Gaussian product kernel.
//
// Bandwidths live in the scaled feature space: the kernel standard deviation
// of particle i along dimension d is `factor(i, d) * scaling[d]`.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::stats::{distinct_rows, effective_sample_size, log_sum_exp, standard_normal_logpdf};
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Search range of the MLCV multiplier applied to Silverman's bandwidth
const MLCV_FACTOR_RANGE: (f64, f64) = (0.1, 10.0);
/// Convergence tolerance on ln(multiplier)
const MLCV_TOLERANCE: f64 = 1e-3;
const MLCV_MAX_ITERATIONS: usize = 100;
/// Minimum distinct feature points for cross-validation
const MLCV_MIN_DISTINCT: usize = 3;

/// Smoothing factors in scaled feature units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bandwidth {
    /// Same factor for every dimension and particle
    Scalar(f64),
    /// One factor per feature dimension
    PerDimension(Vec<f64>),
    /// One factor per training particle (adaptive kernels)
    PerParticle(Vec<f64>),
}

impl Bandwidth {
    /// Factor applied to `scaling[dim]` for training particle `particle`
    #[inline]
    pub fn factor(&self, particle: usize, dim: usize) -> f64 {
        match self {
            Bandwidth::Scalar(h) => *h,
            Bandwidth::PerDimension(h) => h[dim],
            Bandwidth::PerParticle(h) => h[particle],
        }
    }

    fn values(&self) -> &[f64] {
        match self {
            Bandwidth::Scalar(h) => std::slice::from_ref(h),
            Bandwidth::PerDimension(h) | Bandwidth::PerParticle(h) => h,
        }
    }

    /// Length check against a `dim`-dimensional model with `n` training particles
    pub fn check_shape(&self, dim: usize, n: usize) -> std::result::Result<(), String> {
        match self {
            Bandwidth::Scalar(_) => Ok(()),
            Bandwidth::PerDimension(h) if h.len() != dim => Err(format!(
                "per-dimension bandwidth has {} entries for {} dimensions",
                h.len(),
                dim
            )),
            Bandwidth::PerParticle(h) if h.len() != n => Err(format!(
                "per-particle bandwidth has {} entries for {} particles",
                h.len(),
                n
            )),
            _ => Ok(()),
        }
    }

    /// Every factor strictly positive and finite, and the shape matches
    pub fn validate(&self, dim: usize, n: usize) -> Result<()> {
        self.check_shape(dim, n).map_err(Error::InvalidBandwidth)?;
        if let Some((i, h)) = self
            .values()
            .iter()
            .enumerate()
            .find(|(_, h)| !(h.is_finite() && **h > 0.0))
        {
            return Err(Error::InvalidBandwidth(format!(
                "bandwidth entry {} must be finite and > 0, got {}",
                i, h
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bandwidth::Scalar(h) => write!(f, "{:.6e}", h),
            Bandwidth::PerDimension(h) => write!(f, "{:.6?}", h),
            Bandwidth::PerParticle(h) => {
                let mean = h.iter().sum::<f64>() / h.len().max(1) as f64;
                write!(f, "adaptive ({} kernels, mean {:.6e})", h.len(), mean)
            }
        }
    }
}

/// How the bandwidth is obtained
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthMethod {
    /// Silverman's rule with the Kish effective sample size
    #[default]
    Silverman,
    /// Maximum-likelihood cross-validation of a Silverman multiplier
    Mlcv,
    /// Adaptive: distance to the k-th nearest neighbour in scaled space
    Knn { k: usize },
    /// User-supplied
    Fixed(Bandwidth),
}

impl BandwidthMethod {
    /// Parse the short method tags ("silv", "mlcv", "knn")
    pub fn from_str_option(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "silv" | "silverman" => Some(BandwidthMethod::Silverman),
            "mlcv" => Some(BandwidthMethod::Mlcv),
            "knn" => Some(BandwidthMethod::Knn {
                k: Config::global().knn_neighbors,
            }),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            BandwidthMethod::Silverman => "silv",
            BandwidthMethod::Mlcv => "mlcv",
            BandwidthMethod::Knn { .. } => "knn",
            BandwidthMethod::Fixed(_) => "fixed",
        }
    }
}

/// Silverman's factor `(4 / ((D + 2) N_eff))^(1 / (D + 4))`
pub fn silverman_factor(dim: usize, n_eff: f64) -> f64 {
    let d = dim as f64;
    (4.0 / ((d + 2.0) * n_eff)).powf(1.0 / (d + 4.0))
}

/// Check that every scaling entry is positive, finite and not negligible
/// against the magnitude of its feature column.
pub fn validate_scaling(scaling: &[f64], features: &[f64], dim: usize) -> Result<()> {
    if scaling.len() != dim {
        return Err(Error::Configuration(format!(
            "scaling has {} entries for {} dimensions",
            scaling.len(),
            dim
        )));
    }
    for (d, &s) in scaling.iter().enumerate() {
        let magnitude = features
            .iter()
            .skip(d)
            .step_by(dim.max(1))
            .fold(0.0f64, |m, x| m.max(x.abs()));
        if !(s.is_finite() && s > 0.0 && s > 1e-12 * magnitude) {
            return Err(Error::InvalidBandwidth(format!(
                "scaling of dimension {} is {} (constant or degenerate variable)",
                d, s
            )));
        }
    }
    Ok(())
}

/// Derives bandwidths from a scaled training sample
#[derive(Debug, Clone)]
pub struct BandwidthSelector {
    /// Training points used by cross-validation (thinned by stride above this)
    pub cv_max_points: usize,
}

impl Default for BandwidthSelector {
    fn default() -> Self {
        Self {
            cv_max_points: Config::global().cv_max_points,
        }
    }
}

impl BandwidthSelector {
    pub fn new(cv_max_points: usize) -> Self {
        Self { cv_max_points }
    }

    /// Compute a bandwidth for the row-major `n × dim` `features`.
    pub fn select(
        &self,
        method: &BandwidthMethod,
        features: &[f64],
        dim: usize,
        weights: &[f64],
        scaling: &[f64],
    ) -> Result<Bandwidth> {
        if dim == 0 || features.len() % dim != 0 {
            return Err(Error::Configuration(format!(
                "feature matrix of length {} is not a multiple of dimension {}",
                features.len(),
                dim
            )));
        }
        let n = features.len() / dim;
        if weights.len() != n {
            return Err(Error::Configuration(format!(
                "{} weights given for {} feature rows",
                weights.len(),
                n
            )));
        }
        validate_scaling(scaling, features, dim)?;

        let bandwidth = match method {
            BandwidthMethod::Silverman => Bandwidth::Scalar(silverman(dim, weights)?),
            BandwidthMethod::Mlcv => self.mlcv(features, dim, weights, scaling)?,
            BandwidthMethod::Knn { k } => knn(features, dim, scaling, *k)?,
            BandwidthMethod::Fixed(bw) => bw.clone(),
        };
        bandwidth.validate(dim, n)?;
        Ok(bandwidth)
    }

    fn mlcv(&self, features: &[f64], dim: usize, weights: &[f64], scaling: &[f64]) -> Result<Bandwidth> {
        let h_silv = silverman(dim, weights)?;

        let n = weights.len();
        let stride = n.div_ceil(self.cv_max_points.max(1)).max(1);
        let kept: Vec<usize> = (0..n).step_by(stride).filter(|&i| weights[i] > 0.0).collect();
        let z: Vec<f64> = kept
            .iter()
            .flat_map(|&i| (0..dim).map(move |d| features[i * dim + d] / scaling[d]))
            .collect();
        let w: Vec<f64> = kept.iter().map(|&i| weights[i]).collect();

        if distinct_rows(&z, dim) < MLCV_MIN_DISTINCT {
            warn!(
                "MLCV needs at least {} distinct points, falling back to Silverman's rule",
                MLCV_MIN_DISTINCT
            );
            return Ok(Bandwidth::Scalar(h_silv));
        }

        let objective = |t: f64| {
            let value = leave_one_out_log_likelihood(&z, dim, &w, h_silv * t.exp());
            if value.is_nan() {
                f64::NEG_INFINITY
            } else {
                value
            }
        };
        let (t_best, best) = golden_section_max(
            objective,
            MLCV_FACTOR_RANGE.0.ln(),
            MLCV_FACTOR_RANGE.1.ln(),
            MLCV_TOLERANCE,
            MLCV_MAX_ITERATIONS,
        );

        if !best.is_finite() {
            warn!("MLCV found no finite likelihood, falling back to Silverman's rule");
            return Ok(Bandwidth::Scalar(h_silv));
        }
        debug!(
            "MLCV multiplier {:.4} on {} points (log-likelihood {:.6})",
            t_best.exp(),
            w.len(),
            best
        );
        Ok(Bandwidth::Scalar(h_silv * t_best.exp()))
    }
}

/// Compute a bandwidth with the default selector
pub fn select(
    method: &BandwidthMethod,
    features: &[f64],
    dim: usize,
    weights: &[f64],
    scaling: &[f64],
) -> Result<Bandwidth> {
    BandwidthSelector::default().select(method, features, dim, weights, scaling)
}

fn silverman(dim: usize, weights: &[f64]) -> Result<f64> {
    let n_eff = effective_sample_size(weights.iter().copied());
    if !(n_eff > 0.0) {
        return Err(Error::InsufficientData(
            "Silverman's rule needs a positive total weight".to_string(),
        ));
    }
    Ok(silverman_factor(dim, n_eff))
}

/// Weighted mean leave-one-out log-density of the scaled points `z` under a
/// Gaussian kernel of width `h`
pub fn leave_one_out_log_likelihood(z: &[f64], dim: usize, weights: &[f64], h: f64) -> f64 {
    let n = weights.len();
    let total: f64 = weights.iter().sum();
    let log_h = h.ln();
    let inv_h = 1.0 / h;

    // Collected in order so the reduction is independent of thread scheduling
    let per_point: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            let xi = &z[i * dim..(i + 1) * dim];
            let terms = (0..n).filter(|&j| j != i && weights[j] > 0.0).map(|j| {
                let xj = &z[j * dim..(j + 1) * dim];
                let log_kernel: f64 = xi
                    .iter()
                    .zip(xj)
                    .map(|(a, b)| standard_normal_logpdf((a - b) * inv_h))
                    .sum();
                weights[j].ln() + log_kernel
            });
            let others = total - weights[i];
            weights[i] * (log_sum_exp(terms) - others.ln() - dim as f64 * log_h)
        })
        .collect();

    per_point.iter().sum::<f64>() / total
}

fn golden_section_max(
    f: impl Fn(f64) -> f64,
    mut a: f64,
    mut b: f64,
    tolerance: f64,
    max_iterations: usize,
) -> (f64, f64) {
    let inv_phi = (5.0f64.sqrt() - 1.0) / 2.0;
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    for _ in 0..max_iterations {
        if (b - a).abs() < tolerance {
            break;
        }
        if fc >= fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = f(d);
        }
    }

    if fc >= fd {
        (c, fc)
    } else {
        (d, fd)
    }
}

fn knn(features: &[f64], dim: usize, scaling: &[f64], k: usize) -> Result<Bandwidth> {
    let n = features.len() / dim;
    if k == 0 {
        return Err(Error::Configuration("KNN bandwidth needs k >= 1".to_string()));
    }
    if n < k + 1 {
        return Err(Error::InsufficientData(format!(
            "KNN bandwidth with k = {} needs at least {} points, got {}",
            k,
            k + 1,
            n
        )));
    }

    let z: Vec<f64> = features
        .chunks_exact(dim)
        .flat_map(|row| row.iter().zip(scaling).map(|(x, s)| x / s))
        .collect();

    let h = (0..n)
        .into_par_iter()
        .map(|i| {
            let xi = &z[i * dim..(i + 1) * dim];
            let mut dist: Vec<f64> = (0..n)
                .filter(|&j| j != i)
                .map(|j| {
                    z[j * dim..(j + 1) * dim]
                        .iter()
                        .zip(xi)
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum::<f64>()
                })
                .collect();
            let (_, kth, _) = dist.select_nth_unstable_by(k - 1, |a, b| a.total_cmp(b));
            let r = kth.sqrt();
            if r > 0.0 {
                Ok(r)
            } else {
                Err(Error::InvalidBandwidth(format!(
                    "particle {} has {} identical neighbours, KNN bandwidth is zero",
                    i, k
                )))
            }
        })
        .collect::<Result<Vec<f64>>>()?;

    Ok(Bandwidth::PerParticle(h))
}
