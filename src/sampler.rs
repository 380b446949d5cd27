// Drawing new particles from a fitted density model

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fast_rng::RandomStream;
use crate::kde::DensityModel;
use crate::particle::ParticleRecord;
use log::debug;
use serde::{Deserialize, Serialize};

/// How training indices are chosen within one draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Independent weighted draws; duplicates are possible at any count
    #[default]
    WithReplacement,
    /// Systematic resampling: one uniform offset `u` per call, draw `j` takes
    /// the point at `(u + j) / count` of the cumulative weight. With equal
    /// weights and `count = m·K` every record is emitted exactly `m` times.
    Systematic,
}

impl SelectionPolicy {
    pub fn from_str_option(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "with_replacement" | "replacement" | "multinomial" => {
                Some(SelectionPolicy::WithReplacement)
            }
            "systematic" => Some(SelectionPolicy::Systematic),
            _ => None,
        }
    }
}

/// Stateless view of a model that emits particles.
///
/// All randomness comes from the caller's [`RandomStream`]; two draws with
/// identically seeded streams give identical sequences.
#[derive(Debug, Clone, Copy)]
pub struct Sampler<'m> {
    model: &'m DensityModel,
    policy: SelectionPolicy,
    max_attempts: usize,
}

impl<'m> Sampler<'m> {
    /// Sampler with the default policy and the configured retry budget
    pub fn new(model: &'m DensityModel) -> Self {
        Self::with_settings(
            model,
            SelectionPolicy::default(),
            Config::global().max_resample_attempts,
        )
    }

    /// Sampler built without reading the global configuration
    pub fn with_settings(model: &'m DensityModel, policy: SelectionPolicy, max_attempts: usize) -> Self {
        Self {
            model,
            policy,
            max_attempts,
        }
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Perturbation attempts per particle before a `Resampling` error
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn model(&self) -> &'m DensityModel {
        self.model
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Lazy sequence of exactly `count` particles
    pub fn draw<'s>(
        &self,
        count: isize,
        perturb: bool,
        stream: &'s mut RandomStream,
    ) -> Result<Draw<'m, 's>> {
        if count < 0 {
            return Err(Error::Configuration(format!(
                "draw count must be >= 0, got {}",
                count
            )));
        }
        if perturb && self.max_attempts == 0 {
            return Err(Error::Configuration(
                "perturbed sampling needs max_attempts >= 1".to_string(),
            ));
        }
        let count = count as usize;
        let offset = match self.policy {
            SelectionPolicy::Systematic if count > 0 => stream.uniform(),
            _ => 0.0,
        };
        Ok(Draw {
            sampler: *self,
            stream,
            perturb,
            count,
            position: 0,
            offset,
        })
    }

    /// Weighted index for a uniform variate `u ∈ [0, 1)`
    #[inline]
    pub fn select_index(&self, u: f64) -> usize {
        self.model.select_index(u)
    }

    /// Index of draw `position` out of `count` for a systematic offset `u`
    #[inline]
    pub fn select_systematic(&self, u: f64, position: usize, count: usize) -> usize {
        let target = (u + position as f64) * self.model.total_weight() / count as f64;
        self.model.index_at_weight(target)
    }

    /// Emit one particle around training point `index`.
    ///
    /// Exact mode copies the training record; perturbed mode adds Gaussian
    /// kernel noise and retries until the geometry and the reconstructed
    /// record are both physical.
    pub fn emit(&self, index: usize, perturb: bool, stream: &mut RandomStream) -> Result<ParticleRecord> {
        let base = self.model.record(index);
        if !perturb {
            return Ok(base.with_weight(1.0));
        }

        let geometry = self.model.geometry();
        let center = self.model.features(index);
        let sigma = self.model.kernel_std(index);
        let mut x = vec![0.0; center.len()];

        for attempt in 1..=self.max_attempts {
            for ((xd, cd), sd) in x.iter_mut().zip(center).zip(&sigma) {
                *xd = cd + sd * stream.normal();
            }
            if !geometry.accepts(&x) {
                debug!(
                    "perturbation {} of particle {} rejected by geometry",
                    attempt, index
                );
                continue;
            }
            let out = geometry.reconstruct(base, &x).with_weight(1.0);
            if out.is_physical() {
                return Ok(out);
            }
            debug!(
                "perturbation {} of particle {} is not physical (E = {:e})",
                attempt, index, out.energy
            );
        }

        Err(Error::Resampling(format!(
            "no physical particle after {} perturbation attempts around training particle {}",
            self.max_attempts, index
        )))
    }
}

/// Lazy, finite, non-restartable sequence of drawn particles
#[derive(Debug)]
pub struct Draw<'m, 's> {
    sampler: Sampler<'m>,
    stream: &'s mut RandomStream,
    perturb: bool,
    count: usize,
    position: usize,
    offset: f64,
}

impl<'m, 's> Draw<'m, 's> {
    pub fn remaining(&self) -> usize {
        self.count - self.position
    }
}

impl<'m, 's> Iterator for Draw<'m, 's> {
    type Item = Result<ParticleRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.count {
            return None;
        }
        let index = match self.sampler.policy {
            SelectionPolicy::WithReplacement => self.sampler.select_index(self.stream.uniform()),
            SelectionPolicy::Systematic => {
                self.sampler
                    .select_systematic(self.offset, self.position, self.count)
            }
        };
        self.position += 1;
        Some(self.sampler.emit(index, self.perturb, self.stream))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl<'m, 's> ExactSizeIterator for Draw<'m, 's> {}

/// Draw `count` particles with the default sampler settings
pub fn draw<'m, 's>(
    model: &'m DensityModel,
    count: isize,
    perturb: bool,
    stream: &'s mut RandomStream,
) -> Result<Draw<'m, 's>> {
    Sampler::new(model).draw(count, perturb, stream)
}
