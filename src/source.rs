use crate::config::Config;
use crate::error::Result;
use crate::fast_rng::{RandomStream, StreamKind};
use crate::kde::DensityModel;
use crate::particle::ParticleRecord;
use crate::sampler::{Sampler, SelectionPolicy};
use log::debug;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// Particle source backed by a fitted density model.
///
/// The model is shared read-only; every emitted particle gets its own
/// [`RandomStream`] derived from the master seed and its particle id, so a
/// batch gives the same particles regardless of thread count.
#[derive(Debug, Clone)]
pub struct KernelDensitySource {
    pub model: Arc<DensityModel>,
    /// Add kernel noise (true) or re-emit training particles exactly (false)
    pub perturb: bool,
    pub policy: SelectionPolicy,
    pub max_attempts: usize,
}

impl KernelDensitySource {
    pub fn new(model: Arc<DensityModel>) -> Self {
        Self {
            model,
            perturb: true,
            policy: SelectionPolicy::default(),
            max_attempts: Config::global().max_resample_attempts,
        }
    }

    /// Source reading a saved model descriptor
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Arc::new(DensityModel::load(path)?)))
    }

    pub fn with_perturb(mut self, perturb: bool) -> Self {
        self.perturb = perturb;
        self
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn sampler(&self) -> Sampler<'_> {
        Sampler::with_settings(&self.model, self.policy, self.max_attempts)
    }

    /// Emit a single particle by independent weighted selection
    pub fn sample(&self, stream: &mut RandomStream) -> Result<ParticleRecord> {
        let sampler = self.sampler();
        let index = sampler.select_index(stream.uniform());
        sampler.emit(index, self.perturb, stream)
    }

    /// Emit particle `particle_id` (1-based) of a run seeded with `seed`
    pub fn sample_particle(&self, seed: u64, particle_id: u64) -> Result<ParticleRecord> {
        let mut stream = RandomStream::for_particle(seed, particle_id, StreamKind::Source);
        self.sample(&mut stream)
    }

    /// Emit batch `batch` (0-based) of `particles` particles in parallel.
    ///
    /// Particle ids run from `batch·particles + 1`; the result is in id order.
    /// Under systematic selection the batch's offset comes from the selection
    /// stream of its first particle id.
    pub fn sample_batch(&self, seed: u64, batch: usize, particles: usize) -> Result<Vec<ParticleRecord>> {
        let sampler = self.sampler();
        let first_id = batch as u64 * particles as u64 + 1;
        let offset = match self.policy {
            SelectionPolicy::Systematic => {
                RandomStream::for_particle(seed, first_id, StreamKind::Selection).uniform()
            }
            SelectionPolicy::WithReplacement => 0.0,
        };

        let emitted = (0..particles)
            .into_par_iter()
            .map(|j| {
                let mut stream =
                    RandomStream::for_particle(seed, first_id + j as u64, StreamKind::Source);
                let index = match self.policy {
                    SelectionPolicy::WithReplacement => sampler.select_index(stream.uniform()),
                    SelectionPolicy::Systematic => sampler.select_systematic(offset, j, particles),
                };
                sampler.emit(index, self.perturb, &mut stream)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "batch {}: emitted {} particles (ids {}..={})",
            batch + 1,
            emitted.len(),
            first_id,
            first_id + particles as u64 - 1
        );
        Ok(emitted)
    }
}
