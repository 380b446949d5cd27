use crate::error::{Error, Result};
use crate::fast_rng::DEFAULT_SEED;
use crate::source::KernelDensitySource;
use crate::track::TrackFormat;
use std::collections::HashSet;

/// Surface-crossing recording options.
///
/// Fields are private so a value can only exist after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceWriteSettings {
    surface_ids: Vec<u32>,
    max_particles: usize,
    format: TrackFormat,
}

impl SurfaceWriteSettings {
    /// Surface ids must be non-empty and unique, the cap at least 1
    pub fn new(surface_ids: Vec<u32>, max_particles: usize, format: TrackFormat) -> Result<Self> {
        if surface_ids.is_empty() {
            return Err(Error::Configuration(
                "surface source writing needs at least one surface id".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = surface_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(Error::Configuration(format!(
                "surface id {} listed more than once",
                dup
            )));
        }
        if max_particles == 0 {
            return Err(Error::Configuration(
                "max_particles must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            surface_ids,
            max_particles,
            format,
        })
    }

    pub fn surface_ids(&self) -> &[u32] {
        &self.surface_ids
    }

    pub fn max_particles(&self) -> usize {
        self.max_particles
    }

    pub fn format(&self) -> TrackFormat {
        self.format
    }

    pub fn records(&self, surface_id: u32) -> bool {
        self.surface_ids.contains(&surface_id)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub particles: usize,
    pub batches: usize,
    /// Master seed; `DEFAULT_SEED` when unset
    pub seed: Option<u64>,
    pub source: KernelDensitySource,
    pub surface_source_write: Option<SurfaceWriteSettings>,
}

impl Settings {
    pub fn new(particles: usize, batches: usize, source: KernelDensitySource) -> Result<Self> {
        let settings = Self {
            particles,
            batches,
            seed: None,
            source,
            surface_source_write: None,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_surface_source_write(mut self, write: SurfaceWriteSettings) -> Self {
        self.surface_source_write = Some(write);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }

    pub fn total_particles(&self) -> usize {
        self.particles * self.batches
    }

    pub fn validate(&self) -> Result<()> {
        if self.particles == 0 {
            return Err(Error::Configuration(
                "particles per batch must be at least 1".to_string(),
            ));
        }
        if self.batches == 0 {
            return Err(Error::Configuration(
                "number of batches must be at least 1".to_string(),
            ));
        }
        if self.source.max_attempts == 0 && self.source.perturb {
            return Err(Error::Configuration(
                "perturbed source needs max_attempts >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
