use crate::bank::{SurfaceCrossing, SurfaceSourceBank};
use crate::error::Result;
use crate::particle::ParticleRecord;
use crate::settings::Settings;
use log::{debug, info};

/// Outcome of [`Model::run`]
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub batches: usize,
    /// Source particles handed to the transport closure
    pub emitted: usize,
    /// Crossings reported by the transport closure, recorded or not
    pub crossings: usize,
    /// Present when surface source writing was configured
    pub surface_source: Option<SurfaceSourceBank>,
}

/// Drives source emission batch by batch for an external transport code
#[derive(Debug, Clone)]
pub struct Model {
    pub settings: Settings,
}

impl Model {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// Emit every batch and hand each particle to `transport`, which returns
    /// the surface crossing it produced, if any.
    ///
    /// Batches are emitted in parallel and transported in particle-id order,
    /// so the banked particles are the same on every run with the same seed.
    pub fn run<F>(&self, mut transport: F) -> Result<RunSummary>
    where
        F: FnMut(&ParticleRecord) -> Option<SurfaceCrossing>,
    {
        let settings = &self.settings;
        let seed = settings.seed();
        let mut bank = settings
            .surface_source_write
            .clone()
            .map(SurfaceSourceBank::new);

        let mut emitted = 0;
        let mut crossings = 0;
        for batch in 0..settings.batches {
            let particles = settings.source.sample_batch(seed, batch, settings.particles)?;
            let mut batch_crossings = 0;
            for particle in &particles {
                if let Some(crossing) = transport(particle) {
                    batch_crossings += 1;
                    if let Some(bank) = bank.as_mut() {
                        bank.record(&crossing);
                    }
                }
            }
            emitted += particles.len();
            crossings += batch_crossings;
            debug!(
                "batch {}/{}: {} crossings",
                batch + 1,
                settings.batches,
                batch_crossings
            );
        }

        if let Some(bank) = &bank {
            info!(
                "surface source bank holds {} particles ({} dropped at the cap)",
                bank.len(),
                bank.dropped()
            );
        }
        info!(
            "ran {} batches of {} particles (seed {})",
            settings.batches, settings.particles, seed
        );
        Ok(RunSummary {
            batches: settings.batches,
            emitted,
            crossings,
            surface_source: bank,
        })
    }
}
