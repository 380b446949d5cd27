// Surface source bank
//
// Collects particles crossing the configured surfaces during transport so they
// can be re-ingested as a new ParticleList or written as a track file.

use crate::error::Result;
use crate::particle::ParticleRecord;
use crate::particle_list::ParticleList;
use crate::settings::SurfaceWriteSettings;
use crate::track::write_track_file;
use std::path::Path;

/// A particle state recorded where it crossed a surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceCrossing {
    pub surface_id: u32,
    pub particle: ParticleRecord,
}

impl SurfaceCrossing {
    pub fn new(surface_id: u32, particle: ParticleRecord) -> Self {
        Self {
            surface_id,
            particle,
        }
    }
}

/// Bank of surface crossings, capped at `max_particles`.
///
/// Crossings of surfaces that are not configured, or that arrive once the
/// bank is full, are counted but not stored.
#[derive(Debug, Clone)]
pub struct SurfaceSourceBank {
    settings: SurfaceWriteSettings,
    particles: Vec<ParticleRecord>,
    dropped: usize,
}

impl SurfaceSourceBank {
    pub fn new(settings: SurfaceWriteSettings) -> Self {
        SurfaceSourceBank {
            particles: Vec::with_capacity(settings.max_particles().min(1 << 16)),
            settings,
            dropped: 0,
        }
    }

    /// Bank a crossing; returns whether it was stored
    pub fn record(&mut self, crossing: &SurfaceCrossing) -> bool {
        if !self.settings.records(crossing.surface_id) {
            return false;
        }
        if self.is_full() {
            self.dropped += 1;
            return false;
        }
        self.particles.push(crossing.particle);
        true
    }

    pub fn settings(&self) -> &SurfaceWriteSettings {
        &self.settings
    }

    pub fn particles(&self) -> &[ParticleRecord] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.particles.len() >= self.settings.max_particles()
    }

    /// Crossings on recorded surfaces that arrived after the cap was reached
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.particles.clear();
        self.dropped = 0;
    }

    pub fn to_particle_list(&self) -> Result<ParticleList> {
        ParticleList::new(self.particles.clone())
    }

    /// Write the banked particles as a track file in the configured format
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        write_track_file(path, &self.particles, self.settings.format())
    }
}
