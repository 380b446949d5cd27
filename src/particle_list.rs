use crate::error::{Error, Result};
use crate::particle::ParticleRecord;
use crate::stats::effective_sample_size;
use crate::track::{MemoryTrack, TrackSource};
use rand::seq::SliceRandom;
use rand::Rng;

/// Retrieval count meaning "every record"
pub const ALL: isize = -1;

/// An ordered, weighted collection of particle records.
///
/// Order is the order of the track source unless the list was explicitly
/// built with [`ParticleList::shuffled`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleList {
    records: Vec<ParticleRecord>,
}

fn resolve_count(n: isize, available: usize) -> Result<usize> {
    match n {
        ALL => Ok(available),
        n if n < 0 => Err(Error::Configuration(format!(
            "record count must be -1 (all) or >= 0, got {}",
            n
        ))),
        n => {
            let n = n as usize;
            if n > available {
                return Err(Error::InsufficientData(format!(
                    "requested {} records but only {} are available",
                    n, available
                )));
            }
            Ok(n)
        }
    }
}

impl ParticleList {
    /// Build a list from records already in memory. Every record is validated.
    pub fn new(records: Vec<ParticleRecord>) -> Result<Self> {
        for (i, record) in records.iter().enumerate() {
            record.validate().map_err(|e| match e {
                Error::Configuration(msg) => Error::Configuration(format!("record {}: {}", i, msg)),
                other => other,
            })?;
        }
        Ok(Self { records })
    }

    /// Ingest `n` records (`-1` for all) from a track source
    pub fn load<S: TrackSource + ?Sized>(source: &mut S, n: isize) -> Result<Self> {
        let count = resolve_count(n, source.len())?;
        let limit = if n == ALL { None } else { Some(count) };
        let records = source.read(limit)?;
        if records.len() != count {
            return Err(Error::InsufficientData(format!(
                "track source returned {} records, expected {}",
                records.len(),
                count
            )));
        }
        Self::new(records)
    }

    /// The first `n` records (`-1` for all)
    pub fn get(&self, n: isize) -> Result<&[ParticleRecord]> {
        let count = resolve_count(n, self.records.len())?;
        Ok(&self.records[..count])
    }

    /// A new list holding the first `n` records (`-1` for all)
    pub fn head(&self, n: isize) -> Result<ParticleList> {
        Ok(ParticleList {
            records: self.get(n)?.to_vec(),
        })
    }

    pub fn records(&self) -> &[ParticleRecord] {
        &self.records
    }

    pub fn weights(&self) -> Vec<f64> {
        self.records.iter().map(|p| p.weight).collect()
    }

    pub fn total_weight(&self) -> f64 {
        self.records.iter().map(|p| p.weight).sum()
    }

    /// Kish effective sample size of the record weights
    pub fn effective_size(&self) -> f64 {
        effective_sample_size(self.records.iter().map(|p| p.weight))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A copy of this list in random order
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> ParticleList {
        let mut records = self.records.clone();
        records.shuffle(rng);
        ParticleList { records }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParticleRecord> {
        self.records.iter()
    }

    /// View this list as a track source, e.g. to re-ingest recorded particles
    pub fn to_track(&self) -> MemoryTrack {
        MemoryTrack::new(self.records.clone())
    }
}

impl<'a> IntoIterator for &'a ParticleList {
    type Item = &'a ParticleRecord;
    type IntoIter = std::slice::Iter<'a, ParticleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
