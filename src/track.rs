// Particle-track collaborator: the boundary between stored particle tracks and
// the density engine. Binary container formats live elsewhere; this module
// only ships the in-memory source and plain JSON track files.

use crate::error::{Error, Result};
use crate::particle::ParticleRecord;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// A source of weighted particle records.
///
/// `read(None)` returns every record, `read(Some(n))` the first `n` in
/// stored order.
pub trait TrackSource {
    /// Total number of records held by the source
    fn len(&self) -> usize;

    /// Sum of the statistical weights of every record
    fn total_weight(&self) -> f64;

    fn read(&mut self, limit: Option<usize>) -> Result<Vec<ParticleRecord>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// On-disk layout of a track file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackFormat {
    /// A single JSON array of records
    #[default]
    #[serde(rename = "json")]
    Json,
    /// One JSON record per line
    #[serde(rename = "jsonl")]
    JsonLines,
}

impl TrackFormat {
    pub fn from_str_option(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(TrackFormat::Json),
            "jsonl" | "json-lines" | "jsonlines" => Some(TrackFormat::JsonLines),
            _ => None,
        }
    }

    /// Guess the format from a file extension, defaulting to a JSON array
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl") => TrackFormat::JsonLines,
            _ => TrackFormat::Json,
        }
    }
}

/// Records held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryTrack {
    records: Vec<ParticleRecord>,
}

impl MemoryTrack {
    pub fn new(records: Vec<ParticleRecord>) -> Self {
        Self { records }
    }
}

impl TrackSource for MemoryTrack {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn total_weight(&self) -> f64 {
        self.records.iter().map(|p| p.weight).sum()
    }

    fn read(&mut self, limit: Option<usize>) -> Result<Vec<ParticleRecord>> {
        let n = limit.unwrap_or(self.records.len()).min(self.records.len());
        Ok(self.records[..n].to_vec())
    }
}

/// A JSON track file on disk.
///
/// Opening scans the file once to learn the record count and total weight.
/// Bounded reads of a JSON-lines file stop after the requested number of
/// lines.
#[derive(Debug, Clone)]
pub struct TrackFile {
    pub path: PathBuf,
    pub format: TrackFormat,
    len: usize,
    total_weight: f64,
}

impl TrackFile {
    pub fn open(path: impl AsRef<Path>, format: TrackFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = Self {
            path,
            format,
            len: 0,
            total_weight: 0.0,
        };
        let records = file.read_records(None)?;
        file.len = records.len();
        file.total_weight = records.iter().map(|p| p.weight).sum();
        Ok(file)
    }

    fn read_records(&self, limit: Option<usize>) -> Result<Vec<ParticleRecord>> {
        match self.format {
            TrackFormat::Json => {
                let reader = BufReader::new(fs::File::open(&self.path)?);
                let mut records: Vec<ParticleRecord> = serde_json::from_reader(reader)?;
                if let Some(n) = limit {
                    records.truncate(n);
                }
                Ok(records)
            }
            TrackFormat::JsonLines => {
                let reader = BufReader::new(fs::File::open(&self.path)?);
                let mut records = Vec::new();
                for line in reader.lines() {
                    if limit.is_some_and(|n| records.len() >= n) {
                        break;
                    }
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    records.push(serde_json::from_str(&line)?);
                }
                Ok(records)
            }
        }
    }
}

impl TrackSource for TrackFile {
    fn len(&self) -> usize {
        self.len
    }

    fn total_weight(&self) -> f64 {
        self.total_weight
    }

    fn read(&mut self, limit: Option<usize>) -> Result<Vec<ParticleRecord>> {
        self.read_records(limit)
    }
}

/// Write records as a track file in the given format
pub fn write_track_file(
    path: impl AsRef<Path>,
    records: &[ParticleRecord],
    format: TrackFormat,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(fs::File::create(path)?);
    match format {
        TrackFormat::Json => serde_json::to_writer(&mut writer, records)?,
        TrackFormat::JsonLines => {
            for record in records {
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// Read every record of a track file
pub fn read_track_file(path: impl AsRef<Path>, format: TrackFormat) -> Result<Vec<ParticleRecord>> {
    let mut file = TrackFile::open(path, format)?;
    file.read(None)
}

pub(crate) fn missing_track(path: &Path) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("track file not found: {}", path.display()),
    ))
}
