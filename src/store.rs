// Model persistence: a pretty-printed JSON descriptor holding everything needed
// to rebuild a fitted model without re-running bandwidth selection.

use crate::bandwidth::{Bandwidth, BandwidthMethod};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::geometry::{GeometryModel, GeometrySpec};
use crate::kde::{DensityModel, GAUSSIAN_KERNEL};
use crate::particle::ParticleRecord;
use crate::particle_list::ParticleList;
use crate::track::{missing_track, write_track_file, TrackFile, TrackFormat};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Descriptor layout version written by this crate
pub const FORMAT_VERSION: u32 = 1;

/// Where the training particles of a saved model live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TrainingData {
    /// Copied into the descriptor
    Embedded { records: Vec<ParticleRecord> },
    /// A track file; relative paths are resolved against the descriptor's
    /// directory, then against `Config::track_search_paths`
    External {
        path: PathBuf,
        #[serde(default)]
        format: TrackFormat,
        /// Leading records used for training, all when unset
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
    },
}

/// Serialized form of a [`DensityModel`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub format_version: u32,
    pub kernel: String,
    pub geometry: GeometrySpec,
    pub scaling: Vec<f64>,
    pub bandwidth: Bandwidth,
    pub method: BandwidthMethod,
    pub training: TrainingData,
}

/// Saves and loads model descriptors
#[derive(Debug, Clone, Default)]
pub struct ModelStore {
    pub search_paths: Vec<PathBuf>,
}

impl ModelStore {
    /// A store searching the globally configured track directories
    pub fn new() -> Self {
        Self {
            search_paths: Config::global().track_search_paths.clone(),
        }
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Descriptor of `model` with the given training-data reference
    pub fn descriptor(model: &DensityModel, training: TrainingData) -> Result<ModelDescriptor> {
        Ok(ModelDescriptor {
            format_version: FORMAT_VERSION,
            kernel: model.kernel().to_string(),
            geometry: model.geometry().spec()?,
            scaling: model.scaling().to_vec(),
            bandwidth: model.bandwidth().clone(),
            method: model.method().clone(),
            training,
        })
    }

    /// Save with the training particles embedded in the descriptor
    pub fn save(&self, model: &DensityModel, path: impl AsRef<Path>) -> Result<()> {
        let training = TrainingData::Embedded {
            records: model.records().to_vec(),
        };
        let descriptor = Self::descriptor(model, training)?;
        write_descriptor(path.as_ref(), &descriptor)?;
        info!(
            "saved {}-particle model to {} (embedded training data)",
            model.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Save with the training particles written to a separate track file.
    ///
    /// A relative `track_path` is taken relative to the descriptor's directory
    /// and stored relative, so the pair can be moved together.
    pub fn save_external(
        &self,
        model: &DensityModel,
        path: impl AsRef<Path>,
        track_path: impl AsRef<Path>,
        format: TrackFormat,
    ) -> Result<()> {
        let path = path.as_ref();
        let track_path = track_path.as_ref();
        let written = if track_path.is_absolute() {
            track_path.to_path_buf()
        } else {
            base_dir(path).join(track_path)
        };
        write_track_file(&written, model.records(), format)?;

        let training = TrainingData::External {
            path: track_path.to_path_buf(),
            format,
            count: None,
        };
        let descriptor = Self::descriptor(model, training)?;
        write_descriptor(path, &descriptor)?;
        info!(
            "saved {}-particle model to {} (training data in {})",
            model.len(),
            path.display(),
            written.display()
        );
        Ok(())
    }

    pub fn read_descriptor(path: impl AsRef<Path>) -> Result<ModelDescriptor> {
        let reader = BufReader::new(fs::File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<DensityModel> {
        let path = path.as_ref();
        let descriptor = Self::read_descriptor(path)?;
        let model = self.build(&descriptor, base_dir(path))?;
        info!(
            "loaded {}-dimensional {} model with {} particles from {}",
            model.dimension(),
            model.method().tag(),
            model.len(),
            path.display()
        );
        Ok(model)
    }

    /// Rebuild a model from a descriptor; `base` anchors relative track paths
    pub fn build(&self, descriptor: &ModelDescriptor, base: &Path) -> Result<DensityModel> {
        if descriptor.format_version > FORMAT_VERSION {
            return Err(Error::ConfigurationMismatch(format!(
                "descriptor format version {} is newer than supported version {}",
                descriptor.format_version, FORMAT_VERSION
            )));
        }
        if descriptor.kernel != GAUSSIAN_KERNEL {
            return Err(Error::ConfigurationMismatch(format!(
                "unsupported kernel '{}'",
                descriptor.kernel
            )));
        }

        let geometry = GeometryModel::from_spec(&descriptor.geometry)?;
        if geometry.dimension() != descriptor.scaling.len() {
            return Err(Error::ConfigurationMismatch(format!(
                "geometry has {} dimensions but the stored scaling vector has {} entries",
                geometry.dimension(),
                descriptor.scaling.len()
            )));
        }

        let list = match &descriptor.training {
            TrainingData::Embedded { records } => ParticleList::new(records.clone())?,
            TrainingData::External {
                path,
                format,
                count,
            } => {
                let resolved = self.resolve(path, base)?;
                let mut track = TrackFile::open(&resolved, *format)?;
                let n = count.map(|n| n as isize).unwrap_or(crate::particle_list::ALL);
                ParticleList::load(&mut track, n)?
            }
        };

        DensityModel::from_parts(
            geometry,
            list,
            descriptor.scaling.clone(),
            descriptor.bandwidth.clone(),
            descriptor.method.clone(),
        )
    }

    /// Locate a referenced track file
    pub fn resolve(&self, path: &Path, base: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            return if path.exists() {
                Ok(path.to_path_buf())
            } else {
                Err(missing_track(path))
            };
        }
        std::iter::once(base)
            .chain(self.search_paths.iter().map(PathBuf::as_path))
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.exists())
            .ok_or_else(|| missing_track(path))
    }
}

fn base_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

fn write_descriptor(path: &Path, descriptor: &ModelDescriptor) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, descriptor)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

impl DensityModel {
    /// Save with embedded training data
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        ModelStore::new().save(self, path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        ModelStore::new().load(path)
    }
}
