pub mod bandwidth;
pub mod bank;
pub mod config;
pub mod error;
pub mod fast_rng;
pub mod geometry;
pub mod kde;
pub mod model;
pub mod particle;
pub mod particle_list;
pub mod sampler;
pub mod settings;
pub mod source;
pub mod stats;
pub mod store;
pub mod track;

pub use bandwidth::{Bandwidth, BandwidthMethod, BandwidthSelector};
pub use bank::{SurfaceCrossing, SurfaceSourceBank};
pub use config::Config;
pub use error::{Error, Result};
pub use fast_rng::{RandomStream, StreamKind};
pub use geometry::{Direction, Energy, Frame, GeometryModel, Position, Variable};
pub use kde::{DensityModel, FitConfig};
pub use model::{Model, RunSummary};
pub use particle::{ParticleRecord, ParticleType};
pub use particle_list::ParticleList;
pub use sampler::{draw, Draw, Sampler, SelectionPolicy};
pub use settings::{Settings, SurfaceWriteSettings};
pub use source::KernelDensitySource;
pub use store::{ModelStore, TrainingData};
pub use track::{MemoryTrack, TrackFile, TrackFormat, TrackSource};
