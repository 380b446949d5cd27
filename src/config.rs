// Global defaults for fitting and sampling
use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::Mutex;

// Global engine defaults
pub static CONFIG: Lazy<Mutex<Config>> = Lazy::new(|| Mutex::new(Config::new()));

/// Process-wide defaults read when a fit, sampler or store is built.
///
/// A single instance is exposed via the `CONFIG` static (a
/// `Lazy<Mutex<Config>>`); obtain a guard with [`Config::global`]. Values are
/// copied out at construction time, so changing the global afterwards does
/// not affect objects that already exist. Random state never lives here.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Perturbed draws attempted per emitted particle before giving up
    pub max_resample_attempts: usize,
    /// Training points used by MLCV bandwidth selection
    pub cv_max_points: usize,
    /// Neighbour rank for the KNN method when parsed from its tag
    pub knn_neighbors: usize,
    /// Extra directories searched for external training data
    pub track_search_paths: Vec<PathBuf>,
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Config {
            max_resample_attempts: 1000,
            cv_max_points: 1000,
            knn_neighbors: 10,
            track_search_paths: Vec::new(),
        }
    }

    pub fn add_track_search_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.track_search_paths.contains(&path) {
            self.track_search_paths.push(path);
        }
    }

    /// Restore defaults
    pub fn clear(&mut self) {
        *self = Config::new();
    }

    /// Get the global configuration instance
    pub fn global() -> std::sync::MutexGuard<'static, Self> {
        CONFIG
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
