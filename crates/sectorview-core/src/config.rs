use std::time::Duration;

use serde::Deserialize;

use crate::constants::*;
use crate::error::CoreError;

/// Top-level viewer settings. Every field falls back to its default when
/// omitted from the RON source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub readback: ReadbackConfig,
    pub repository: RepositoryConfig,
    pub clipping: ClippingConfig,
}

/// Fence polling policy for async pixel readback.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReadbackConfig {
    /// Delay between non-blocking fence checks.
    pub poll_interval_ms: u64,
    /// Give up after this many fence checks. `None` polls until the GPU
    /// answers.
    pub max_polls: Option<u32>,
}

impl Default for ReadbackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_polls: None,
        }
    }
}

impl ReadbackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Cache bounds and retry policy for the sector repository.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub max_cached_sectors: usize,
    pub max_cached_mesh_files: usize,
    pub fetch_retries: u32,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            max_cached_sectors: DEFAULT_MAX_CACHED_SECTORS,
            max_cached_mesh_files: DEFAULT_MAX_CACHED_MESH_FILES,
            fetch_retries: DEFAULT_FETCH_RETRIES,
        }
    }
}

/// Initial clipping mode.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClippingConfig {
    /// Clip away the box interior instead of everything outside it.
    pub intersection: bool,
}

impl ViewerConfig {
    /// Parse a config from a RON string.
    pub fn from_ron_str(ron_str: &str) -> Result<Self, CoreError> {
        let options = ron::Options::default();
        options
            .from_str(ron_str)
            .map_err(|e| CoreError::ConfigParseError(e.to_string()))
    }
}
