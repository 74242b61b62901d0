//! Configuration loading
//!
//! Settings precedence: command-line argument > environment variable >
//! TOML config file > compiled default. The binary resolves CLI/env via
//! clap; this module owns the file layer and the defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Player settings loaded from the TOML config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP control API port
    pub port: u16,

    /// Jitter buffer lead applied to the first segment of a play session
    pub buffer_lead_seconds: f64,

    /// Coalescing window for reconfiguration requests (milliseconds)
    pub coalesce_window_ms: u64,

    /// Output device name (None = system default)
    pub audio_device: Option<String>,

    /// Master volume (0.0-1.0)
    pub volume: f32,

    /// Directory for preset storage and exported recordings
    pub data_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 5790,
            buffer_lead_seconds: 2.0,
            coalesce_window_ms: 200,
            audio_device: None,
            volume: 0.75,
            data_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from an explicit path, or the default location
    ///
    /// A missing file is not an error: defaults apply. A present but
    /// malformed file is a configuration error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that cannot produce working playback
    pub fn validate(&self) -> Result<()> {
        if self.buffer_lead_seconds <= 0.0 {
            return Err(Error::Config(
                "buffer_lead_seconds must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::Config("volume must be within 0.0-1.0".to_string()));
        }
        Ok(())
    }

    /// Resolve the data directory, falling back to the platform default
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        default_data_dir()
    }
}

/// Default config file path for the platform (`<config dir>/lyrebird/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lyrebird").join("config.toml"))
}

/// OS-dependent default data folder
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("lyrebird"))
        .unwrap_or_else(|| PathBuf::from("./lyrebird_data"))
}
