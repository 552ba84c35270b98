//! Engine configuration.
//!
//! All tunables live in [`EngineConfig`]. It deserializes from JSON with
//! every field optional, so a config file only needs the values it changes.

use crate::audio::BankSettings;
use crate::error::EngineError;
use crate::sequencer::GridLayout;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Sample rate for synthesis and output (44.1 kHz standard).
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default tempo in beats per minute.
pub const DEFAULT_TEMPO: u32 = 120;

/// Sequencer resolution: sixteenth notes.
pub const SUBDIVISIONS_PER_BEAT: u32 = 4;

/// Tempo limits and nudge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Tempo the transport starts at.
    pub default: u32,
    /// Lowest allowed tempo.
    pub min: u32,
    /// Highest allowed tempo.
    pub max: u32,
    /// BPM change per nudge.
    pub step: u32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_TEMPO,
            min: 60,
            max: 240,
            step: 5,
        }
    }
}

impl TempoConfig {
    /// Clamps `bpm` into `[min, max]`.
    pub fn clamp(&self, bpm: u32) -> u32 {
        bpm.clamp(self.min, self.max.max(self.min))
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,

    /// Size of the playback channel pool. Bounds polyphony.
    pub channels: usize,

    /// Fade applied when a held note is released.
    pub fade_out_ms: u64,

    /// Length of every buffer in the voice bank. Must cover the longest
    /// held key or sequencer note.
    pub bank_duration_secs: f64,

    /// Amplitude of bank buffers, low enough to mix many voices.
    pub bank_volume: f64,

    /// Instrument names, in cycling order. Each must be a wave shape.
    pub instruments: Vec<String>,

    /// Tempo limits.
    pub tempo: TempoConfig,

    /// Number of columns in the sequencer grid.
    pub grid_width: u32,

    /// Width of one grid column in the persisted format's units.
    pub cell_width: f64,

    /// Height of one grid row in the persisted format's units.
    pub cell_height: f64,

    /// Length of the preview played when a note is placed.
    pub preview_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 32,
            fade_out_ms: 100,
            bank_duration_secs: 4.0,
            bank_volume: 0.1,
            instruments: ["sine", "square", "sawtooth", "triangle"]
                .into_iter()
                .map(String::from)
                .collect(),
            tempo: TempoConfig::default(),
            grid_width: 100,
            cell_width: 40.0,
            cell_height: 25.0,
            preview_ms: 200,
        }
    }
}

impl EngineConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON, or
    /// describes an unusable configuration (see [`EngineConfig::validate`]).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Parses a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.sample_rate == 0 {
            return Err(EngineError::Config("sample_rate must be positive".into()));
        }
        if self.channels == 0 {
            return Err(EngineError::Config("channels must be at least 1".into()));
        }
        if self.grid_width == 0 {
            return Err(EngineError::Config("grid_width must be at least 1".into()));
        }
        if self.tempo.min == 0 || self.tempo.min > self.tempo.max {
            return Err(EngineError::Config(format!(
                "invalid tempo range {}..={}",
                self.tempo.min, self.tempo.max
            )));
        }
        if !(self.cell_width > 0.0 && self.cell_width.is_finite()) {
            return Err(EngineError::Config("cell_width must be positive".into()));
        }
        if self.instruments.is_empty() {
            return Err(EngineError::Config("at least one instrument is required".into()));
        }
        Ok(())
    }

    /// Fade applied on note release.
    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }

    /// Length of a placement preview.
    pub fn preview(&self) -> Duration {
        Duration::from_millis(self.preview_ms)
    }

    /// Settings for building the voice bank.
    pub fn bank_settings(&self) -> BankSettings {
        BankSettings {
            duration_secs: self.bank_duration_secs,
            volume: self.bank_volume,
            sample_rate: self.sample_rate,
        }
    }

    /// Cell size used by the sequence file format.
    pub fn layout(&self) -> GridLayout {
        GridLayout {
            cell_width: self.cell_width,
            cell_height: self.cell_height,
        }
    }
}
