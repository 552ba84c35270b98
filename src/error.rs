//! Error types for the synthesizer core.
//!
//! Only construction-time and persistence failures are errors. Runtime
//! playback problems (unknown instrument, exhausted channel pool, fading a
//! channel that already finished) are absorbed by the voice manager.

use thiserror::Error;

/// Failure while building the voice bank.
#[derive(Debug, Error)]
pub enum SynthError {
    /// The instrument name does not correspond to a wave shape.
    #[error("unknown waveform shape: {0:?}")]
    UnknownShape(String),
}

/// Failure while loading or saving a persisted sequence.
#[derive(Debug, Error)]
pub enum SequenceError {
    /// File could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a structurally valid list of note records.
    #[error("malformed sequence data: {0}")]
    Json(#[from] serde_json::Error),

    /// A record parsed but its contents are out of range.
    #[error("invalid record #{index}: {reason}")]
    InvalidRecord {
        /// Zero-based position of the record in the file.
        index: usize,
        /// What was wrong with it.
        reason: String,
    },
}

/// Failure reported by the playback subsystem.
#[derive(Debug, Error)]
pub enum MixerError {
    /// Channel index outside the pool.
    #[error("channel {0} is out of range")]
    ChannelOutOfRange(usize),

    /// The channel has nothing playing (e.g. it finished naturally).
    #[error("channel {0} is idle")]
    ChannelIdle(usize),

    /// The channel is still playing and cannot take a new buffer.
    #[error("channel {0} is busy")]
    ChannelBusy(usize),

    /// The audio output device could not be opened.
    #[error("audio output error: {0}")]
    Output(String),
}

/// Top-level error for engine construction and persistence.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Voice bank could not be built.
    #[error(transparent)]
    Synth(#[from] SynthError),

    /// Sequence could not be saved or loaded.
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// Configuration file could not be read.
    #[error("invalid configuration: {0}")]
    Config(String),
}
