//! tuneboy - A polyphonic toy synthesizer with a step sequencer.
//!
//! This library provides the synthesis, voice management and sequencing
//! core. The `tuneboy` binary is a thin terminal front end over [`Engine`].

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod keymap;
pub mod notes;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{export_to_wav, InstrumentId, Mixer, SoundEffect, VoiceBank, WaveShape};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, MixerError, SequenceError, SynthError};
pub use notes::NoteId;
pub use sequencer::{Sequence, SequencerEvent, TransportState};
