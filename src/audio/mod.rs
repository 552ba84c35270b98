//! Sound generation and playback.
//!
//! Notes are synthesized once into a [`VoiceBank`] and played back through
//! a fixed pool of mixer channels. The [`VoiceManager`] tracks which channel
//! belongs to which held note so releases can fade it out.
//!
//! - [`synth`]: waveform rendering and the shared sample buffer type
//! - [`bank`]: per-instrument, per-note buffer cache
//! - [`mixer`]: the channel pool boundary
//! - [`output`]: rodio-backed mixer for the default output device
//! - [`voice`]: note tracking, sustain and fades
//! - [`effects`]: short interface sounds
//! - [`export`]: offline bounce to WAV

pub mod bank;
pub mod effects;
pub mod export;
pub mod mixer;
pub mod output;
pub mod synth;
pub mod voice;

pub use bank::{BankSettings, InstrumentId, VoiceBank};
pub use effects::SoundEffect;
pub use export::{export_to_wav, render_sequence};
pub use mixer::{ChannelId, Mixer};
pub use output::{AudioOutput, RodioMixer};
pub use synth::{synthesize, SampleBuffer, WaveShape};
pub use voice::{ActiveVoice, VoiceManager};
