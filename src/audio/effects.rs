//! Short interface sounds.
//!
//! These are synthesized on demand (they are tiny) rather than cached in
//! the voice bank, and played untracked.

use super::synth::{synthesize, SampleBuffer, WaveShape};

/// Pitches walked by successive typing clicks.
const TYPING_NOTES: [f64; 10] = [
    261.63, 329.63, 392.00, 493.88, 587.33, 523.25, 659.25, 783.99, 987.77, 1174.66,
];

/// A UI sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEffect {
    /// Typewriter click for the `index`-th character of a message.
    Type(usize),
    /// Cursor moved over a button.
    Hover,
}

impl SoundEffect {
    /// Renders the effect.
    pub fn render(self, sample_rate: u32) -> SampleBuffer {
        match self {
            SoundEffect::Type(index) => {
                let frequency = TYPING_NOTES[index % TYPING_NOTES.len()];
                let volume = 0.05 + 0.02 * (index as f64).sin();
                synthesize(frequency, WaveShape::Sine, 0.1, volume, sample_rate)
            }
            SoundEffect::Hover => synthesize(200.0, WaveShape::Sawtooth, 0.05, 0.03, sample_rate),
        }
    }
}
