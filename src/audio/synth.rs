//! Offline waveform synthesis.
//!
//! [`synthesize`] renders a complete note into an immutable [`SampleBuffer`]:
//! the raw waveform, a linear attack/release envelope, volume scaling, and
//! conversion to interleaved 16-bit stereo. It is a pure function, so the
//! voice bank can call it from many threads at once.

use crate::error::SynthError;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Attack ramp length in seconds.
pub const ATTACK_SECS: f64 = 0.01;

/// Release ramp length in seconds.
pub const RELEASE_SECS: f64 = 0.05;

/// Full-scale value for 16-bit conversion.
const I16_SCALE: f64 = 32767.0;

/// Oscillator waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveShape {
    /// Pure sine.
    Sine,
    /// Sign of a sine: hollow, buzzy.
    Square,
    /// Rising ramp.
    Sawtooth,
    /// Folded ramp.
    Triangle,
}

impl WaveShape {
    /// All shapes in their canonical cycling order.
    pub const ALL: [WaveShape; 4] = [
        WaveShape::Sine,
        WaveShape::Square,
        WaveShape::Sawtooth,
        WaveShape::Triangle,
    ];

    /// Lowercase name used for instruments and persisted files.
    pub fn name(self) -> &'static str {
        match self {
            WaveShape::Sine => "sine",
            WaveShape::Square => "square",
            WaveShape::Sawtooth => "sawtooth",
            WaveShape::Triangle => "triangle",
        }
    }

    /// Evaluates the waveform at phase `f·t` (in cycles).
    ///
    /// Output is in `[-1.0, 1.0]`.
    #[inline]
    pub fn evaluate(self, cycles: f64) -> f64 {
        match self {
            WaveShape::Sine => (2.0 * PI * cycles).sin(),
            WaveShape::Square => sign((2.0 * PI * cycles).sin()),
            WaveShape::Sawtooth => saw(cycles),
            WaveShape::Triangle => saw(cycles).abs() * 2.0 - 1.0,
        }
    }
}

/// `2·(x − floor(x + 0.5))`: a ramp from -1 to 1 centered on integer cycles.
#[inline]
fn saw(cycles: f64) -> f64 {
    2.0 * (cycles - (cycles + 0.5).floor())
}

/// Signum that maps zero to zero (`f64::signum` maps +0.0 to 1.0).
#[inline]
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

impl fmt::Display for WaveShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WaveShape {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WaveShape::ALL
            .into_iter()
            .find(|shape| shape.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SynthError::UnknownShape(s.to_string()))
    }
}

/// An immutable block of 16-bit stereo audio.
///
/// Produced once by [`synthesize`] and then shared read-only (behind an
/// `Arc`) by every voice that plays it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    sample_rate: u32,
    frames: Vec<[i16; 2]>,
}

impl SampleBuffer {
    /// Wraps pre-rendered stereo frames.
    pub fn from_frames(sample_rate: u32, frames: Vec<[i16; 2]>) -> Self {
        Self {
            sample_rate,
            frames,
        }
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stereo frames (left, right).
    pub fn frames(&self) -> &[[i16; 2]] {
        &self.frames
    }

    /// Number of stereo frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of frames that fit in `duration` at this buffer's rate,
    /// capped at the buffer length.
    pub fn frames_for(&self, duration: Duration) -> usize {
        let frames = (duration.as_secs_f64() * self.sample_rate as f64).round() as usize;
        frames.min(self.frames.len())
    }
}

/// Attack and release lengths in frames for a sample rate.
pub fn envelope_frames(sample_rate: u32) -> (usize, usize) {
    let rate = sample_rate as f64;
    ((rate * ATTACK_SECS) as usize, (rate * RELEASE_SECS) as usize)
}

/// Renders a note.
///
/// # Arguments
///
/// * `frequency` - Pitch in Hz
/// * `shape` - Waveform
/// * `duration` - Length in seconds; negative or non-finite values yield an empty buffer
/// * `volume` - Amplitude in `0.0..=1.0` (clamped)
/// * `sample_rate` - Output rate in Hz
///
/// # Returns
///
/// A buffer of `round(sample_rate · duration)` stereo frames. When the
/// buffer is at least as long as the attack plus release windows, the first
/// frames ramp linearly from silence and the last frames ramp back to it.
pub fn synthesize(
    frequency: f64,
    shape: WaveShape,
    duration: f64,
    volume: f64,
    sample_rate: u32,
) -> SampleBuffer {
    let len = if duration.is_finite() && duration > 0.0 {
        (sample_rate as f64 * duration).round() as usize
    } else {
        0
    };
    let volume = if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    };
    let rate = sample_rate as f64;
    let (attack, release) = envelope_frames(sample_rate);
    let shaped = len >= attack + release;

    let frames = (0..len)
        .map(|i| {
            let t = i as f64 / rate;
            let gain = if shaped {
                envelope_gain(i, len, attack, release)
            } else {
                1.0
            };
            let value = shape.evaluate(frequency * t) * gain * volume;
            let sample = (value * I16_SCALE) as i16;
            [sample, sample]
        })
        .collect();

    SampleBuffer::from_frames(sample_rate, frames)
}

/// Linear ramp: 0→1 across the first `attack` frames, 1→0 across the last
/// `release` frames, both endpoints inclusive.
#[inline]
fn envelope_gain(i: usize, len: usize, attack: usize, release: usize) -> f64 {
    let release_start = len - release;
    if i >= release_start {
        let step = i - release_start;
        return if release > 1 {
            1.0 - step as f64 / (release - 1) as f64
        } else {
            0.0
        };
    }
    if i < attack {
        return if attack > 1 {
            i as f64 / (attack - 1) as f64
        } else {
            0.0
        };
    }
    1.0
}
