//! Precomputed note buffers.
//!
//! The [`VoiceBank`] holds one synthesized [`SampleBuffer`] for every
//! instrument × note pair. It is built once at startup (in parallel with
//! rayon) and is read-only afterwards, so lookups need no locking.

use super::synth::{synthesize, SampleBuffer, WaveShape};
use crate::error::SynthError;
use crate::notes::NoteId;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Name of an instrument (a wave shape selector such as `"sine"`).
///
/// Kept as a string so that persisted sequences and callers can name
/// instruments the bank does not have; such lookups simply miss.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Creates an instrument id from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The instrument name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstrumentId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<WaveShape> for InstrumentId {
    fn from(shape: WaveShape) -> Self {
        Self::new(shape.name())
    }
}

impl Borrow<str> for InstrumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters applied to every buffer in the bank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BankSettings {
    /// Buffer length in seconds.
    pub duration_secs: f64,
    /// Amplitude in `0.0..=1.0`.
    pub volume: f64,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for BankSettings {
    fn default() -> Self {
        Self {
            duration_secs: 4.0,
            volume: 0.1,
            sample_rate: crate::config::DEFAULT_SAMPLE_RATE,
        }
    }
}

/// Read-only cache of synthesized notes keyed by instrument and note.
#[derive(Debug, Default)]
pub struct VoiceBank {
    /// Instruments in the order they were requested (cycling order).
    instruments: Vec<InstrumentId>,
    voices: HashMap<InstrumentId, HashMap<NoteId, Arc<SampleBuffer>>>,
    settings: BankSettings,
}

impl VoiceBank {
    /// Synthesizes every instrument × note combination.
    ///
    /// # Arguments
    ///
    /// * `instruments` - Instrument names; each must parse as a [`WaveShape`]
    /// * `notes` - Notes to render for every instrument
    /// * `settings` - Duration, volume and sample rate shared by all buffers
    ///
    /// # Errors
    ///
    /// Returns [`SynthError::UnknownShape`] if any instrument is not a wave
    /// shape. Nothing is built in that case.
    pub fn build<I, N>(instruments: I, notes: N, settings: BankSettings) -> Result<Self, SynthError>
    where
        I: IntoIterator,
        I::Item: Into<InstrumentId>,
        N: IntoIterator<Item = NoteId>,
    {
        let started = Instant::now();

        // Resolve every shape before rendering anything
        let mut resolved: Vec<(InstrumentId, WaveShape)> = Vec::new();
        for instrument in instruments {
            let instrument: InstrumentId = instrument.into();
            let shape: WaveShape = instrument.as_str().parse()?;
            if !resolved.iter().any(|(existing, _)| *existing == instrument) {
                resolved.push((instrument, shape));
            }
        }
        let notes: Vec<NoteId> = notes.into_iter().collect();

        let jobs: Vec<(usize, WaveShape, NoteId)> = resolved
            .iter()
            .enumerate()
            .flat_map(|(i, (_, shape))| notes.iter().map(move |&note| (i, *shape, note)))
            .collect();

        let rendered: Vec<(usize, NoteId, SampleBuffer)> = jobs
            .into_par_iter()
            .map(|(i, shape, note)| {
                let buffer = synthesize(
                    note.frequency(),
                    shape,
                    settings.duration_secs,
                    settings.volume,
                    settings.sample_rate,
                );
                (i, note, buffer)
            })
            .collect();

        let mut voices: HashMap<InstrumentId, HashMap<NoteId, Arc<SampleBuffer>>> = resolved
            .iter()
            .map(|(instrument, _)| (instrument.clone(), HashMap::with_capacity(notes.len())))
            .collect();
        for (i, note, buffer) in rendered {
            if let Some(per_note) = voices.get_mut(&resolved[i].0) {
                per_note.insert(note, Arc::new(buffer));
            }
        }

        let bank = Self {
            instruments: resolved.into_iter().map(|(instrument, _)| instrument).collect(),
            voices,
            settings,
        };
        tracing::info!(
            voices = bank.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "synthesized voice bank"
        );
        Ok(bank)
    }

    /// Returns the buffer for an instrument/note pair, or `None` if the
    /// bank does not have it.
    pub fn lookup(&self, instrument: &str, note: NoteId) -> Option<Arc<SampleBuffer>> {
        self.voices.get(instrument)?.get(&note).cloned()
    }

    /// Instruments in cycling order.
    pub fn instruments(&self) -> &[InstrumentId] {
        &self.instruments
    }

    /// Settings the bank was built with.
    pub fn settings(&self) -> BankSettings {
        self.settings
    }

    /// Total number of buffers.
    pub fn len(&self) -> usize {
        self.voices.values().map(HashMap::len).sum()
    }

    /// True if the bank holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
