//! The collaborator-facing synthesizer API.
//!
//! [`Engine`] owns the voice bank, the voice manager, the sequencer
//! transport and its clock. A front end (the terminal binary, or a test)
//! only calls into it; nothing here reaches back into the caller.
//!
//! Locks are always taken in the order clock slot, transport, voice state.

use crate::audio::{ChannelId, InstrumentId, Mixer, SoundEffect, VoiceBank, VoiceManager};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::notes::NoteId;
use crate::sequencer::{
    Clock, EventId, GridLayout, Sequence, SequencerEvent, TickReport, Transport, TransportState,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A running synthesizer: live notes plus a step sequencer.
pub struct Engine {
    config: EngineConfig,
    layout: GridLayout,
    voices: Arc<VoiceManager>,
    transport: Arc<Mutex<Transport>>,
    /// Clock for the current run, if the transport was started here.
    clock: Mutex<Option<Clock>>,
    /// Index into the bank's instrument list.
    instrument: AtomicUsize,
}

impl Engine {
    /// Builds the voice bank for every configured instrument and note and
    /// wires it to `mixer`.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or an instrument is
    /// not a wave shape.
    pub fn new(config: EngineConfig, mixer: Arc<dyn Mixer>) -> Result<Self, EngineError> {
        config.validate()?;
        let bank = VoiceBank::build(
            config.instruments.iter().map(String::as_str),
            NoteId::all(),
            config.bank_settings(),
        )?;
        Self::with_bank(config, Arc::new(bank), mixer)
    }

    /// Creates an engine around an already built bank.
    ///
    /// The instrument cycle follows the bank's instrument order.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the bank has no
    /// instruments.
    pub fn with_bank(
        config: EngineConfig,
        bank: Arc<VoiceBank>,
        mixer: Arc<dyn Mixer>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        if bank.instruments().is_empty() {
            return Err(EngineError::Config("voice bank has no instruments".into()));
        }

        let layout = config.layout();
        let voices = Arc::new(VoiceManager::new(bank, mixer, config.fade_out()));
        let transport = Transport::new(config.grid_width, config.tempo);

        Ok(Self {
            config,
            layout,
            voices,
            transport: Arc::new(Mutex::new(transport)),
            clock: Mutex::new(None),
            instrument: AtomicUsize::new(0),
        })
    }

    fn transport(&self) -> MutexGuard<'_, Transport> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn clock_slot(&self) -> MutexGuard<'_, Option<Clock>> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared voice bank.
    pub fn bank(&self) -> &Arc<VoiceBank> {
        self.voices.bank()
    }

    // ---- Instruments ----

    /// Instruments in cycling order.
    pub fn instruments(&self) -> &[InstrumentId] {
        self.bank().instruments()
    }

    /// The instrument used when a call does not name one.
    pub fn current_instrument(&self) -> InstrumentId {
        let instruments = self.instruments();
        instruments[self.instrument.load(Ordering::Relaxed) % instruments.len()].clone()
    }

    /// Selects the next instrument, wrapping after the last.
    ///
    /// # Returns
    ///
    /// The newly selected instrument.
    pub fn cycle_instrument(&self) -> InstrumentId {
        let count = self.instruments().len();
        let previous = self
            .instrument
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |i| Some((i + 1) % count))
            .unwrap_or_else(|i| i);
        let selected = self.instruments()[(previous + 1) % count].clone();
        tracing::debug!(instrument = %selected, "instrument selected");
        selected
    }

    // ---- Live notes ----

    /// Plays a note with the given or current instrument.
    ///
    /// Without a duration the note is held until [`stop_note`](Self::stop_note).
    ///
    /// # Returns
    ///
    /// The channel used, or `None` if the note was dropped (unknown
    /// instrument, or every channel busy).
    pub fn play_note(
        &self,
        note: NoteId,
        instrument: Option<&str>,
        duration: Option<Duration>,
    ) -> Option<ChannelId> {
        match instrument {
            Some(instrument) => self.voices.trigger(note, instrument, duration),
            None => {
                let current = self.current_instrument();
                self.voices.trigger(note, current.as_str(), duration)
            }
        }
    }

    /// Releases a held note (fades it unless sustain is on).
    pub fn stop_note(&self, note: NoteId) {
        self.voices.release(note);
    }

    /// Plays a short bounded voice, as when a note is placed on the grid.
    pub fn preview_note(&self, note: NoteId, instrument: Option<&str>) -> Option<ChannelId> {
        self.play_note(note, instrument, Some(self.config.preview()))
    }

    /// Plays an interface sound through the shared channel pool.
    pub fn play_effect(&self, effect: SoundEffect) -> Option<ChannelId> {
        let buffer = effect.render(self.bank().settings().sample_rate);
        self.voices.play_buffer(Arc::new(buffer))
    }

    /// Silences everything, sustained notes included.
    pub fn stop_all(&self) {
        self.voices.stop_all();
    }

    /// Flips sustain and returns the new value.
    pub fn toggle_sustain(&self) -> bool {
        let sustain = self.voices.toggle_sustain();
        tracing::debug!(sustain, "sustain toggled");
        sustain
    }

    /// Enables or disables sustain.
    pub fn set_sustain(&self, sustain: bool) {
        self.voices.set_sustain(sustain);
    }

    /// Whether sustain is on.
    pub fn sustain(&self) -> bool {
        self.voices.sustain()
    }

    /// Notes currently held, lowest first. For highlighting keys.
    pub fn active_notes(&self) -> Vec<NoteId> {
        self.voices.active_notes()
    }

    // ---- Transport ----

    /// Starts the sequencer from the current playhead.
    ///
    /// Events at the playhead fire immediately; a clock then ticks once per
    /// column.
    ///
    /// # Returns
    ///
    /// false if it was already running
    pub fn start(&self) -> bool {
        let mut slot = self.clock_slot();
        if !self.transport().start(&self.voices) {
            return false;
        }
        // A leftover clock belongs to an older run and exits on its own
        slot.take();
        *slot = Some(Clock::spawn(
            Arc::clone(&self.transport),
            Arc::clone(&self.voices),
        ));
        true
    }

    /// Stops the sequencer and silences every voice.
    ///
    /// Once this returns no further tick fires and nothing is tracked.
    ///
    /// # Returns
    ///
    /// true if it was running
    pub fn stop(&self) -> bool {
        let mut slot = self.clock_slot();
        let was_running = self.transport().stop();
        if let Some(clock) = slot.take() {
            clock.stop();
        }
        self.voices.stop_all();
        was_running
    }

    /// Runs one tick by hand: fires events at the playhead, then advances.
    pub fn tick(&self) -> TickReport {
        self.transport().tick(&self.voices)
    }

    /// Moves the playhead (wrapping) and fires events at the new column.
    ///
    /// # Returns
    ///
    /// Number of events fired.
    pub fn set_playhead(&self, column: u32) -> usize {
        self.transport().set_playhead(column, &self.voices)
    }

    /// Sets the tempo, clamped to the configured range. A running clock
    /// picks it up from the next tick.
    pub fn set_tempo(&self, bpm: u32) -> u32 {
        self.transport().set_tempo(bpm)
    }

    /// Moves the tempo by `steps` configured steps.
    pub fn nudge_tempo(&self, steps: i32) -> u32 {
        self.transport().nudge_tempo(steps)
    }

    /// Current tempo in BPM.
    pub fn tempo(&self) -> u32 {
        self.transport().tempo()
    }

    /// Current playhead column.
    pub fn playhead(&self) -> u32 {
        self.transport().playhead()
    }

    /// Number of columns in the grid.
    pub fn grid_width(&self) -> u32 {
        self.transport().grid_width()
    }

    /// Running or stopped.
    pub fn state(&self) -> TransportState {
        self.transport().state()
    }

    /// Whether the sequencer is running.
    pub fn is_running(&self) -> bool {
        self.transport().is_running()
    }

    // ---- Grid ----

    /// Places an event on the grid.
    pub fn add_event(&self, event: SequencerEvent) -> EventId {
        self.transport().add_event(event)
    }

    /// Removes an event by ID.
    pub fn remove_event(&self, id: EventId) -> Option<SequencerEvent> {
        self.transport().remove_event(id)
    }

    /// Removes every event on `note`'s row that covers `column`.
    pub fn remove_at(&self, note: NoteId, column: u32) -> Vec<SequencerEvent> {
        self.transport().remove_at(note, column)
    }

    /// Empties the grid.
    pub fn clear(&self) {
        self.transport().clear();
    }

    /// Snapshot of the grid.
    pub fn sequence(&self) -> Sequence {
        self.transport().sequence().clone()
    }

    // ---- Persistence ----

    /// Writes the grid to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save_sequence<P: AsRef<Path>>(&self, path: P) -> Result<(), EngineError> {
        let sequence = self.sequence();
        sequence.save_to_file(path.as_ref(), self.layout)?;
        tracing::info!(
            events = sequence.len(),
            path = %path.as_ref().display(),
            "saved sequence"
        );
        Ok(())
    }

    /// Replaces the grid with the contents of a JSON file.
    ///
    /// The grid is left untouched unless every record loads.
    ///
    /// # Returns
    ///
    /// Number of events loaded.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or any record is malformed
    pub fn load_sequence<P: AsRef<Path>>(&self, path: P) -> Result<usize, EngineError> {
        let path = path.as_ref();
        let sequence = Sequence::load_from_file(path, self.layout).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to load sequence");
            e
        })?;
        let events = sequence.len();
        self.transport().replace_sequence(sequence);
        tracing::info!(events, path = %path.display(), "loaded sequence");
        Ok(events)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let clock = self
            .clock
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(clock) = clock {
            self.transport().stop();
            clock.stop();
        }
    }
}
