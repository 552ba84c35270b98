//! Sequencer transport: tempo, playhead and the tick state machine.
//!
//! The transport is either stopped or running. Starting again resumes from
//! the current playhead. Each tick fires every event that starts at the
//! playhead column, then advances the playhead by one column (wrapping at
//! the grid width). The transport does not own a timer; the
//! [`Clock`](super::clock::Clock) calls [`Transport::tick`] periodically.

use super::event::{EventId, SequencerEvent};
use super::sequence::Sequence;
use crate::audio::VoiceManager;
use crate::config::{TempoConfig, SUBDIVISIONS_PER_BEAT};
use crate::notes::NoteId;
use std::time::Duration;

/// Nanoseconds per minute, for interval math.
const NANOS_PER_MINUTE: u64 = 60_000_000_000;

/// Running or stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Not ticking.
    Stopped,
    /// Ticking at the tempo interval.
    Running,
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Column that was evaluated.
    pub column: u32,
    /// Number of events triggered at that column.
    pub fired: usize,
}

/// Tempo, playhead and grid contents.
#[derive(Debug, Clone)]
pub struct Transport {
    tempo: u32,
    limits: TempoConfig,
    playhead: u32,
    grid_width: u32,
    state: TransportState,
    /// Incremented on every start so a clock from an earlier run can tell
    /// it has been superseded.
    run_id: u64,
    sequence: Sequence,
}

/// Length of one grid column at `bpm`.
///
/// `60000 / (bpm · subdivisions)` milliseconds; 125 ms at 120 BPM.
pub fn column_interval(bpm: u32) -> Duration {
    let columns_per_minute = u64::from(bpm.max(1)) * u64::from(SUBDIVISIONS_PER_BEAT);
    Duration::from_nanos(NANOS_PER_MINUTE / columns_per_minute)
}

impl Transport {
    /// Creates a stopped transport at the default tempo with an empty grid.
    ///
    /// # Arguments
    ///
    /// * `grid_width` - Number of columns (at least 1)
    /// * `limits` - Tempo default and clamp range
    pub fn new(grid_width: u32, limits: TempoConfig) -> Self {
        Self {
            tempo: limits.clamp(limits.default),
            limits,
            playhead: 0,
            grid_width: grid_width.max(1),
            state: TransportState::Stopped,
            run_id: 0,
            sequence: Sequence::new(),
        }
    }

    /// Starts the transport and immediately fires events at the current
    /// column without advancing.
    ///
    /// # Returns
    ///
    /// false if it was already running (nothing happens in that case)
    pub fn start(&mut self, voices: &VoiceManager) -> bool {
        if self.is_running() {
            return false;
        }
        self.state = TransportState::Running;
        self.run_id += 1;
        tracing::debug!(
            column = self.playhead,
            tempo = self.tempo,
            "transport started"
        );
        self.evaluate(voices);
        true
    }

    /// Stops the transport. The playhead stays where it is.
    ///
    /// # Returns
    ///
    /// true if it was running
    pub fn stop(&mut self) -> bool {
        let was_running = self.is_running();
        self.state = TransportState::Stopped;
        if was_running {
            tracing::debug!(column = self.playhead, "transport stopped");
        }
        was_running
    }

    /// Fires events at the playhead, then advances it one column.
    pub fn tick(&mut self, voices: &VoiceManager) -> TickReport {
        let column = self.playhead;
        let fired = self.evaluate(voices);
        self.playhead = (self.playhead + 1) % self.grid_width;
        TickReport { column, fired }
    }

    /// Moves the playhead and fires events at the new column without
    /// advancing.
    ///
    /// Columns past the grid wrap around.
    pub fn set_playhead(&mut self, column: u32, voices: &VoiceManager) -> usize {
        self.playhead = column % self.grid_width;
        self.evaluate(voices)
    }

    /// Triggers every event that starts at the playhead, bounded to its
    /// length in columns.
    fn evaluate(&self, voices: &VoiceManager) -> usize {
        let interval = self.interval();
        let mut fired = 0;
        for event in self.sequence.starting_at(self.playhead) {
            let duration = interval * event.length();
            voices.trigger(event.note, event.instrument.as_str(), Some(duration));
            fired += 1;
        }
        fired
    }

    /// Sets the tempo, clamped to the configured range.
    ///
    /// While running, the new interval applies from the next tick.
    ///
    /// # Returns
    ///
    /// The tempo actually applied
    pub fn set_tempo(&mut self, bpm: u32) -> u32 {
        self.tempo = self.limits.clamp(bpm);
        tracing::debug!(tempo = self.tempo, "tempo changed");
        self.tempo
    }

    /// Changes the tempo by `steps` configured increments.
    pub fn nudge_tempo(&mut self, steps: i32) -> u32 {
        let delta = i64::from(steps) * i64::from(self.limits.step);
        let target = (i64::from(self.tempo) + delta).clamp(0, i64::from(u32::MAX));
        self.set_tempo(target as u32)
    }

    /// Duration of one column at the current tempo.
    pub fn interval(&self) -> Duration {
        column_interval(self.tempo)
    }

    /// Tempo in BPM.
    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    /// Current playhead column.
    pub fn playhead(&self) -> u32 {
        self.playhead
    }

    /// Number of grid columns.
    pub fn grid_width(&self) -> u32 {
        self.grid_width
    }

    /// Running or stopped.
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Whether the transport is running.
    pub fn is_running(&self) -> bool {
        self.state == TransportState::Running
    }

    /// Identifier of the current (or most recent) run.
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Places an event on the grid.
    pub fn add_event(&mut self, event: SequencerEvent) -> EventId {
        self.sequence.add(event)
    }

    /// Removes an event by ID.
    pub fn remove_event(&mut self, id: EventId) -> Option<SequencerEvent> {
        self.sequence.remove(id)
    }

    /// Removes the events on `note`'s row covering `column`.
    pub fn remove_at(&mut self, note: NoteId, column: u32) -> Vec<SequencerEvent> {
        self.sequence.remove_at(note, column)
    }

    /// Removes every event.
    pub fn clear(&mut self) {
        self.sequence.clear();
    }

    /// The grid contents.
    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// Replaces the grid contents wholesale.
    pub fn replace_sequence(&mut self, sequence: Sequence) {
        self.sequence = sequence;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mixer::testing::RecordingMixer;
    use crate::audio::{BankSettings, Mixer, VoiceBank};
    use std::sync::Arc;

    fn note(name: &str) -> NoteId {
        NoteId::from_name(name).unwrap()
    }

    fn voices(channels: usize) -> (VoiceManager, Arc<RecordingMixer>) {
        let bank = VoiceBank::build(
            ["sine", "square"],
            NoteId::all(),
            BankSettings {
                duration_secs: 0.05,
                volume: 0.1,
                sample_rate: 8000,
            },
        )
        .unwrap();
        let mixer = Arc::new(RecordingMixer::new(channels));
        let manager = VoiceManager::new(
            Arc::new(bank),
            Arc::clone(&mixer) as Arc<dyn Mixer>,
            Duration::from_millis(100),
        );
        (manager, mixer)
    }

    #[test]
    fn test_interval() {
        assert_eq!(column_interval(120), Duration::from_millis(125));
        assert_eq!(column_interval(60), Duration::from_millis(250));
        assert_eq!(column_interval(240), Duration::from_micros(62_500));
    }

    #[test]
    fn test_event_fires_once_per_cycle() {
        let (voices, mixer) = voices(16);
        let mut transport = Transport::new(8, TempoConfig::default());
        transport.add_event(SequencerEvent::new(note("C4"), "sine", 3, 2));

        for _ in 0..3 {
            assert_eq!(transport.tick(&voices).fired, 0);
        }
        assert_eq!(transport.playhead(), 3);

        let mut fired_at = Vec::new();
        for _ in 0..8 {
            let report = transport.tick(&voices);
            if report.fired > 0 {
                fired_at.push(report.column);
            }
        }
        assert_eq!(fired_at, vec![3]);
        assert_eq!(transport.playhead(), 3);

        let plays = mixer.plays();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].1, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_playhead_wraps() {
        let (voices, _) = voices(4);
        let mut transport = Transport::new(4, TempoConfig::default());
        let columns: Vec<u32> = (0..6).map(|_| transport.tick(&voices).column).collect();
        assert_eq!(columns, vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_start_evaluates_without_advancing() {
        let (voices, mixer) = voices(4);
        let mut transport = Transport::new(8, TempoConfig::default());
        transport.add_event(SequencerEvent::new(note("E4"), "square", 0, 1));

        assert!(transport.start(&voices));
        assert_eq!(transport.playhead(), 0);
        assert_eq!(mixer.plays().len(), 1);

        // Starting again is a no-op
        assert!(!transport.start(&voices));
        assert_eq!(mixer.plays().len(), 1);
    }

    #[test]
    fn test_stop_keeps_playhead_and_restart_resumes() {
        let (voices, _) = voices(4);
        let mut transport = Transport::new(8, TempoConfig::default());
        transport.start(&voices);
        let first_run = transport.run_id();
        transport.tick(&voices);
        transport.tick(&voices);
        assert!(transport.stop());
        assert!(!transport.stop());
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.playhead(), 2);

        transport.start(&voices);
        assert_eq!(transport.playhead(), 2);
        assert!(transport.run_id() > first_run);
    }

    #[test]
    fn test_set_playhead_fires_immediately() {
        let (voices, mixer) = voices(4);
        let mut transport = Transport::new(8, TempoConfig::default());
        transport.add_event(SequencerEvent::new(note("G4"), "sine", 5, 4));
        transport.add_event(SequencerEvent::new(note("B4"), "sine", 5, 1));

        assert_eq!(transport.set_playhead(5, &voices), 2);
        assert_eq!(transport.playhead(), 5);
        let mut limits: Vec<_> = mixer.plays().into_iter().map(|(_, l)| l).collect();
        limits.sort();
        assert_eq!(
            limits,
            vec![Some(Duration::from_millis(125)), Some(Duration::from_millis(500))]
        );

        assert_eq!(transport.set_playhead(13, &voices), 2); // wraps to 5
    }

    #[test]
    fn test_tempo_clamped_and_applies_to_durations() {
        let (voices, mixer) = voices(4);
        let mut transport = Transport::new(8, TempoConfig::default());
        assert_eq!(transport.set_tempo(1000), 240);
        assert_eq!(transport.set_tempo(1), 60);
        assert_eq!(transport.nudge_tempo(-3), 60);
        assert_eq!(transport.nudge_tempo(2), 70);

        transport.set_tempo(60);
        transport.add_event(SequencerEvent::new(note("C4"), "sine", 0, 2));
        transport.tick(&voices);
        assert_eq!(mixer.plays()[0].1, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_overlapping_events_both_sound() {
        let (voices, mixer) = voices(4);
        let mut transport = Transport::new(8, TempoConfig::default());
        transport.add_event(SequencerEvent::new(note("C4"), "sine", 0, 2));
        transport.add_event(SequencerEvent::new(note("C4"), "sine", 0, 2));
        assert_eq!(transport.tick(&voices).fired, 2);
        assert_eq!(mixer.plays().len(), 2);
    }

    #[test]
    fn test_grid_mutation_while_running() {
        let (voices, mixer) = voices(4);
        let mut transport = Transport::new(4, TempoConfig::default());
        transport.start(&voices);
        let id = transport.add_event(SequencerEvent::new(note("C4"), "sine", 1, 1));
        transport.tick(&voices); // column 0
        transport.tick(&voices); // column 1 fires
        assert_eq!(mixer.plays().len(), 1);

        assert!(transport.remove_event(id).is_some());
        for _ in 0..4 {
            transport.tick(&voices);
        }
        assert_eq!(mixer.plays().len(), 1);

        transport.add_event(SequencerEvent::new(note("D4"), "sine", 2, 1));
        transport.clear();
        assert!(transport.sequence().is_empty());
    }

    #[test]
    fn test_events_past_grid_never_fire() {
        let (voices, mixer) = voices(4);
        let mut transport = Transport::new(4, TempoConfig::default());
        transport.add_event(SequencerEvent::new(note("C4"), "sine", 10, 1));
        for _ in 0..12 {
            transport.tick(&voices);
        }
        assert!(mixer.plays().is_empty());
    }

    #[test]
    fn test_unknown_instrument_event_is_silent() {
        let (voices, mixer) = voices(4);
        let mut transport = Transport::new(4, TempoConfig::default());
        transport.add_event(SequencerEvent::new(note("C4"), "banjo", 0, 1));
        assert_eq!(transport.tick(&voices).fired, 1);
        assert!(mixer.plays().is_empty());
    }
}
