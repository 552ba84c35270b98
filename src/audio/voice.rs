//! Polyphonic voice management.
//!
//! The [`VoiceManager`] turns note-on/note-off requests into mixer
//! dispatches. Held notes (no duration) are tracked per note name so a
//! later release can fade them out; bounded notes from the sequencer stop
//! themselves and are never tracked. A global sustain flag defers every
//! release until [`VoiceManager::stop_all`].
//!
//! All mutable state sits behind one mutex, and the mixer is only called
//! while it is held. A key release from the input thread and a sequencer
//! tick from the clock thread therefore cannot interleave halfway through
//! a dispatch.

use super::bank::{InstrumentId, VoiceBank};
use super::mixer::{ChannelId, Mixer};
use super::synth::SampleBuffer;
use crate::notes::NoteId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One sounding, tracked note.
#[derive(Debug, Clone)]
pub struct ActiveVoice {
    /// The note being held.
    pub note: NoteId,
    /// Instrument it was played with.
    pub instrument: InstrumentId,
    /// Shared buffer from the voice bank.
    pub buffer: Arc<SampleBuffer>,
    /// Mixer channel it was dispatched to.
    pub channel: ChannelId,
    /// Trigger order; strictly increasing across the manager's lifetime.
    pub stamp: u64,
}

#[derive(Debug, Default)]
struct VoiceState {
    tracked: HashMap<NoteId, ActiveVoice>,
    sustain: bool,
    next_stamp: u64,
}

/// Owns the set of currently tracked voices and the sustain policy.
pub struct VoiceManager {
    bank: Arc<VoiceBank>,
    mixer: Arc<dyn Mixer>,
    fade: Duration,
    state: Mutex<VoiceState>,
}

impl VoiceManager {
    /// Creates a manager that plays buffers from `bank` through `mixer`.
    ///
    /// # Arguments
    ///
    /// * `bank` - Read-only buffer cache
    /// * `mixer` - Playback channel pool
    /// * `fade` - Fade-out applied when a held note is released
    pub fn new(bank: Arc<VoiceBank>, mixer: Arc<dyn Mixer>, fade: Duration) -> Self {
        Self {
            bank,
            mixer,
            fade,
            state: Mutex::new(VoiceState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, VoiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plays a note.
    ///
    /// With `duration`, the voice stops itself after that long and is not
    /// tracked. Without it, the voice is tracked under `note` until
    /// [`release`](Self::release) or [`stop_all`](Self::stop_all);
    /// retriggering a tracked note replaces the entry and leaves the
    /// previous sound to finish on its own.
    ///
    /// Unknown instrument/note pairs and an exhausted channel pool are not
    /// errors: the request is dropped.
    ///
    /// # Returns
    ///
    /// The channel the note was dispatched to, or `None` if it was dropped.
    pub fn trigger(
        &self,
        note: NoteId,
        instrument: &str,
        duration: Option<Duration>,
    ) -> Option<ChannelId> {
        let Some(buffer) = self.bank.lookup(instrument, note) else {
            tracing::trace!(%note, instrument, "no voice in bank, ignoring trigger");
            return None;
        };
        if duration.is_some_and(|d| d.is_zero()) {
            return None;
        }

        let mut state = self.state();
        let channel = self.dispatch(&mut state, Arc::clone(&buffer), duration)?;

        if duration.is_none() {
            let stamp = state.next_stamp;
            state.next_stamp += 1;
            state.tracked.insert(
                note,
                ActiveVoice {
                    note,
                    instrument: InstrumentId::new(instrument),
                    buffer,
                    channel,
                    stamp,
                },
            );
        }
        Some(channel)
    }

    /// Plays an arbitrary buffer once, untracked.
    pub fn play_buffer(&self, buffer: Arc<SampleBuffer>) -> Option<ChannelId> {
        let mut state = self.state();
        self.dispatch(&mut state, buffer, None)
    }

    /// Finds an idle channel and starts `buffer` on it.
    ///
    /// Tracked voices whose channel went idle are dropped first, so a
    /// finished held note never pins its channel. A channel can also go
    /// idle between that sweep and the idle scan, so any voice still
    /// tracked on the chosen channel is dropped before it is reused.
    fn dispatch(
        &self,
        state: &mut VoiceState,
        buffer: Arc<SampleBuffer>,
        limit: Option<Duration>,
    ) -> Option<ChannelId> {
        self.prune_finished(state);

        let Some(channel) = self.mixer.find_idle() else {
            tracing::debug!(
                channels = self.mixer.channel_count(),
                "channel pool exhausted, dropping voice"
            );
            return None;
        };
        state.tracked.retain(|_, voice| voice.channel != channel);

        match self.mixer.play(channel, buffer, limit) {
            Ok(()) => Some(channel),
            Err(e) => {
                tracing::debug!(channel, error = %e, "dispatch failed, dropping voice");
                None
            }
        }
    }

    fn prune_finished(&self, state: &mut VoiceState) {
        state
            .tracked
            .retain(|_, voice| self.mixer.is_busy(voice.channel));
    }

    /// Releases a held note.
    ///
    /// No-op while sustain is on. Otherwise a tracked note starts its fade
    /// and stops being tracked. A fade that fails (the channel already went
    /// quiet) is ignored.
    pub fn release(&self, note: NoteId) {
        let mut state = self.state();
        if state.sustain {
            return;
        }
        if let Some(voice) = state.tracked.remove(&note) {
            if let Err(e) = self.mixer.fade_out(voice.channel, self.fade) {
                tracing::trace!(%note, channel = voice.channel, error = %e, "fade skipped");
            }
        }
    }

    /// Silences every channel and forgets all tracked voices, sustain or not.
    pub fn stop_all(&self) {
        let mut state = self.state();
        self.mixer.stop_all();
        state.tracked.clear();
    }

    /// Enables or disables sustain.
    pub fn set_sustain(&self, sustain: bool) {
        self.state().sustain = sustain;
    }

    /// Flips sustain and returns the new value.
    pub fn toggle_sustain(&self) -> bool {
        let mut state = self.state();
        state.sustain = !state.sustain;
        state.sustain
    }

    /// Whether sustain is enabled.
    pub fn sustain(&self) -> bool {
        self.state().sustain
    }

    /// Notes currently tracked as sounding, lowest pitch first.
    pub fn active_notes(&self) -> Vec<NoteId> {
        let mut state = self.state();
        self.prune_finished(&mut state);
        let mut notes: Vec<NoteId> = state.tracked.keys().copied().collect();
        notes.sort();
        notes
    }

    /// Returns the tracked voice for `note`, if any.
    #[cfg(test)]
    pub(crate) fn tracked_voice(&self, note: NoteId) -> Option<ActiveVoice> {
        self.state().tracked.get(&note).cloned()
    }

    /// Whether `note` is currently tracked.
    #[cfg(test)]
    pub(crate) fn is_tracked(&self, note: NoteId) -> bool {
        self.state().tracked.contains_key(&note)
    }

    /// The bank this manager plays from.
    pub fn bank(&self) -> &Arc<VoiceBank> {
        &self.bank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::bank::BankSettings;
    use crate::audio::mixer::testing::{MixerCall, RecordingMixer};
    use crate::error::MixerError;

    fn note(name: &str) -> NoteId {
        NoteId::from_name(name).unwrap()
    }

    fn setup(channels: usize) -> (VoiceManager, Arc<RecordingMixer>) {
        let bank = VoiceBank::build(
            ["sine", "square"],
            NoteId::all(),
            BankSettings {
                duration_secs: 0.1,
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
    fn test_held_note_is_tracked() {
        let (voices, mixer) = setup(4);
        let channel = voices.trigger(note("C4"), "sine", None).unwrap();
        assert!(voices.is_tracked(note("C4")));
        assert_eq!(voices.tracked_voice(note("C4")).unwrap().channel, channel);
        assert_eq!(mixer.plays(), vec![(channel, None)]);
        assert_eq!(voices.active_notes(), vec![note("C4")]);
    }

    #[test]
    fn test_bounded_note_is_not_tracked() {
        let (voices, mixer) = setup(4);
        let limit = Duration::from_millis(250);
        let channel = voices.trigger(note("E4"), "square", Some(limit)).unwrap();
        assert!(!voices.is_tracked(note("E4")));
        assert_eq!(mixer.plays(), vec![(channel, Some(limit))]);
    }

    #[test]
    fn test_unknown_instrument_is_ignored() {
        let (voices, mixer) = setup(4);
        assert!(voices.trigger(note("C4"), "theremin", None).is_none());
        assert!(mixer.calls().is_empty());
        assert!(voices.active_notes().is_empty());
    }

    #[test]
    fn test_release_fades_and_untracks() {
        let (voices, mixer) = setup(4);
        let channel = voices.trigger(note("C4"), "sine", None).unwrap();
        voices.release(note("C4"));
        assert!(!voices.is_tracked(note("C4")));
        assert!(mixer.calls().contains(&MixerCall::FadeOut {
            channel,
            fade: Duration::from_millis(100),
        }));
    }

    #[test]
    fn test_release_with_sustain_keeps_voice() {
        let (voices, mixer) = setup(4);
        voices.set_sustain(true);
        voices.trigger(note("C4"), "sine", None).unwrap();
        voices.release(note("C4"));
        assert!(voices.is_tracked(note("C4")));
        assert!(!mixer
            .calls()
            .iter()
            .any(|c| matches!(c, MixerCall::FadeOut { .. })));
    }

    #[test]
    fn test_stop_all_ignores_sustain() {
        let (voices, mixer) = setup(4);
        voices.set_sustain(true);
        voices.trigger(note("C4"), "sine", None).unwrap();
        voices.trigger(note("G4"), "square", None).unwrap();
        voices.stop_all();
        assert!(voices.active_notes().is_empty());
        assert_eq!(mixer.busy_count(), 0);
        assert!(voices.sustain());
    }

    #[test]
    fn test_release_of_finished_channel_is_swallowed() {
        let (voices, mixer) = setup(4);
        let channel = voices.trigger(note("C4"), "sine", None).unwrap();
        mixer.finish(channel);
        // Either pruned or the fade fails quietly; both leave nothing tracked
        voices.release(note("C4"));
        assert!(!voices.is_tracked(note("C4")));
    }

    #[test]
    fn test_release_untracked_note_is_noop() {
        let (voices, mixer) = setup(4);
        voices.release(note("A4"));
        assert!(mixer.calls().is_empty());
    }

    #[test]
    fn test_pool_exhaustion_drops_newest() {
        let (voices, mixer) = setup(2);
        assert!(voices.trigger(note("C4"), "sine", None).is_some());
        assert!(voices.trigger(note("D4"), "sine", None).is_some());
        assert!(voices.trigger(note("E4"), "sine", None).is_none());
        assert!(voices
            .trigger(note("F4"), "sine", Some(Duration::from_millis(50)))
            .is_none());
        assert_eq!(mixer.plays().len(), 2);
        assert_eq!(voices.active_notes(), vec![note("C4"), note("D4")]);

        // Freeing a channel makes room again
        voices.release(note("C4"));
        assert!(voices.trigger(note("E4"), "sine", None).is_some());
    }

    #[test]
    fn test_retrigger_replaces_tracking() {
        let (voices, mixer) = setup(4);
        let first = voices.trigger(note("C4"), "sine", None).unwrap();
        let stamp = voices.tracked_voice(note("C4")).unwrap().stamp;
        let second = voices.trigger(note("C4"), "square", None).unwrap();
        assert_ne!(first, second);

        let voice = voices.tracked_voice(note("C4")).unwrap();
        assert_eq!(voice.channel, second);
        assert_eq!(voice.instrument.as_str(), "square");
        assert!(voice.stamp > stamp);
        // The earlier sound is left to ring out
        assert_eq!(mixer.busy_count(), 2);
        assert_eq!(voices.active_notes().len(), 1);
    }

    #[test]
    fn test_finished_voice_is_pruned() {
        let (voices, mixer) = setup(4);
        let channel = voices.trigger(note("C4"), "sine", None).unwrap();
        mixer.finish(channel);
        assert!(voices.active_notes().is_empty());
    }

    /// Channel 0 stays busy for a set number of checks, then ends on its
    /// own, like a rodio sink running out of samples mid-dispatch.
    struct EndingMixer {
        inner: RecordingMixer,
        checks_left: Mutex<Option<usize>>,
    }

    impl EndingMixer {
        fn end_after(&self, checks: usize) {
            *self.checks_left.lock().unwrap() = Some(checks);
        }
    }

    impl Mixer for EndingMixer {
        fn channel_count(&self) -> usize {
            self.inner.channel_count()
        }

        fn is_busy(&self, channel: ChannelId) -> bool {
            if channel == 0 {
                let mut checks_left = self.checks_left.lock().unwrap();
                match *checks_left {
                    Some(0) => {
                        self.inner.finish(0);
                        *checks_left = None;
                    }
                    Some(n) => *checks_left = Some(n - 1),
                    None => {}
                }
            }
            self.inner.is_busy(channel)
        }

        fn play(
            &self,
            channel: ChannelId,
            buffer: Arc<SampleBuffer>,
            limit: Option<Duration>,
        ) -> Result<(), MixerError> {
            self.inner.play(channel, buffer, limit)
        }

        fn fade_out(
            &self,
            channel: ChannelId,
            fade: Duration,
        ) -> Result<(), MixerError> {
            self.inner.fade_out(channel, fade)
        }

        fn stop_all(&self) {
            self.inner.stop_all();
        }
    }

    #[test]
    fn test_channel_ending_mid_dispatch_is_not_double_tracked() {
        let (voices, _) = setup(4);
        let mixer = Arc::new(EndingMixer {
            inner: RecordingMixer::new(4),
            checks_left: Mutex::new(None),
        });
        let voices = VoiceManager::new(
            Arc::clone(voices.bank()),
            Arc::clone(&mixer) as Arc<dyn Mixer>,
            Duration::from_millis(100),
        );

        assert_eq!(voices.trigger(note("C4"), "sine", None), Some(0));
        // Busy for the sweep over tracked voices, idle for the scan after it
        mixer.end_after(1);
        assert_eq!(voices.trigger(note("E4"), "sine", None), Some(0));

        assert!(!voices.is_tracked(note("C4")));
        assert_eq!(voices.tracked_voice(note("E4")).unwrap().channel, 0);
        assert_eq!(voices.active_notes(), vec![note("E4")]);

        // Releasing the finished note must not fade the new one
        voices.release(note("C4"));
        assert!(!mixer
            .inner
            .calls()
            .iter()
            .any(|c| matches!(c, MixerCall::FadeOut { .. })));
        assert!(voices.is_tracked(note("E4")));
    }

    #[test]
    fn test_effect_on_reused_channel_drops_stale_voice() {
        let (voices, _) = setup(4);
        let mixer = Arc::new(EndingMixer {
            inner: RecordingMixer::new(1),
            checks_left: Mutex::new(None),
        });
        let voices = VoiceManager::new(
            Arc::clone(voices.bank()),
            Arc::clone(&mixer) as Arc<dyn Mixer>,
            Duration::from_millis(100),
        );

        voices.trigger(note("G4"), "square", None).unwrap();
        mixer.end_after(1);
        let buffer = voices.bank().lookup("sine", note("C5")).unwrap();
        assert_eq!(voices.play_buffer(buffer), Some(0));
        assert!(voices.active_notes().is_empty());
    }

    #[test]
    fn test_toggle_sustain() {
        let (voices, _) = setup(1);
        assert!(!voices.sustain());
        assert!(voices.toggle_sustain());
        assert!(!voices.toggle_sustain());
    }

    #[test]
    fn test_zero_duration_is_dropped() {
        let (voices, mixer) = setup(2);
        assert!(voices
            .trigger(note("C4"), "sine", Some(Duration::ZERO))
            .is_none());
        assert!(mixer.calls().is_empty());
    }

    #[test]
    fn test_concurrent_trigger_and_release() {
        let (voices, mixer) = setup(64);
        let voices = Arc::new(voices);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let voices = Arc::clone(&voices);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let n = NoteId::from_index((t * 7 + i) % 37).unwrap();
                        voices.trigger(n, "sine", None);
                        voices.release(n);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        voices.stop_all();
        assert!(voices.active_notes().is_empty());
        assert_eq!(mixer.busy_count(), 0);
    }
}
