//! Periodic timer that drives [`Transport::tick`].
//!
//! A clock is a background thread that waits one column interval, locks
//! the transport, ticks it, and reschedules using the interval at that
//! moment (so tempo changes apply from the next tick). Dropping the clock
//! wakes the thread and ends it.
//!
//! Stopping always wins over an in-flight tick: the thread re-checks, under
//! the transport lock, that the transport is still running the same run it
//! was started for before ticking.

use super::transport::Transport;
use crate::audio::VoiceManager;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Handle to a running clock thread.
pub struct Clock {
    /// Dropping this wakes the thread.
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Clock {
    /// Spawns a clock for the transport's current run.
    ///
    /// The first tick happens one interval from now; the caller is expected
    /// to have evaluated the current column already (see
    /// [`Transport::start`]).
    pub fn spawn(transport: Arc<Mutex<Transport>>, voices: Arc<VoiceManager>) -> Self {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let (run_id, interval) = {
            let transport = transport.lock().unwrap_or_else(PoisonError::into_inner);
            (transport.run_id(), transport.interval())
        };

        let thread = thread::Builder::new()
            .name("sequencer-clock".into())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match cancelled.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        // Cancelled or handle dropped
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let mut transport = transport.lock().unwrap_or_else(PoisonError::into_inner);
                    if !transport.is_running() || transport.run_id() != run_id {
                        break;
                    }
                    transport.tick(&voices);
                    deadline += transport.interval();

                    // Fell far behind (e.g. the process was suspended); resync
                    let now = Instant::now();
                    if deadline < now {
                        deadline = now;
                    }
                }
                tracing::trace!(run_id, "sequencer clock exited");
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("failed to spawn sequencer clock: {}", e);
                None
            }
        };

        Self {
            cancel: Some(cancel),
            thread,
        }
    }

    /// Cancels the clock and waits for its thread to finish.
    ///
    /// Must not be called while holding the transport lock.
    pub fn stop(mut self) {
        self.cancel.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        // Wakes the thread; it exits on its own without being joined
        self.cancel.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mixer::testing::RecordingMixer;
    use crate::audio::{BankSettings, Mixer, VoiceBank};
    use crate::config::TempoConfig;
    use crate::notes::NoteId;
    use crate::sequencer::SequencerEvent;
    use std::time::Duration;

    fn setup() -> (Arc<Mutex<Transport>>, Arc<VoiceManager>, Arc<RecordingMixer>) {
        let bank = VoiceBank::build(
            ["sine"],
            NoteId::all(),
            BankSettings {
                duration_secs: 0.05,
                volume: 0.1,
                sample_rate: 8000,
            },
        )
        .unwrap();
        let mixer = Arc::new(RecordingMixer::new(64));
        let voices = Arc::new(VoiceManager::new(
            Arc::new(bank),
            Arc::clone(&mixer) as Arc<dyn Mixer>,
            Duration::from_millis(10),
        ));
        let mut transport = Transport::new(4, TempoConfig::default());
        transport.set_tempo(240); // 62.5 ms per column
        (Arc::new(Mutex::new(transport)), voices, mixer)
    }

    #[test]
    fn test_clock_advances_playhead() {
        let (transport, voices, _) = setup();
        transport.lock().unwrap().start(&voices);
        let clock = Clock::spawn(Arc::clone(&transport), Arc::clone(&voices));

        let deadline = Instant::now() + Duration::from_secs(5);
        while transport.lock().unwrap().playhead() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_ne!(transport.lock().unwrap().playhead(), 0);

        transport.lock().unwrap().stop();
        clock.stop();
    }

    #[test]
    fn test_no_ticks_after_stop() {
        let (transport, voices, mixer) = setup();
        {
            let mut transport = transport.lock().unwrap();
            for column in 0..4 {
                transport.add_event(SequencerEvent::new(
                    NoteId::from_index(column).unwrap(),
                    "sine",
                    column as u32,
                    1,
                ));
            }
            transport.start(&voices);
        }
        let clock = Clock::spawn(Arc::clone(&transport), Arc::clone(&voices));
        thread::sleep(Duration::from_millis(150));

        transport.lock().unwrap().stop();
        clock.stop();
        voices.stop_all();
        mixer.clear_calls();
        let playhead = transport.lock().unwrap().playhead();

        thread::sleep(Duration::from_millis(200));
        assert!(mixer.plays().is_empty());
        assert_eq!(transport.lock().unwrap().playhead(), playhead);
    }

    #[test]
    fn test_stale_clock_does_not_tick_a_new_run() {
        let (transport, voices, _) = setup();
        transport.lock().unwrap().start(&voices);
        let stale = Clock::spawn(Arc::clone(&transport), Arc::clone(&voices));

        // Restart without cancelling: the old run id no longer matches
        {
            let mut transport = transport.lock().unwrap();
            transport.stop();
            transport.start(&voices);
        }
        thread::sleep(Duration::from_millis(300));
        assert_eq!(transport.lock().unwrap().playhead(), 0);

        transport.lock().unwrap().stop();
        stale.stop();
    }
}
