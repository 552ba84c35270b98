//! A note placed on the sequencer grid.

use crate::audio::InstrumentId;
use crate::notes::NoteId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique event IDs.
static EVENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an event on the grid.
/// Lets the caller remove a specific event even when others overlap it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    /// Generates a new unique event ID.
    ///
    /// Thread-safe: uses atomic increment internally.
    pub fn new() -> Self {
        Self(EVENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// One placed note: pitch, instrument, start column and length in columns.
///
/// Overlapping events, even on the same row, are legal and all sound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerEvent {
    /// Unique identifier for this event instance.
    pub id: EventId,

    /// Pitch to play.
    pub note: NoteId,

    /// Instrument to play it with.
    pub instrument: InstrumentId,

    /// Column where the note starts.
    pub start: u32,

    /// Length in columns. Always at least 1.
    length: u32,
}

impl SequencerEvent {
    /// Creates a new event with a fresh ID.
    ///
    /// # Arguments
    ///
    /// * `note` - Pitch
    /// * `instrument` - Instrument name
    /// * `start` - Start column
    /// * `length` - Length in columns (zero is raised to 1)
    ///
    /// # Examples
    ///
    /// ```
    /// use tuneboy::notes::NoteId;
    /// use tuneboy::sequencer::SequencerEvent;
    ///
    /// let c4 = NoteId::from_name("C4").unwrap();
    /// let event = SequencerEvent::new(c4, "sine", 3, 2);
    /// assert_eq!(event.end(), 5);
    /// ```
    pub fn new(note: NoteId, instrument: impl Into<InstrumentId>, start: u32, length: u32) -> Self {
        Self {
            id: EventId::new(),
            note,
            instrument: instrument.into(),
            start,
            length: length.max(1),
        }
    }

    /// Length in columns.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Column just past the end of the event.
    pub fn end(&self) -> u32 {
        self.start.saturating_add(self.length)
    }

    /// Checks if the event covers `column`.
    pub fn covers(&self, column: u32) -> bool {
        column >= self.start && column < self.end()
    }
}
