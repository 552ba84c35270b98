//! The sequence: every event on the grid, plus its save format.
//!
//! On disk a sequence is a JSON list of records in grid pixel units:
//!
//! ```json
//! [{ "x": 120.0, "y": 250.0, "w": 80.0, "h": 25.0, "note": "C4", "inst": "sine" }]
//! ```
//!
//! `x`/`w` are the start column and length multiplied by the cell width.
//! `y`/`h` are written for compatibility with the grid editor and ignored on
//! load; the note name decides the row. Loading is all-or-nothing.

use super::event::{EventId, SequencerEvent};
use crate::error::SequenceError;
use crate::notes::NoteId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tolerance when converting pixel positions back to columns.
const COLUMN_EPSILON: f64 = 1e-6;

/// Size of one grid cell in the persisted format's units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    /// Width of one column.
    pub cell_width: f64,
    /// Height of one row.
    pub cell_height: f64,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            cell_width: 40.0,
            cell_height: 25.0,
        }
    }
}

/// One persisted note record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SavedNote {
    x: f64,
    #[serde(default)]
    y: f64,
    w: f64,
    #[serde(default)]
    h: f64,
    note: String,
    inst: String,
}

impl SavedNote {
    fn from_event(event: &SequencerEvent, layout: GridLayout) -> Self {
        Self {
            x: event.start as f64 * layout.cell_width,
            y: event.note.grid_row() as f64 * layout.cell_height,
            w: event.length() as f64 * layout.cell_width,
            h: layout.cell_height,
            note: event.note.name().to_string(),
            inst: event.instrument.to_string(),
        }
    }

    fn into_event(self, index: usize, layout: GridLayout) -> Result<SequencerEvent, SequenceError> {
        let invalid = |reason: String| SequenceError::InvalidRecord { index, reason };

        let note: NoteId = self
            .note
            .parse()
            .map_err(|e: crate::notes::UnknownNote| invalid(e.to_string()))?;

        if !self.x.is_finite() || self.x < 0.0 {
            return Err(invalid(format!("x must be a non-negative number, got {}", self.x)));
        }
        let start = (self.x / layout.cell_width + COLUMN_EPSILON).floor();
        if start > u32::MAX as f64 {
            return Err(invalid(format!("x is out of range: {}", self.x)));
        }

        if !self.w.is_finite() {
            return Err(invalid(format!("w must be a number, got {}", self.w)));
        }
        let length = (self.w / layout.cell_width).round();
        if length < 1.0 {
            return Err(invalid(format!("w must span at least one cell, got {}", self.w)));
        }
        if length > u32::MAX as f64 {
            return Err(invalid(format!("w is out of range: {}", self.w)));
        }

        if self.inst.trim().is_empty() {
            return Err(invalid("inst must not be empty".to_string()));
        }

        Ok(SequencerEvent::new(
            note,
            self.inst.as_str(),
            start as u32,
            length as u32,
        ))
    }
}

/// An unordered collection of grid events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequence {
    events: Vec<SequencerEvent>,
}

impl Sequence {
    /// Creates an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an event and returns its ID.
    pub fn add(&mut self, event: SequencerEvent) -> EventId {
        let id = event.id;
        self.events.push(event);
        id
    }

    /// Removes an event by ID.
    ///
    /// # Returns
    ///
    /// The removed event, or None if not found
    pub fn remove(&mut self, id: EventId) -> Option<SequencerEvent> {
        let pos = self.events.iter().position(|e| e.id == id)?;
        Some(self.events.remove(pos))
    }

    /// Removes every event on `note`'s row that covers `column`.
    pub fn remove_at(&mut self, note: NoteId, column: u32) -> Vec<SequencerEvent> {
        let (removed, kept) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|e| e.note == note && e.covers(column));
        self.events = kept;
        removed
    }

    /// Removes every event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// All events, in insertion order.
    pub fn events(&self) -> &[SequencerEvent] {
        &self.events
    }

    /// Events that begin at `column`.
    pub fn starting_at(&self, column: u32) -> impl Iterator<Item = &SequencerEvent> {
        self.events.iter().filter(move |e| e.start == column)
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serializes the sequence to its JSON record list.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self, layout: GridLayout) -> Result<String, serde_json::Error> {
        let records: Vec<SavedNote> = self
            .events
            .iter()
            .map(|e| SavedNote::from_event(e, layout))
            .collect();
        serde_json::to_string_pretty(&records)
    }

    /// Parses a sequence from its JSON record list.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::Json`] if the text is not a list of records
    /// and [`SequenceError::InvalidRecord`] for the first record with an
    /// unknown note or out-of-range geometry.
    pub fn from_json(json: &str, layout: GridLayout) -> Result<Self, SequenceError> {
        let records: Vec<SavedNote> = serde_json::from_str(json)?;
        let events = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| record.into_event(index, layout))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { events })
    }

    /// Saves the sequence to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file writing fails
    pub fn save_to_file<P: AsRef<Path>>(
        &self,
        path: P,
        layout: GridLayout,
    ) -> Result<(), SequenceError> {
        let json = self.to_json(layout)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Loads a sequence from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if file reading or parsing fails
    pub fn load_from_file<P: AsRef<Path>>(path: P, layout: GridLayout) -> Result<Self, SequenceError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json, layout)
    }
}

impl FromIterator<SequencerEvent> for Sequence {
    fn from_iter<T: IntoIterator<Item = SequencerEvent>>(iter: T) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}
