//! Note names and the fixed pitch table.
//!
//! Every pitch the keyboard or the sequencer grid can reference lives in
//! [`NOTE_TABLE`]. A [`NoteId`] can only be constructed from an entry of
//! that table, so an unknown note name is rejected at the boundary (parsing
//! or deserialization) rather than deep inside playback.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Pitch class names within an octave, sharps only.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Chromatic table from C3 to C6 (equal temperament, A4 = 440 Hz).
pub const NOTE_TABLE: [(&str, f64); 37] = [
    ("C3", 130.81),
    ("C#3", 138.59),
    ("D3", 146.83),
    ("D#3", 155.56),
    ("E3", 164.81),
    ("F3", 174.61),
    ("F#3", 185.00),
    ("G3", 196.00),
    ("G#3", 207.65),
    ("A3", 220.00),
    ("A#3", 233.08),
    ("B3", 246.94),
    ("C4", 261.63),
    ("C#4", 277.18),
    ("D4", 293.66),
    ("D#4", 311.13),
    ("E4", 329.63),
    ("F4", 349.23),
    ("F#4", 369.99),
    ("G4", 392.00),
    ("G#4", 415.30),
    ("A4", 440.00),
    ("A#4", 466.16),
    ("B4", 493.88),
    ("C5", 523.25),
    ("C#5", 554.37),
    ("D5", 587.33),
    ("D#5", 622.25),
    ("E5", 659.25),
    ("F5", 698.46),
    ("F#5", 739.99),
    ("G5", 783.99),
    ("G#5", 830.61),
    ("A5", 880.00),
    ("A#5", 932.33),
    ("B5", 987.77),
    ("C6", 1046.50),
];

/// Identifier for a pitch in [`NOTE_TABLE`].
///
/// Internally an index into the table; displayed and serialized as the
/// note name (`"C4"`, `"F#5"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId(u8);

impl NoteId {
    /// Looks up a note by name. Returns `None` for names not in the table.
    ///
    /// Accepts flat spellings (`"Db4"`) by normalizing them to the sharp
    /// spelling the table uses.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Some(index) = NOTE_TABLE.iter().position(|(n, _)| *n == name) {
            return Some(Self(index as u8));
        }

        let sharp = flat_to_sharp(name)?;
        NOTE_TABLE
            .iter()
            .position(|(n, _)| *n == sharp)
            .map(|index| Self(index as u8))
    }

    /// Returns the note at `index` in [`NOTE_TABLE`], if any.
    pub fn from_index(index: usize) -> Option<Self> {
        (index < NOTE_TABLE.len()).then_some(Self(index as u8))
    }

    /// Iterates over every known note from lowest to highest.
    pub fn all() -> impl Iterator<Item = NoteId> {
        (0..NOTE_TABLE.len()).map(|i| Self(i as u8))
    }

    /// The note name, e.g. `"C#4"`.
    pub fn name(self) -> &'static str {
        NOTE_TABLE[self.0 as usize].0
    }

    /// Frequency in Hertz.
    pub fn frequency(self) -> f64 {
        NOTE_TABLE[self.0 as usize].1
    }

    /// Position in the table (0 = lowest pitch).
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Grid row for this note. Row 0 is the highest pitch, matching a
    /// piano roll drawn top-down.
    pub fn grid_row(self) -> usize {
        NOTE_TABLE.len() - 1 - self.index()
    }
}

/// Rewrites `"Db4"` as `"C#4"`. Returns `None` if the name is not a flat.
fn flat_to_sharp(name: &str) -> Option<String> {
    let octave_start = name.chars().position(|c| c.is_ascii_digit() || c == '-')?;
    let (pitch, octave) = name.split_at(octave_start);
    let base = pitch.strip_suffix('b')?;
    let index = NOTE_NAMES.iter().position(|&n| n == base)?;
    let octave: i32 = octave.parse().ok()?;

    // Cb wraps down into the previous octave
    let (index, octave) = if index == 0 {
        (11, octave - 1)
    } else {
        (index - 1, octave)
    };
    Some(format!("{}{}", NOTE_NAMES[index], octave))
}

/// Error returned when parsing a note name that is not in the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown note name: {0:?}")]
pub struct UnknownNote(pub String);

impl FromStr for NoteId {
    type Err = UnknownNote;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownNote(s.to_string()))
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for NoteId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for NoteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        let c4 = NoteId::from_name("C4").unwrap();
        assert_eq!(c4.name(), "C4");
        assert!((c4.frequency() - 261.63).abs() < 1e-9);

        let a4: NoteId = "A4".parse().unwrap();
        assert_eq!(a4.frequency(), 440.0);
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert!(NoteId::from_name("H4").is_none());
        assert!(NoteId::from_name("C9").is_none());
        assert!(NoteId::from_name("").is_none());
        assert!("Cb3".parse::<NoteId>().is_err()); // would be B2, below the table
    }

    #[test]
    fn test_flat_spelling() {
        assert_eq!(NoteId::from_name("Db4"), NoteId::from_name("C#4"));
        assert_eq!(NoteId::from_name("Cb4"), NoteId::from_name("B3"));
    }

    #[test]
    fn test_table_is_ascending_and_complete() {
        let notes: Vec<_> = NoteId::all().collect();
        assert_eq!(notes.len(), 37);
        for pair in notes.windows(2) {
            assert!(pair[0].frequency() < pair[1].frequency());
        }
        // Each octave step doubles the frequency (within rounding)
        let c3 = NoteId::from_name("C3").unwrap().frequency();
        let c6 = NoteId::from_name("C6").unwrap().frequency();
        assert!((c6 / c3 - 8.0).abs() < 0.01);
    }

    #[test]
    fn test_grid_row_is_top_down() {
        assert_eq!(NoteId::from_name("C6").unwrap().grid_row(), 0);
        assert_eq!(NoteId::from_name("C3").unwrap().grid_row(), 36);
    }

    #[test]
    fn test_serde_uses_names() {
        let note = NoteId::from_name("F#5").unwrap();
        let json = serde_json::to_string(&note).unwrap();
        assert_eq!(json, "\"F#5\"");
        let back: NoteId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, note);
        assert!(serde_json::from_str::<NoteId>("\"X1\"").is_err());
    }
}
