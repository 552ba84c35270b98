//! Computer keyboard to piano key mapping.

use crate::notes::NoteId;

/// Maps computer keyboard characters to note names.
/// Two-row layout like a piano: the bottom row is white keys, the row above
/// holds the black keys.
pub const KEYBOARD_MAP: [(char, &str); 29] = [
    // Lower row (Z-M) = C3 to B3
    ('z', "C3"),
    ('s', "C#3"),
    ('x', "D3"),
    ('d', "D#3"),
    ('c', "E3"),
    ('v', "F3"),
    ('g', "F#3"),
    ('b', "G3"),
    ('h', "G#3"),
    ('n', "A3"),
    ('j', "A#3"),
    ('m', "B3"),
    // Upper row (Q-P) = C4 to E5
    ('q', "C4"),
    ('2', "C#4"),
    ('w', "D4"),
    ('3', "D#4"),
    ('e', "E4"),
    ('r', "F4"),
    ('5', "F#4"),
    ('t', "G4"),
    ('6', "G#4"),
    ('y', "A4"),
    ('7', "A#4"),
    ('u', "B4"),
    ('i', "C5"),
    ('9', "C#5"),
    ('o', "D5"),
    ('0', "D#5"),
    ('p', "E5"),
];

/// Resolves a typed character to a note, ignoring case.
pub fn note_for_key(key: char) -> Option<NoteId> {
    let key = key.to_ascii_lowercase();
    KEYBOARD_MAP
        .iter()
        .find(|(k, _)| *k == key)
        .and_then(|(_, name)| NoteId::from_name(name))
}
