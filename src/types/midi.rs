// Copyright (c) 2024 Mike Tsao

use serde::{Deserialize, Serialize};
use synonym::Synonym;

pub use midly::num::u4;

/// Newtype for MIDI channel.
#[derive(Synonym, Serialize, Deserialize)]
pub struct MidiChannel(pub u8);
#[allow(missing_docs)]
impl MidiChannel {
    pub const MIN_VALUE: u8 = 0;
    pub const MAX_VALUE: u8 = 15; // inclusive
    pub const DRUM_VALUE: u8 = 10;
    pub const DRUM: Self = Self(Self::DRUM_VALUE);

    /// Out-of-range values are clamped to the highest channel.
    pub const fn new(value: u8) -> Self {
        if value > Self::MAX_VALUE {
            Self(Self::MAX_VALUE)
        } else {
            Self(value)
        }
    }
}
impl From<u4> for MidiChannel {
    fn from(value: u4) -> Self {
        Self(value.as_int())
    }
}

/// A MIDI note number, 0..=127. Middle C is 60.
pub type MidiNote = u8;

/// The highest valid [MidiNote].
pub const MIDI_NOTE_MAX: MidiNote = 127;

/// Returns a human-readable name for a MIDI note, like `C4` for 60.
pub fn note_name(note: MidiNote) -> String {
    let octave = (note as i32 / 12) - 1;
    format!("{}{}", pitch_class_name(note), octave)
}

/// The name of a note's pitch class, without the octave (61 is "C#").
pub fn pitch_class_name(note: MidiNote) -> &'static str {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    NAMES[(note % 12) as usize]
}
