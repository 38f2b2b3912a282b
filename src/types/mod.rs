// Copyright (c) 2024 Mike Tsao

//! Common data types used throughout the system.

/// The most commonly used imports.
pub mod prelude {
    pub use super::{
        AudioCommand, CommandKind, MidiChannel, MidiNote, Seconds, Subdivision, Tempo,
        TimeSignature, Uid, UidFactory,
    };
}

pub use {
    command::{AudioCommand, CommandKind, DEFAULT_VELOCITY, MAX_VELOCITY},
    midi::{note_name, pitch_class_name, MidiChannel, MidiNote, MIDI_NOTE_MAX},
    time::{Seconds, Subdivision, Tempo, TimeSignature},
    uid::{Uid, UidFactory},
};

mod command;
mod midi;
mod time;
mod uid;
