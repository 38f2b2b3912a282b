// Copyright (c) 2024 Mike Tsao

//! Records what a pipeline plays, and turns the recording back into notes.

/// The most commonly used imports.
pub mod prelude {
    pub use super::{RecorderAudioEvent, RecordingStorage};
}

pub use {
    pairing::{notes, pair_events, PairingReport, RecordedNote},
    recorder::RecorderAudioEvent,
    storage::{JsonFileStorage, MemoryStorage, RecordingStorage, SessionMetadata},
};

mod pairing;
mod recorder;
mod storage;
