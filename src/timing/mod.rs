// Copyright (c) 2024 Mike Tsao

//! The musical clock.

/// The most commonly used imports.
pub mod prelude {
    pub use super::{Timer, TimerSnapshot, Transport, PPQ};
}

pub use timer::{
    seconds_to_ticks, ticks_to_seconds, Timer, TimerSnapshot, TimerSnapshotBuilder, PPQ,
};
pub use transport::{Transport, TransportBuilder};

mod timer;
mod transport;
