// Copyright (c) 2024 Mike Tsao

use crate::types::{Seconds, Subdivision, Tempo, TimeSignature};
use derivative::Derivative;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Ticks per quarter note.
pub const PPQ: usize = 192;

/// Converts a span of seconds to ticks at the given tempo. Returns 0 if the
/// tempo or the input isn't usable; this runs inside audio callbacks, where a
/// panic would take down the pipeline.
pub fn seconds_to_ticks(tempo: Tempo, seconds: Seconds) -> f64 {
    if !tempo.is_valid() || !seconds.is_finite() {
        return 0.0;
    }
    seconds.0 * tempo.bps() * PPQ as f64
}

/// The inverse of [seconds_to_ticks()]. Same sentinel rules.
pub fn ticks_to_seconds(tempo: Tempo, ticks: f64) -> Seconds {
    if !tempo.is_valid() || !ticks.is_finite() {
        return Seconds::zero();
    }
    Seconds(ticks / (tempo.bps() * PPQ as f64))
}

/// A musical clock. Maps transport time in seconds to musical time.
///
/// Only [Timer::now()] and [Timer::tempo()] are required. Everything else is a
/// pure function of tempo, time signature, and start time, so a plain
/// [TimerSnapshot] answers every question a live [Transport](super::Transport)
/// does.
pub trait Timer {
    /// The current transport time. Monotonic within a session.
    fn now(&self) -> Seconds;

    #[allow(missing_docs)]
    fn tempo(&self) -> Tempo;

    #[allow(missing_docs)]
    fn time_signature(&self) -> TimeSignature {
        TimeSignature::default()
    }

    /// When the session started. Grid lines are measured from here.
    fn start_time(&self) -> Seconds {
        Seconds::zero()
    }

    /// How far into the session we are.
    fn position(&self) -> Seconds {
        self.now() - self.start_time()
    }

    #[allow(missing_docs)]
    fn seconds_to_ticks(&self, seconds: Seconds) -> f64 {
        seconds_to_ticks(self.tempo(), seconds)
    }

    #[allow(missing_docs)]
    fn ticks_to_seconds(&self, ticks: f64) -> Seconds {
        ticks_to_seconds(self.tempo(), ticks)
    }

    /// Length of the given number of quarter-note beats.
    fn beats_to_seconds(&self, beats: f64) -> Seconds {
        self.ticks_to_seconds(beats * PPQ as f64)
    }

    /// Length of one bar in the current time signature.
    fn bar_duration(&self) -> Seconds {
        self.beats_to_seconds(self.time_signature().quarters_per_bar())
    }

    #[allow(missing_docs)]
    fn subdivision_duration(&self, subdivision: Subdivision) -> Seconds {
        self.ticks_to_seconds(subdivision.ticks(&self.time_signature()))
    }

    /// Snaps `time` to the nearest grid line of the given subdivision. Ties go
    /// to the later line. If there's no usable grid (bad tempo, bad time),
    /// returns `time` unchanged. This is the only place grid-snapping math
    /// lives.
    fn quantise(&self, time: Seconds, subdivision: Subdivision) -> Seconds {
        let grid = self.subdivision_duration(subdivision);
        if grid.0 <= 0.0 || !time.is_finite() {
            return time;
        }
        let origin = self.start_time();
        let steps = ((time - origin).0 / grid.0).round();
        origin + grid * steps
    }

    /// Returns the first grid line at or after `time`.
    fn next_grid_time(&self, time: Seconds, subdivision: Subdivision) -> Seconds {
        let grid = self.subdivision_duration(subdivision);
        if grid.0 <= 0.0 || !time.is_finite() {
            return time;
        }
        let origin = self.start_time();
        let steps = ((time - origin).0 / grid.0 - 1e-9).ceil();
        origin + grid * steps
    }
}

/// A frozen, serializable view of a [Timer]. This is what crosses thread
/// boundaries with each batch.
#[derive(Builder, Clone, Copy, Debug, Derivative, PartialEq, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct TimerSnapshot {
    /// Beats per minute. Defaults to the default [Tempo].
    #[derivative(Default(value = "Tempo::default().0"))]
    pub bpm: f64,
    /// The transport time when the snapshot was taken.
    pub now: Seconds,
    /// When the session started.
    pub start_time: Seconds,
    /// The time signature in effect.
    #[serde(default)]
    pub time_signature: TimeSignature,
}
impl TimerSnapshot {
    /// Creates a 4/4 snapshot.
    pub fn new_with(bpm: f64, now: Seconds, start_time: Seconds) -> Self {
        Self {
            bpm,
            now,
            start_time,
            time_signature: TimeSignature::default(),
        }
    }

    /// Copies the answers of any [Timer].
    pub fn capture(timer: &dyn Timer) -> Self {
        Self {
            bpm: timer.tempo().0,
            now: timer.now(),
            start_time: timer.start_time(),
            time_signature: timer.time_signature(),
        }
    }

    /// Returns a copy of this snapshot at a different time.
    pub fn at(&self, now: Seconds) -> Self {
        Self { now, ..*self }
    }

    #[allow(missing_docs)]
    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.bpm = tempo.0;
    }
}
impl Timer for TimerSnapshot {
    fn now(&self) -> Seconds {
        self.now
    }

    fn tempo(&self) -> Tempo {
        Tempo(self.bpm)
    }

    fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    fn start_time(&self) -> Seconds {
        self.start_time
    }
}
