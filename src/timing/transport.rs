// Copyright (c) 2024 Mike Tsao

use super::{Timer, TimerSnapshot};
use crate::types::{Seconds, Tempo, TimeSignature};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// [Transport] is the live clock. It keeps track of the current position in
/// the session and the tempo that musical time is measured against.
///
/// Time comes either from the wall clock (for live performance) or from
/// explicit [Transport::advance()] calls (for offline rendering and tests).
/// Either way, [Timer::now()] never goes backward.
#[derive(Clone, Debug, Default, Builder, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Transport {
    /// The current global time signature.
    #[builder(default)]
    pub time_signature: TimeSignature,

    /// The current beats per minute.
    #[builder(default)]
    pub tempo: Tempo,

    #[builder(setter(skip))]
    #[serde(skip)]
    e: TransportEphemerals,
}
/// Parts of [Transport] that shouldn't be serialized.
#[derive(Debug, Clone, Default)]
pub struct TransportEphemerals {
    wall_clock_origin: Option<Instant>,
    manual_time: Seconds,
    start_time: Seconds,
    is_running: bool,
}
impl PartialEq for Transport {
    fn eq(&self, other: &Self) -> bool {
        self.time_signature == other.time_signature && self.tempo == other.tempo
    }
}
impl Transport {
    /// A transport driven by [Transport::advance()].
    pub fn new_with(tempo: Tempo, time_signature: TimeSignature) -> Self {
        Self {
            time_signature,
            tempo,
            e: Default::default(),
        }
    }

    /// A transport driven by the wall clock, starting now.
    pub fn new_wall_clock(tempo: Tempo, time_signature: TimeSignature) -> Self {
        let mut r = Self::new_with(tempo, time_signature);
        r.e.wall_clock_origin = Some(Instant::now());
        r
    }

    /// Moves a manually driven transport forward. Negative or non-finite
    /// deltas are ignored. Has no effect on a wall-clock transport.
    pub fn advance(&mut self, delta: Seconds) {
        if delta.is_finite() && delta.0 > 0.0 {
            self.e.manual_time = self.e.manual_time + delta;
        }
    }

    /// Starts a session. Grid lines are measured from this moment.
    pub fn start(&mut self) {
        self.e.start_time = self.now();
        self.e.is_running = true;
    }

    /// Stops the session. The clock itself keeps running.
    pub fn stop(&mut self) {
        self.e.is_running = false;
    }

    #[allow(missing_docs)]
    pub fn is_running(&self) -> bool {
        self.e.is_running
    }

    /// Changes tempo. Invalid tempos are accepted here; conversions will
    /// return their sentinel until a valid one is set.
    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.tempo = tempo;
    }

    #[allow(missing_docs)]
    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
    }

    /// Freezes the current state so it can be sent to another thread.
    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::capture(self)
    }

    fn raw_now(&self) -> Seconds {
        match self.e.wall_clock_origin {
            Some(origin) => Seconds(origin.elapsed().as_secs_f64()),
            None => self.e.manual_time,
        }
    }
}
impl Timer for Transport {
    fn now(&self) -> Seconds {
        self.raw_now()
    }

    fn tempo(&self) -> Tempo {
        self.tempo
    }

    fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    fn start_time(&self) -> Seconds {
        self.e.start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use more_asserts::assert_ge;

    #[test]
    fn manual_transport_advances_only_forward() {
        let mut t = Transport::new_with(Tempo(120.0), TimeSignature::default());
        assert_eq!(t.now(), Seconds::zero());
        t.advance(Seconds(0.25));
        t.advance(Seconds(-1.0));
        t.advance(Seconds(f64::NAN));
        assert_eq!(t.now(), Seconds(0.25));
    }

    #[test]
    fn start_sets_start_time() {
        let mut t = Transport::new_with(Tempo(120.0), TimeSignature::default());
        t.advance(Seconds(1.0));
        assert!(!t.is_running());
        t.start();
        assert!(t.is_running());
        t.advance(Seconds(0.5));
        assert_eq!(t.start_time(), Seconds(1.0));
        assert_eq!(t.position(), Seconds(0.5));

        let snapshot = t.snapshot();
        assert_eq!(snapshot.bpm, 120.0);
        assert_eq!(snapshot.now, Seconds(1.5));
        assert_eq!(snapshot.start_time, Seconds(1.0));
        t.stop();
        assert!(!t.is_running());
    }

    #[test]
    fn wall_clock_is_monotonic() {
        let t = Transport::new_wall_clock(Tempo::default(), TimeSignature::default());
        let a = t.now();
        let b = t.now();
        assert_ge!(b, a);
    }

    #[test]
    fn tempo_setter() {
        let mut t = TransportBuilder::default().build().unwrap();
        assert_eq!(t.tempo(), Tempo::default());
        t.set_tempo(Tempo(0.0));
        assert_eq!(t.bar_duration(), Seconds::zero());
        t.set_tempo(Tempo(60.0));
        assert_eq!(t.bar_duration(), Seconds(4.0));
    }
}
