// Copyright (c) 2024 Mike Tsao

use crate::{
    error::ConfigError,
    timing::Timer,
    traits::{Configures, Serializable, TransformerCore, TransformsCommands},
    transformers::{
        enum_of, enum_value, int_of, validate, Category, Field, FieldValue, TransformerConfig,
    },
    types::{AudioCommand, CommandKind, MidiNote, Seconds, Subdivision, MIDI_NOTE_MAX},
    util::Rng,
};
use derivative::Derivative;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// The order in which held notes are played.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    EnumIter,
    EnumString,
    Eq,
    IntoStaticStr,
    PartialEq,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ArpeggioMode {
    /// Lowest to highest, then start over.
    #[default]
    Up,
    /// Highest to lowest, then start over.
    Down,
    /// Lowest to highest and back, without repeating the ends.
    UpDown,
    #[allow(missing_docs)]
    Random,
}

/// [ArpeggiatorCore] creates
/// [arpeggios](https://en.wikipedia.org/wiki/Arpeggio), which "is a type of
/// broken chord in which the notes that compose a chord are individually and
/// quickly sounded in a progressive rising or descending order."
///
/// Held notes are consumed, not passed through. While any note is held, one
/// note is emitted at each `rate` step, starting at the moment the first note
/// was pressed. Each emitted note lasts `gate` percent of a step.
#[derive(Clone, Builder, Debug, Derivative, Serialize, Deserialize)]
#[builder_impl_attr(allow(missing_docs))]
#[derivative(Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
#[builder(default)]
pub struct ArpeggiatorCore {
    mode: ArpeggioMode,

    rate: Subdivision,

    /// Percent of a step that each note sounds.
    #[derivative(Default(value = "50"))]
    gate: u8,

    /// How many octaves the pattern spans.
    #[derivative(Default(value = "1"))]
    octaves: u8,

    /// Drives [ArpeggioMode::Random]. The same seed and the same input give
    /// the same notes.
    seed: u64,

    #[serde(skip)]
    #[builder(setter(skip))]
    #[derivative(PartialEq = "ignore")]
    e: ArpeggiatorEphemerals,
}
#[derive(Clone, Debug, Default)]
pub struct ArpeggiatorEphemerals {
    /// The Note-Ons currently held, sorted by note number.
    held: Vec<AudioCommand>,
    step: usize,
    next_step_at: Option<Seconds>,
    /// Built from `seed` on first use, and again after every reset.
    rng: Option<Rng>,
}
impl ArpeggiatorCore {
    /// Allowed values for `gate`.
    pub const GATES: [i64; 4] = [25, 50, 75, 100];
    /// Allowed values for `octaves`.
    pub const OCTAVES: core::ops::RangeInclusive<i64> = 1..=4;
    /// Allowed values for `seed`.
    pub const SEEDS: core::ops::RangeInclusive<i64> = 0..=i64::MAX;

    // If we fall this far behind (for example, the host stalled), we skip
    // ahead instead of emitting a flood of stale notes.
    const MAX_STEPS_PER_BATCH: usize = 64;

    #[allow(missing_docs)]
    pub fn mode(&self) -> ArpeggioMode {
        self.mode
    }

    #[allow(missing_docs)]
    pub fn rate(&self) -> Subdivision {
        self.rate
    }

    #[allow(missing_docs)]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Whether any notes are held.
    pub fn is_playing(&self) -> bool {
        !self.e.held.is_empty()
    }

    fn hold(&mut self, note_on: AudioCommand, timer: &dyn Timer) {
        if self.e.held.is_empty() {
            self.e.step = 0;
            self.e.next_step_at = Some(if note_on.start_at.is_finite() {
                note_on.start_at
            } else {
                timer.now()
            });
        }
        self.e.held.retain(|h| h.number != note_on.number);
        self.e.held.push(note_on);
        self.e.held.sort_by_key(|h| h.number);
    }

    fn release(&mut self, note: MidiNote) {
        self.e.held.retain(|h| h.number != note);
        if self.e.held.is_empty() {
            self.e.next_step_at = None;
            self.e.step = 0;
        }
    }

    /// The notes of one pass through the pattern, as (index into `held`,
    /// note number) pairs.
    fn pattern(&self) -> Vec<(usize, MidiNote)> {
        let mut up = Vec::with_capacity(self.e.held.len() * self.octaves as usize);
        for octave in 0..self.octaves {
            for (i, h) in self.e.held.iter().enumerate() {
                let note = h.number as usize + octave as usize * 12;
                if note <= MIDI_NOTE_MAX as usize {
                    up.push((i, note as MidiNote));
                }
            }
        }
        match self.mode {
            ArpeggioMode::Up | ArpeggioMode::Random => up,
            ArpeggioMode::Down => {
                up.reverse();
                up
            }
            ArpeggioMode::UpDown => {
                let len = up.len();
                if len > 2 {
                    let down: Vec<_> = up[1..len - 1].iter().rev().copied().collect();
                    up.extend(down);
                }
                up
            }
        }
    }

    fn next_index(&mut self, len: usize) -> usize {
        if self.mode == ArpeggioMode::Random {
            let seed = self.seed;
            self.e
                .rng
                .get_or_insert_with(|| Rng::new_with_seed(seed))
                .rand_index(len)
        } else {
            let i = self.e.step % len;
            self.e.step += 1;
            i
        }
    }
}
impl TransformsCommands for ArpeggiatorCore {
    fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        timer: &dyn Timer,
    ) -> anyhow::Result<Vec<AudioCommand>> {
        let mut r = Vec::default();
        for command in commands {
            match command.kind {
                CommandKind::NoteOn => self.hold(command, timer),
                CommandKind::NoteOff => self.release(command.number),
                _ => r.push(command),
            }
        }

        let step_length = timer.subdivision_duration(self.rate);
        if step_length.0 <= 0.0 {
            return Ok(r);
        }
        let pattern = self.pattern();
        if pattern.is_empty() {
            return Ok(r);
        }
        let gate = step_length * (self.gate as f64 / 100.0);
        let now = timer.now();
        let mut steps = 0;
        while let Some(at) = self.e.next_step_at {
            if at > now {
                break;
            }
            if steps == Self::MAX_STEPS_PER_BATCH {
                log::warn!("arpeggiator: fell behind at {at}; skipping ahead to {now}");
                self.e.next_step_at = Some(now + step_length);
                break;
            }
            let (held_index, note) = pattern[self.next_index(pattern.len())];
            let note_on = self.e.held[held_index]
                .derive(note, Self::KEY)
                .with_start_at(at);
            let note_off = note_on.paired_note_off(at + gate, Self::KEY);
            r.push(note_on);
            r.push(note_off);
            self.e.next_step_at = Some(at + step_length);
            steps += 1;
        }
        Ok(r)
    }

    fn reset(&mut self) {
        self.e.held.clear();
        self.e.step = 0;
        self.e.next_step_at = None;
        self.e.rng = None;
    }
}
impl Configures for ArpeggiatorCore {
    fn fields() -> Vec<Field> {
        vec![
            Field::from_enum::<ArpeggioMode>("mode", "Mode"),
            Field::from_enum::<Subdivision>("rate", "Rate"),
            Field::int_values("gate", "Gate (%)", &Self::GATES),
            Field::int_range("octaves", "Octaves", Self::OCTAVES),
            Field::number("seed", "Random seed", Self::SEEDS),
        ]
    }

    fn config_value(&self, name: &str) -> Result<FieldValue, ConfigError> {
        match name {
            "mode" => Ok(enum_value(self.mode)),
            "rate" => Ok(enum_value(self.rate)),
            "gate" => Ok(FieldValue::Int(self.gate as i64)),
            "octaves" => Ok(FieldValue::Int(self.octaves as i64)),
            "seed" => Ok(FieldValue::Int(self.seed as i64)),
            _ => Err(ConfigError::unknown_field(name)),
        }
    }

    fn with(&self, name: &str, value: &FieldValue) -> Result<Self, ConfigError> {
        validate(&Self::fields(), name, value)?;
        let mut r = self.clone();
        match name {
            "mode" => r.mode = enum_of(name, value)?,
            "rate" => r.rate = enum_of(name, value)?,
            "gate" => r.gate = int_of(name, value)?,
            "octaves" => r.octaves = int_of(name, value)?,
            "seed" => {
                r.seed = int_of(name, value)?;
                r.e.rng = None;
            }
            _ => return Err(ConfigError::unknown_field(name)),
        }
        Ok(r)
    }
}
impl Serializable for ArpeggiatorCore {
    fn after_deser(&mut self) {
        self.gate = self.gate.clamp(1, 100);
        self.octaves = self.octaves.clamp(1, 4);
        self.seed = self.seed.min(i64::MAX as u64);
        self.e.rng = None;
    }
}
impl TransformerCore for ArpeggiatorCore {
    const KEY: &'static str = "arpeggiator";
    const NAME: &'static str = "Arpeggiator";
    const CATEGORY: Category = Category::Generative;

    fn to_config(&self) -> TransformerConfig {
        TransformerConfig::Arpeggiator(self.clone())
    }

    fn from_config(config: TransformerConfig) -> Option<Self> {
        match config {
            TransformerConfig::Arpeggiator(core) => Some(core),
            _ => None,
        }
    }
}
