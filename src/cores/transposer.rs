// Copyright (c) 2024 Mike Tsao

use crate::{
    error::ConfigError,
    timing::Timer,
    traits::{Configures, Serializable, TransformerCore, TransformsCommands},
    transformers::{
        enum_of, enum_value, int_of, validate, Category, Field, FieldOption, FieldValue,
        TransformerConfig,
    },
    types::{pitch_class_name, AudioCommand, CommandKind, MidiNote, MIDI_NOTE_MAX},
};
use derivative::Derivative;
use derive_builder::Builder;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// The scales that [TransposerCore] can snap to.
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
pub enum ScaleMode {
    /// Every note. No snapping.
    #[default]
    Chromatic,
    #[allow(missing_docs)]
    Major,
    /// Natural minor.
    Minor,
    #[allow(missing_docs)]
    Dorian,
    #[allow(missing_docs)]
    Mixolydian,
    /// Major pentatonic.
    Pentatonic,
    #[allow(missing_docs)]
    Blues,
}
impl ScaleMode {
    /// Semitones above the root that belong to the scale.
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            ScaleMode::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            ScaleMode::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleMode::Minor => &[0, 2, 3, 5, 7, 8, 10],
            ScaleMode::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            ScaleMode::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            ScaleMode::Pentatonic => &[0, 2, 4, 7, 9],
            ScaleMode::Blues => &[0, 3, 5, 6, 7, 10],
        }
    }
}

/// Shifts notes by a number of semitones, then snaps each to the nearest
/// member of a scale. Ties go to the lower note.
///
/// The scale membership set is derived state. It's rebuilt from the *new*
/// configuration before that configuration takes effect, so the very next
/// batch uses it. A Note-Off is always mapped to whatever its Note-On was
/// mapped to, even if the configuration changed in between.
#[derive(Clone, Builder, Debug, Derivative, Serialize, Deserialize)]
#[builder_impl_attr(allow(missing_docs))]
#[derivative(Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
#[builder(default)]
pub struct TransposerCore {
    /// Applied before snapping. -24..=24.
    semitones: i8,

    /// Pitch class of the scale's root. 0 is C.
    root: u8,

    mode: ScaleMode,

    #[serde(skip)]
    #[builder(setter(skip))]
    #[derivative(PartialEq = "ignore")]
    e: TransposerEphemerals,
}
#[derive(Clone, Debug, Default)]
pub struct TransposerEphemerals {
    /// Every note in 0..=127 that's in the current scale, ascending.
    scale_notes: Vec<MidiNote>,

    /// Incoming note number to the output notes it's currently sounding as.
    sounding: FxHashMap<MidiNote, Vec<MidiNote>>,
}
impl TransposerCore {
    /// The largest shift in either direction.
    pub const MAX_SEMITONES: i8 = 24;

    #[allow(missing_docs)]
    pub fn semitones(&self) -> i8 {
        self.semitones
    }

    #[allow(missing_docs)]
    pub fn root(&self) -> u8 {
        self.root
    }

    #[allow(missing_docs)]
    pub fn mode(&self) -> ScaleMode {
        self.mode
    }

    fn rebuild_scale(&mut self) {
        let intervals = self.mode.intervals();
        let root = self.root % 12;
        self.e.scale_notes = (0..=MIDI_NOTE_MAX)
            .filter(|n| intervals.contains(&((n + 12 - root) % 12)))
            .collect();
    }

    fn nearest_in_scale(&self, note: MidiNote) -> MidiNote {
        let notes = &self.e.scale_notes;
        match notes.binary_search(&note) {
            Ok(_) => note,
            Err(0) => notes.first().copied().unwrap_or(note),
            Err(i) if i >= notes.len() => notes.last().copied().unwrap_or(note),
            Err(i) => {
                let below = notes[i - 1];
                let above = notes[i];
                if note - below <= above - note {
                    below
                } else {
                    above
                }
            }
        }
    }

    /// What this core would turn a freshly pressed note into.
    pub fn map_note(&mut self, note: MidiNote) -> MidiNote {
        if self.e.scale_notes.is_empty() {
            self.rebuild_scale();
        }
        let shifted = (note as i16 + self.semitones as i16).clamp(0, MIDI_NOTE_MAX as i16);
        self.nearest_in_scale(shifted as MidiNote)
    }
}
impl TransformsCommands for TransposerCore {
    fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        _timer: &dyn Timer,
    ) -> anyhow::Result<Vec<AudioCommand>> {
        let mut r = Vec::with_capacity(commands.len());
        for command in commands {
            let mapped = match command.kind {
                CommandKind::NoteOn => {
                    let mapped = self.map_note(command.number);
                    self.e
                        .sounding
                        .entry(command.number)
                        .or_default()
                        .push(mapped);
                    mapped
                }
                CommandKind::NoteOff => {
                    let remembered = match self.e.sounding.get_mut(&command.number) {
                        Some(stack) if !stack.is_empty() => {
                            let mapped = stack.remove(0);
                            if stack.is_empty() {
                                self.e.sounding.remove(&command.number);
                            }
                            Some(mapped)
                        }
                        _ => None,
                    };
                    match remembered {
                        Some(mapped) => mapped,
                        None => self.map_note(command.number),
                    }
                }
                _ => {
                    r.push(command);
                    continue;
                }
            };
            if mapped == command.number {
                r.push(command);
            } else {
                r.push(command.derive(mapped, Self::KEY));
            }
        }
        Ok(r)
    }

    fn flush(&mut self, timer: &dyn Timer) -> Vec<AudioCommand> {
        let mut sounding: Vec<(MidiNote, Vec<MidiNote>)> = self.e.sounding.drain().collect();
        sounding.sort_unstable_by_key(|(note, _)| *note);
        sounding
            .into_iter()
            .flat_map(|(_, mapped)| mapped)
            .map(|mapped| AudioCommand::note_off(mapped, timer, Self::KEY))
            .collect()
    }

    fn reset(&mut self) {
        self.e.sounding.clear();
    }
}
impl Configures for TransposerCore {
    fn fields() -> Vec<Field> {
        vec![
            Field::int_range(
                "semitones",
                "Semitones",
                -(Self::MAX_SEMITONES as i64)..=Self::MAX_SEMITONES as i64,
            ),
            Field::select(
                "root",
                "Root",
                (0..12)
                    .map(|pc| FieldOption {
                        value: FieldValue::Int(pc),
                        label: pitch_class_name(pc as MidiNote).to_string(),
                    })
                    .collect(),
            ),
            Field::from_enum::<ScaleMode>("mode", "Scale"),
        ]
    }

    fn config_value(&self, name: &str) -> Result<FieldValue, ConfigError> {
        match name {
            "semitones" => Ok(FieldValue::Int(self.semitones as i64)),
            "root" => Ok(FieldValue::Int(self.root as i64)),
            "mode" => Ok(enum_value(self.mode)),
            _ => Err(ConfigError::unknown_field(name)),
        }
    }

    fn with(&self, name: &str, value: &FieldValue) -> Result<Self, ConfigError> {
        validate(&Self::fields(), name, value)?;
        let mut r = self.clone();
        match name {
            "semitones" => r.semitones = int_of(name, value)?,
            "root" => r.root = int_of(name, value)?,
            "mode" => r.mode = enum_of(name, value)?,
            _ => return Err(ConfigError::unknown_field(name)),
        }
        r.rebuild_scale();
        Ok(r)
    }
}
impl Serializable for TransposerCore {
    fn after_deser(&mut self) {
        self.semitones = self
            .semitones
            .clamp(-Self::MAX_SEMITONES, Self::MAX_SEMITONES);
        self.root %= 12;
        self.rebuild_scale();
    }
}
impl TransformerCore for TransposerCore {
    const KEY: &'static str = "transposer";
    const NAME: &'static str = "Transposer";
    const CATEGORY: Category = Category::Tuning;

    fn to_config(&self) -> TransformerConfig {
        TransformerConfig::Transposer(self.clone())
    }

    fn from_config(config: TransformerConfig) -> Option<Self> {
        match config {
            TransformerConfig::Transposer(core) => Some(core),
            _ => None,
        }
    }
}
