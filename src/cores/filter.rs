// Copyright (c) 2024 Mike Tsao

use crate::{
    error::ConfigError,
    timing::Timer,
    traits::{Configures, Serializable, TransformerCore, TransformsCommands},
    transformers::{
        enum_of, enum_value, int_of, validate, Category, Field, FieldValue, TransformerConfig,
    },
    types::{AudioCommand, MidiNote, MIDI_NOTE_MAX},
};
use derivative::Derivative;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Whether [FilterCore] keeps the notes inside its range or the ones outside
/// it.
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
pub enum FilterMode {
    /// Pass notes in `[lower, upper]`.
    #[default]
    Include,
    /// Pass notes outside `[lower, upper]`.
    Exclude,
}

/// A stateless note-range gate. Commands that aren't notes always pass.
///
/// The range is inclusive at both ends and is never empty: setting one bound
/// past the other drags the other along, so `lower == upper` is a single-note
/// range.
#[derive(Clone, Builder, Debug, Derivative, PartialEq, Serialize, Deserialize)]
#[builder_impl_attr(allow(missing_docs))]
#[derivative(Default)]
#[serde(default, rename_all = "kebab-case")]
#[builder(default)]
pub struct FilterCore {
    #[derivative(Default(value = "0"))]
    lower: MidiNote,

    #[derivative(Default(value = "MIDI_NOTE_MAX"))]
    upper: MidiNote,

    mode: FilterMode,
}
impl FilterCore {
    #[allow(missing_docs)]
    pub fn lower(&self) -> MidiNote {
        self.lower
    }

    #[allow(missing_docs)]
    pub fn upper(&self) -> MidiNote {
        self.upper
    }

    #[allow(missing_docs)]
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Whether a note with this number gets through.
    pub fn passes(&self, note: MidiNote) -> bool {
        let inside = (self.lower..=self.upper).contains(&note);
        match self.mode {
            FilterMode::Include => inside,
            FilterMode::Exclude => !inside,
        }
    }
}
impl TransformsCommands for FilterCore {
    fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        _timer: &dyn Timer,
    ) -> anyhow::Result<Vec<AudioCommand>> {
        Ok(commands
            .into_iter()
            .filter(|c| !c.is_note() || self.passes(c.number))
            .collect())
    }
}
impl Configures for FilterCore {
    fn fields() -> Vec<Field> {
        vec![
            Field::int_range("lower", "Lowest note", 0..=MIDI_NOTE_MAX as i64),
            Field::int_range("upper", "Highest note", 0..=MIDI_NOTE_MAX as i64),
            Field::from_enum::<FilterMode>("mode", "Mode"),
        ]
    }

    fn config_value(&self, name: &str) -> Result<FieldValue, ConfigError> {
        match name {
            "lower" => Ok(FieldValue::Int(self.lower as i64)),
            "upper" => Ok(FieldValue::Int(self.upper as i64)),
            "mode" => Ok(enum_value(self.mode)),
            _ => Err(ConfigError::unknown_field(name)),
        }
    }

    fn with(&self, name: &str, value: &FieldValue) -> Result<Self, ConfigError> {
        validate(&Self::fields(), name, value)?;
        let mut r = self.clone();
        match name {
            "lower" => {
                r.lower = int_of(name, value)?;
                r.upper = r.upper.max(r.lower);
            }
            "upper" => {
                r.upper = int_of(name, value)?;
                r.lower = r.lower.min(r.upper);
            }
            "mode" => r.mode = enum_of(name, value)?,
            _ => return Err(ConfigError::unknown_field(name)),
        }
        Ok(r)
    }
}
impl Serializable for FilterCore {
    fn after_deser(&mut self) {
        self.lower = self.lower.min(MIDI_NOTE_MAX);
        self.upper = self.upper.clamp(self.lower, MIDI_NOTE_MAX);
    }
}
impl TransformerCore for FilterCore {
    const KEY: &'static str = "filter";
    const NAME: &'static str = "Filter";
    const CATEGORY: Category = Category::Tuning;

    fn to_config(&self) -> TransformerConfig {
        TransformerConfig::Filter(self.clone())
    }

    fn from_config(config: TransformerConfig) -> Option<Self> {
        match config {
            TransformerConfig::Filter(core) => Some(core),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{timing::TimerSnapshot, types::Seconds};

    fn notes_on(numbers: &[u8], timer: &TimerSnapshot) -> Vec<AudioCommand> {
        numbers
            .iter()
            .map(|n| AudioCommand::note_on(*n, timer, "test"))
            .collect()
    }

    fn numbers(commands: &[AudioCommand]) -> Vec<u8> {
        commands.iter().map(|c| c.number).collect()
    }

    #[test]
    fn include_and_exclude() {
        let timer = TimerSnapshot::new_with(120.0, Seconds::zero(), Seconds::zero());
        let mut include = FilterCoreBuilder::default()
            .lower(60)
            .upper(64)
            .build()
            .unwrap();
        let out = include
            .transform(notes_on(&[59, 60, 64, 65], &timer), &timer)
            .unwrap();
        assert_eq!(numbers(&out), vec![60, 64]);

        let mut exclude = FilterCoreBuilder::default()
            .lower(60)
            .upper(64)
            .mode(FilterMode::Exclude)
            .build()
            .unwrap();
        let out = exclude
            .transform(notes_on(&[59, 60, 64, 65], &timer), &timer)
            .unwrap();
        assert_eq!(numbers(&out), vec![59, 65]);
    }

    #[test]
    fn single_note_range_is_not_empty() {
        let timer = TimerSnapshot::default();
        let mut core = FilterCoreBuilder::default()
            .lower(62)
            .upper(62)
            .build()
            .unwrap();
        let out = core
            .transform(notes_on(&[61, 62, 63], &timer), &timer)
            .unwrap();
        assert_eq!(numbers(&out), vec![62]);
    }

    #[test]
    fn non_notes_always_pass() {
        let timer = TimerSnapshot::default();
        let mut core = FilterCoreBuilder::default()
            .lower(60)
            .upper(60)
            .build()
            .unwrap();
        let batch = vec![
            AudioCommand::control_change(7, 100, &timer, "test"),
            AudioCommand::note_off(10, &timer, "test"),
            AudioCommand::new_with(crate::types::CommandKind::PitchBend, 0, &timer, "test"),
        ];
        let out = core.transform(batch, &timer).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| !c.is_note()));
    }

    #[test]
    fn default_passes_everything() {
        let core = FilterCore::default();
        assert!((0..=MIDI_NOTE_MAX).all(|n| core.passes(n)));
    }

    #[test]
    fn config_round_trip() {
        let mut core = FilterCore::default();
        assert!(core.set_config("lower", &FieldValue::Int(48)).is_ok());
        assert_eq!(core.config_value("lower"), Ok(FieldValue::Int(48)));
        assert!(core.set_config("mode", &"exclude".into()).is_ok());
        assert_eq!(core.config_value("mode"), Ok("exclude".into()));

        assert!(core.set_config("lower", &FieldValue::Int(200)).is_err());
        assert!(core.set_config("lower", &FieldValue::Int(-1)).is_err());
        assert!(core.set_config("mode", &"sometimes".into()).is_err());
        assert_eq!(
            core.config_value("lower"),
            Ok(FieldValue::Int(48)),
            "rejected values should leave the prior value intact"
        );
        assert_eq!(core.mode(), FilterMode::Exclude);
    }

    #[test]
    fn crossing_bounds_drags_the_other_bound() {
        let mut core = FilterCoreBuilder::default()
            .lower(60)
            .upper(64)
            .build()
            .unwrap();
        core.set_config("lower", &FieldValue::Int(70)).unwrap();
        assert_eq!(core.lower(), 70);
        assert_eq!(core.upper(), 70);

        core.set_config("upper", &FieldValue::Int(50)).unwrap();
        assert_eq!(core.lower(), 50);
        assert_eq!(core.upper(), 50);
        assert!(core.passes(50), "the range should never be empty");
    }

    #[test]
    fn deserialized_inverted_range_is_normalized() {
        let mut core: FilterCore = serde_json::from_str(r#"{"lower": 70, "upper": 60}"#).unwrap();
        core.after_deser();
        assert_eq!((core.lower(), core.upper()), (70, 70));
    }
}
