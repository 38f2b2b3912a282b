// Copyright (c) 2024 Mike Tsao

use crate::{
    error::ConfigError,
    timing::Timer,
    traits::{Configures, Serializable, TransformerCore, TransformsCommands},
    transformers::{int_of, validate, Category, Field, FieldValue, TransformerConfig},
    types::{AudioCommand, CommandKind, MidiNote, Seconds},
};
use derivative::Derivative;
use derive_builder::Builder;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Expands every Note-On into a burst of complete notes.
///
/// For each Note-On, emits `repeats` Note-On/Note-Off pairs, the i-th starting
/// `i * delay-ms` after the original and lasting `note-duration-ms`. Because
/// each burst is already closed, the player's own Note-Off for that note is
/// swallowed.
#[derive(Clone, Builder, Debug, Derivative, Serialize, Deserialize)]
#[builder_impl_attr(allow(missing_docs))]
#[derivative(Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
#[builder(default)]
pub struct RepeaterCore {
    #[derivative(Default(value = "3"))]
    repeats: u8,

    #[derivative(Default(value = "125"))]
    delay_ms: u32,

    #[derivative(Default(value = "100"))]
    note_duration_ms: u32,

    #[serde(skip)]
    #[builder(setter(skip))]
    #[derivative(PartialEq = "ignore")]
    e: RepeaterEphemerals,
}
#[derive(Clone, Debug, Default)]
pub struct RepeaterEphemerals {
    /// How many bursts we've emitted for each note whose Note-Off hasn't
    /// arrived yet.
    owned: FxHashMap<MidiNote, usize>,
}
impl RepeaterCore {
    /// Allowed values for `repeats`.
    pub const REPEATS: core::ops::RangeInclusive<i64> = 1..=16;
    /// Allowed values for `delay-ms`.
    pub const DELAYS_MS: [i64; 10] = [50, 100, 125, 150, 200, 250, 375, 500, 750, 1000];
    /// Allowed values for `note-duration-ms`.
    pub const DURATIONS_MS: [i64; 9] = [25, 50, 75, 100, 150, 200, 250, 375, 500];

    #[allow(missing_docs)]
    pub fn repeats(&self) -> u8 {
        self.repeats
    }

    #[allow(missing_docs)]
    pub fn delay(&self) -> Seconds {
        Seconds::from_millis(self.delay_ms as f64)
    }

    #[allow(missing_docs)]
    pub fn note_duration(&self) -> Seconds {
        Seconds::from_millis(self.note_duration_ms as f64)
    }

    /// Whether we're waiting on a Note-Off for this note.
    pub fn owns(&self, note: MidiNote) -> bool {
        self.e.owned.contains_key(&note)
    }

    fn expand(&self, note_on: &AudioCommand, r: &mut Vec<AudioCommand>) {
        for i in 0..self.repeats {
            let start_at = note_on.start_at + self.delay() * i as f64;
            r.push(note_on.retimed(start_at, Self::KEY));
            r.push(note_on.paired_note_off(start_at + self.note_duration(), Self::KEY));
        }
    }
}
impl TransformsCommands for RepeaterCore {
    fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        _timer: &dyn Timer,
    ) -> anyhow::Result<Vec<AudioCommand>> {
        let mut r = Vec::with_capacity(commands.len() * self.repeats as usize * 2);
        for command in commands {
            match command.kind {
                CommandKind::NoteOn => {
                    self.expand(&command, &mut r);
                    *self.e.owned.entry(command.number).or_default() += 1;
                }
                CommandKind::NoteOff => {
                    if let Some(count) = self.e.owned.get_mut(&command.number) {
                        *count -= 1;
                        if *count == 0 {
                            self.e.owned.remove(&command.number);
                        }
                    } else {
                        r.push(command);
                    }
                }
                _ => r.push(command),
            }
        }
        Ok(r)
    }

    fn reset(&mut self) {
        self.e.owned.clear();
    }
}
impl Configures for RepeaterCore {
    fn fields() -> Vec<Field> {
        vec![
            Field::int_range("repeats", "Repeats", Self::REPEATS),
            Field::int_values("delay-ms", "Delay (ms)", &Self::DELAYS_MS),
            Field::int_values("note-duration-ms", "Note length (ms)", &Self::DURATIONS_MS),
        ]
    }

    fn config_value(&self, name: &str) -> Result<FieldValue, ConfigError> {
        match name {
            "repeats" => Ok(FieldValue::Int(self.repeats as i64)),
            "delay-ms" => Ok(FieldValue::Int(self.delay_ms as i64)),
            "note-duration-ms" => Ok(FieldValue::Int(self.note_duration_ms as i64)),
            _ => Err(ConfigError::unknown_field(name)),
        }
    }

    fn with(&self, name: &str, value: &FieldValue) -> Result<Self, ConfigError> {
        validate(&Self::fields(), name, value)?;
        let mut r = self.clone();
        match name {
            "repeats" => r.repeats = int_of(name, value)?,
            "delay-ms" => r.delay_ms = int_of(name, value)?,
            "note-duration-ms" => r.note_duration_ms = int_of(name, value)?,
            _ => return Err(ConfigError::unknown_field(name)),
        }
        Ok(r)
    }
}
impl Serializable for RepeaterCore {}
impl TransformerCore for RepeaterCore {
    const KEY: &'static str = "repeater";
    const NAME: &'static str = "Note Repeater";
    const CATEGORY: Category = Category::Timing;

    fn to_config(&self) -> TransformerConfig {
        TransformerConfig::Repeater(self.clone())
    }

    fn from_config(config: TransformerConfig) -> Option<Self> {
        match config {
            TransformerConfig::Repeater(core) => Some(core),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::TimerSnapshot;
    use float_cmp::approx_eq;

    #[test]
    fn fan_out() {
        let timer = TimerSnapshot::new_with(120.0, Seconds::zero(), Seconds::zero());
        let mut core = RepeaterCoreBuilder::default()
            .repeats(3)
            .delay_ms(125)
            .note_duration_ms(100)
            .build()
            .unwrap();
        let on = AudioCommand::note_on(60, &timer, "keyboard").with_start_at(Seconds::zero());
        let out = core.transform(vec![on], &timer).unwrap();
        assert_eq!(out.len(), 6, "three complete pairs");

        let ons: Vec<&AudioCommand> = out.iter().filter(|c| c.is_note_on()).collect();
        let offs: Vec<&AudioCommand> = out.iter().filter(|c| c.is_note_off()).collect();
        assert_eq!(ons.len(), 3);
        assert_eq!(offs.len(), 3);
        for (i, (on, off)) in ons.iter().zip(offs.iter()).enumerate() {
            assert_eq!(on.number, 60);
            assert_eq!(off.number, 60);
            assert!(approx_eq!(
                f64,
                on.start_at.0,
                i as f64 * 0.125,
                epsilon = 1e-9
            ));
            assert!(approx_eq!(
                f64,
                off.start_at.0,
                on.start_at.0 + 0.1,
                epsilon = 1e-9
            ));
        }
        assert!(core.owns(60));

        let off = AudioCommand::note_off(60, &timer, "keyboard");
        assert!(
            core.transform(vec![off.clone()], &timer).unwrap().is_empty(),
            "the player's own Note-Off is swallowed"
        );
        assert!(!core.owns(60));
        assert_eq!(
            core.transform(vec![off.clone()], &timer).unwrap(),
            vec![off],
            "a Note-Off we don't own passes through"
        );
    }

    #[test]
    fn retrigger_before_release() {
        let timer = TimerSnapshot::default();
        let mut core = RepeaterCore::default();
        let on = AudioCommand::note_on(64, &timer, "keyboard");
        let off = AudioCommand::note_off(64, &timer, "keyboard");
        core.transform(vec![on.clone(), on], &timer).unwrap();
        assert!(core.transform(vec![off.clone()], &timer).unwrap().is_empty());
        assert!(core.transform(vec![off.clone()], &timer).unwrap().is_empty());
        assert_eq!(core.transform(vec![off], &timer).unwrap().len(), 1);
    }

    #[test]
    fn reset_forgets_ownership() {
        let timer = TimerSnapshot::default();
        let mut core = RepeaterCore::default();
        core.reset();
        core.transform(vec![AudioCommand::note_on(64, &timer, "k")], &timer)
            .unwrap();
        core.reset();
        core.reset();
        assert!(!core.owns(64));
    }

    #[test]
    fn config_round_trip() {
        let mut core = RepeaterCore::default();
        core.set_config("delay-ms", &FieldValue::Int(250)).unwrap();
        assert_eq!(core.config_value("delay-ms"), Ok(FieldValue::Int(250)));
        assert!(core.set_config("delay-ms", &FieldValue::Int(251)).is_err());
        assert!(core.set_config("repeats", &FieldValue::Int(0)).is_err());
        assert_eq!(core.config_value("delay-ms"), Ok(FieldValue::Int(250)));
        assert_eq!(core.config_value("repeats"), Ok(FieldValue::Int(3)));
    }
}
