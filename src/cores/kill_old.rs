// Copyright (c) 2024 Mike Tsao

use crate::{
    error::ConfigError,
    timing::Timer,
    traits::{Configures, Serializable, TransformerCore, TransformsCommands},
    transformers::{int_of, validate, Category, Field, FieldValue, TransformerConfig},
    types::{AudioCommand, CommandKind, MidiNote},
};
use derivative::Derivative;
use derive_builder::Builder;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Force-closes notes that have been held longer than `max-bars` bars.
///
/// When a note is killed, the player's eventual Note-Off for it is swallowed
/// so downstream never sees two releases for one press.
#[derive(Clone, Builder, Debug, Derivative, Serialize, Deserialize)]
#[builder_impl_attr(allow(missing_docs))]
#[derivative(Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
#[builder(default)]
pub struct KillOldCore {
    #[derivative(Default(value = "4"))]
    max_bars: u8,

    #[serde(skip)]
    #[builder(setter(skip))]
    #[derivative(PartialEq = "ignore")]
    e: KillOldEphemerals,
}
#[derive(Clone, Debug, Default)]
pub struct KillOldEphemerals {
    sounding: FxHashMap<MidiNote, AudioCommand>,
    killed: FxHashSet<MidiNote>,
}
impl KillOldCore {
    /// Allowed values for `max-bars`.
    pub const MAX_BARS: [i64; 5] = [1, 2, 4, 8, 16];

    #[allow(missing_docs)]
    pub fn max_bars(&self) -> u8 {
        self.max_bars
    }

    /// How many notes we're watching.
    pub fn sounding_count(&self) -> usize {
        self.e.sounding.len()
    }
}
impl TransformsCommands for KillOldCore {
    fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        timer: &dyn Timer,
    ) -> anyhow::Result<Vec<AudioCommand>> {
        let mut r = Vec::with_capacity(commands.len());
        for command in commands {
            match command.kind {
                CommandKind::NoteOn => {
                    self.e.killed.remove(&command.number);
                    self.e.sounding.insert(command.number, command.clone());
                    r.push(command);
                }
                CommandKind::NoteOff => {
                    if self.e.sounding.remove(&command.number).is_some()
                        || !self.e.killed.remove(&command.number)
                    {
                        r.push(command);
                    }
                }
                _ => r.push(command),
            }
        }

        let limit = timer.bar_duration() * self.max_bars as f64;
        if limit.0 <= 0.0 {
            return Ok(r);
        }
        let now = timer.now();
        let mut expired: Vec<MidiNote> = self
            .e
            .sounding
            .iter()
            .filter(|(_, note_on)| (now - note_on.start_at).0 >= limit.0)
            .map(|(note, _)| *note)
            .collect();
        expired.sort_unstable();
        for note in expired {
            if let Some(note_on) = self.e.sounding.remove(&note) {
                log::debug!("kill-old: closing note {note} held since {}", note_on.start_at);
                r.push(note_on.paired_note_off(now, Self::KEY));
                self.e.killed.insert(note);
            }
        }
        Ok(r)
    }

    fn reset(&mut self) {
        self.e.sounding.clear();
        self.e.killed.clear();
    }
}
impl Configures for KillOldCore {
    fn fields() -> Vec<Field> {
        vec![Field::int_values(
            "max-bars",
            "Longest note (bars)",
            &Self::MAX_BARS,
        )]
    }

    fn config_value(&self, name: &str) -> Result<FieldValue, ConfigError> {
        match name {
            "max-bars" => Ok(FieldValue::Int(self.max_bars as i64)),
            _ => Err(ConfigError::unknown_field(name)),
        }
    }

    fn with(&self, name: &str, value: &FieldValue) -> Result<Self, ConfigError> {
        validate(&Self::fields(), name, value)?;
        let mut r = self.clone();
        match name {
            "max-bars" => r.max_bars = int_of(name, value)?,
            _ => return Err(ConfigError::unknown_field(name)),
        }
        Ok(r)
    }
}
impl Serializable for KillOldCore {}
impl TransformerCore for KillOldCore {
    const KEY: &'static str = "kill-old";
    const NAME: &'static str = "Kill Old Notes";
    const CATEGORY: Category = Category::Timing;

    fn to_config(&self) -> TransformerConfig {
        TransformerConfig::KillOld(self.clone())
    }

    fn from_config(config: TransformerConfig) -> Option<Self> {
        match config {
            TransformerConfig::KillOld(core) => Some(core),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{timing::TimerSnapshot, types::Seconds};

    #[test]
    fn closes_notes_held_too_long() {
        // One 4/4 bar at 120 BPM is two seconds.
        let mut timer = TimerSnapshot::new_with(120.0, Seconds::zero(), Seconds::zero());
        let mut core = KillOldCoreBuilder::default().max_bars(1).build().unwrap();

        let out = core
            .transform(
                vec![
                    AudioCommand::note_on(60, &timer, "k").with_velocity(80),
                    AudioCommand::note_on(64, &timer, "k"),
                ],
                &timer,
            )
            .unwrap();
        assert_eq!(out.len(), 2, "note-ons pass through");

        timer = timer.at(Seconds(1.0));
        let out = core
            .transform(vec![AudioCommand::note_off(64, &timer, "k")], &timer)
            .unwrap();
        assert_eq!(out.len(), 1, "a timely Note-Off passes through");
        assert_eq!(core.sounding_count(), 1);

        timer = timer.at(Seconds(2.5));
        let out = core.transform(Vec::default(), &timer).unwrap();
        assert_eq!(out.len(), 1, "an empty batch can still produce a kill");
        assert!(out[0].is_note_off());
        assert_eq!(out[0].number, 60);
        assert_eq!(out[0].velocity, 80);
        assert_eq!(out[0].start_at, Seconds(2.5));
        assert_eq!(out[0].source, "kill-old");

        timer = timer.at(Seconds(3.0));
        assert!(
            core.transform(vec![AudioCommand::note_off(60, &timer, "k")], &timer)
                .unwrap()
                .is_empty(),
            "the late Note-Off for a killed note is swallowed"
        );
        assert_eq!(
            core.transform(vec![AudioCommand::note_off(60, &timer, "k")], &timer)
                .unwrap()
                .len(),
            1,
            "but only once"
        );
    }

    #[test]
    fn retrigger_clears_kill_marker() {
        let mut timer = TimerSnapshot::new_with(120.0, Seconds::zero(), Seconds::zero());
        let mut core = KillOldCoreBuilder::default().max_bars(1).build().unwrap();
        core.transform(vec![AudioCommand::note_on(60, &timer, "k")], &timer)
            .unwrap();
        timer = timer.at(Seconds(2.0));
        assert_eq!(core.transform(Vec::default(), &timer).unwrap().len(), 1);

        let out = core
            .transform(
                vec![
                    AudioCommand::note_on(60, &timer, "k"),
                    AudioCommand::note_off(60, &timer, "k"),
                ],
                &timer,
            )
            .unwrap();
        assert_eq!(out.len(), 2, "a fresh press-and-release is not swallowed");
    }

    #[test]
    fn bad_tempo_never_kills() {
        let mut timer = TimerSnapshot::new_with(0.0, Seconds::zero(), Seconds::zero());
        let mut core = KillOldCore::default();
        core.transform(vec![AudioCommand::note_on(60, &timer, "k")], &timer)
            .unwrap();
        timer = timer.at(Seconds(1000.0));
        assert!(core.transform(Vec::default(), &timer).unwrap().is_empty());
        core.reset();
        assert_eq!(core.sounding_count(), 0);
    }

    #[test]
    fn config_round_trip() {
        let mut core = KillOldCore::default();
        assert_eq!(core.config_value("max-bars"), Ok(FieldValue::Int(4)));
        core.set_config("max-bars", &FieldValue::Int(8)).unwrap();
        assert!(core.set_config("max-bars", &FieldValue::Int(3)).is_err());
        assert_eq!(core.max_bars(), 8);
    }
}
