// Copyright (c) 2024 Mike Tsao

use crate::{
    error::ConfigError,
    timing::Timer,
    traits::{Configures, Serializable, TransformerCore, TransformsCommands},
    transformers::{enum_of, enum_value, validate, Category, Field, FieldValue, TransformerConfig},
    types::{AudioCommand, CommandKind, MidiNote, Seconds, Subdivision},
};
use derivative::Derivative;
use derive_builder::Builder;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Moves each Note-On onto the timer's grid, and moves its Note-Off by the same
/// amount so the note keeps its length.
///
/// This core has no grid arithmetic of its own. It asks [Timer::quantise()],
/// which is the only place grid lines are computed.
#[derive(Clone, Builder, Debug, Derivative, Serialize, Deserialize)]
#[builder_impl_attr(allow(missing_docs))]
#[derivative(Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
#[builder(default)]
pub struct QuantiseCore {
    subdivision: Subdivision,

    #[serde(skip)]
    #[builder(setter(skip))]
    #[derivative(PartialEq = "ignore")]
    e: QuantiseEphemerals,
}
#[derive(Clone, Debug, Default)]
pub struct QuantiseEphemerals {
    /// For each sounding note, where its Note-On landed and how far it moved.
    /// A retriggered note queues a second entry, and Note-Offs take them in
    /// press order.
    shifts: FxHashMap<MidiNote, VecDeque<(Seconds, Seconds)>>,
}
impl QuantiseCore {
    #[allow(missing_docs)]
    pub fn subdivision(&self) -> Subdivision {
        self.subdivision
    }

    fn take_shift(&mut self, note: MidiNote) -> Option<(Seconds, Seconds)> {
        let queue = self.e.shifts.get_mut(&note)?;
        let shift = queue.pop_front();
        if queue.is_empty() {
            self.e.shifts.remove(&note);
        }
        shift
    }
}
impl TransformsCommands for QuantiseCore {
    fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        timer: &dyn Timer,
    ) -> anyhow::Result<Vec<AudioCommand>> {
        let mut r = Vec::with_capacity(commands.len());
        for command in commands {
            match command.kind {
                CommandKind::NoteOn => {
                    if !command.start_at.is_finite() {
                        log::warn!(
                            "quantise: note {} has unusable start time {}; passing it through",
                            command.number,
                            command.start_at
                        );
                        self.e
                            .shifts
                            .entry(command.number)
                            .or_default()
                            .push_back((command.start_at, Seconds::zero()));
                        r.push(command);
                        continue;
                    }
                    let snapped = timer.quantise(command.start_at, self.subdivision);
                    let delta = snapped - command.start_at;
                    self.e
                        .shifts
                        .entry(command.number)
                        .or_default()
                        .push_back((snapped, delta));
                    if delta == Seconds::zero() {
                        r.push(command);
                    } else {
                        r.push(command.retimed(snapped, Self::KEY));
                    }
                }
                CommandKind::NoteOff => match self.take_shift(command.number) {
                    Some((note_on_at, delta)) if delta != Seconds::zero() => {
                        let start_at = (command.start_at + delta).max(note_on_at);
                        r.push(command.retimed(start_at, Self::KEY));
                    }
                    _ => r.push(command),
                },
                _ => r.push(command),
            }
        }
        Ok(r)
    }

    fn reset(&mut self) {
        self.e.shifts.clear();
    }
}
impl Configures for QuantiseCore {
    fn fields() -> Vec<Field> {
        vec![Field::from_enum::<Subdivision>("subdivision", "Grid")]
    }

    fn config_value(&self, name: &str) -> Result<FieldValue, ConfigError> {
        match name {
            "subdivision" => Ok(enum_value(self.subdivision)),
            _ => Err(ConfigError::unknown_field(name)),
        }
    }

    fn with(&self, name: &str, value: &FieldValue) -> Result<Self, ConfigError> {
        validate(&Self::fields(), name, value)?;
        let mut r = self.clone();
        match name {
            "subdivision" => r.subdivision = enum_of(name, value)?,
            _ => return Err(ConfigError::unknown_field(name)),
        }
        Ok(r)
    }
}
impl Serializable for QuantiseCore {}
impl TransformerCore for QuantiseCore {
    const KEY: &'static str = "quantise";
    const NAME: &'static str = "Quantiser";
    const CATEGORY: Category = Category::Timing;

    fn to_config(&self) -> TransformerConfig {
        TransformerConfig::Quantise(self.clone())
    }

    fn from_config(config: TransformerConfig) -> Option<Self> {
        match config {
            TransformerConfig::Quantise(core) => Some(core),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::TimerSnapshot;
    use float_cmp::approx_eq;

    fn at(kind: CommandKind, note: u8, t: f64, timer: &TimerSnapshot) -> AudioCommand {
        AudioCommand::new_with(kind, note, timer, "test").with_start_at(Seconds(t))
    }

    #[test]
    fn snaps_note_on_and_shifts_note_off() {
        // Sixteenths at 120 BPM are 0.125s apart.
        let timer = TimerSnapshot::new_with(120.0, Seconds(1.0), Seconds::zero());
        let mut core = QuantiseCore::default();
        let out = core
            .transform(
                vec![
                    at(CommandKind::NoteOn, 60, 0.3, &timer),
                    at(CommandKind::NoteOn, 62, 0.2, &timer),
                ],
                &timer,
            )
            .unwrap();
        assert!(approx_eq!(f64, out[0].start_at.0, 0.25, epsilon = 1e-9));
        assert!(approx_eq!(f64, out[1].start_at.0, 0.25, epsilon = 1e-9));
        assert_eq!(out[0].source, "quantise");

        let out = core
            .transform(
                vec![
                    at(CommandKind::NoteOff, 60, 0.5, &timer),
                    at(CommandKind::NoteOff, 62, 0.21, &timer),
                ],
                &timer,
            )
            .unwrap();
        assert!(approx_eq!(f64, out[0].start_at.0, 0.45, epsilon = 1e-9));
        assert!(approx_eq!(f64, out[1].start_at.0, 0.26, epsilon = 1e-9));
    }

    #[test]
    fn note_off_never_precedes_its_note_on() {
        let timer = TimerSnapshot::new_with(120.0, Seconds(1.0), Seconds::zero());
        let mut core = QuantiseCoreBuilder::default()
            .subdivision(Subdivision::Quarter)
            .build()
            .unwrap();
        let on = core
            .transform(vec![at(CommandKind::NoteOn, 60, 0.3, &timer)], &timer)
            .unwrap();
        assert!(approx_eq!(f64, on[0].start_at.0, 0.5, epsilon = 1e-9));
        let off = core
            .transform(vec![at(CommandKind::NoteOff, 60, f64::NAN, &timer)], &timer)
            .unwrap();
        assert_eq!(off[0].start_at, Seconds(0.5));
    }

    #[test]
    fn retriggered_note_offs_keep_their_own_shifts() {
        let timer = TimerSnapshot::new_with(120.0, Seconds(1.0), Seconds::zero());
        let mut core = QuantiseCore::default();
        let out = core
            .transform(
                vec![
                    at(CommandKind::NoteOn, 60, 0.3, &timer),
                    at(CommandKind::NoteOn, 60, 0.51, &timer),
                ],
                &timer,
            )
            .unwrap();
        assert!(approx_eq!(f64, out[0].start_at.0, 0.25, epsilon = 1e-9));
        assert!(approx_eq!(f64, out[1].start_at.0, 0.5, epsilon = 1e-9));

        let out = core
            .transform(
                vec![
                    at(CommandKind::NoteOff, 60, 0.6, &timer),
                    at(CommandKind::NoteOff, 60, 0.7, &timer),
                ],
                &timer,
            )
            .unwrap();
        assert!(
            approx_eq!(f64, out[0].start_at.0, 0.55, epsilon = 1e-9),
            "the first release moves with the first press"
        );
        assert!(approx_eq!(f64, out[1].start_at.0, 0.69, epsilon = 1e-9));

        let stray = at(CommandKind::NoteOff, 60, 0.8, &timer);
        assert_eq!(core.transform(vec![stray.clone()], &timer).unwrap(), vec![stray]);
    }

    #[test]
    fn on_grid_and_unknown_events_are_untouched() {
        let timer = TimerSnapshot::new_with(120.0, Seconds(1.0), Seconds::zero());
        let mut core = QuantiseCore::default();
        let batch = vec![
            at(CommandKind::NoteOn, 60, 0.25, &timer),
            at(CommandKind::NoteOff, 61, 0.3, &timer),
            at(CommandKind::ControlChange, 1, 0.3, &timer),
            at(CommandKind::NoteOn, 62, f64::NAN, &timer),
        ];
        let out = core.transform(batch.clone(), &timer).unwrap();
        assert_eq!(out.len(), batch.len());
        assert_eq!(out[..3], batch[..3]);
        assert!(out[3].start_at.0.is_nan());
    }

    #[test]
    fn config_round_trip() {
        let mut core = QuantiseCore::default();
        assert_eq!(core.config_value("subdivision"), Ok("sixteenth".into()));
        core.set_config("subdivision", &"eighth".into()).unwrap();
        assert_eq!(core.subdivision(), Subdivision::Eighth);
        assert!(core.set_config("subdivision", &"triplet".into()).is_err());
        assert_eq!(core.config_value("subdivision"), Ok("eighth".into()));
    }
}
