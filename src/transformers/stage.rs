// Copyright (c) 2024 Mike Tsao

use crate::{
    error::{ConfigError, TransformError},
    timing::{Timer, TimerSnapshot},
    traits::{HasMetadata, Transformer, TransformerCore},
    transformers::{Category, Field, FieldValue, TransformerConfig},
    types::{AudioCommand, Uid},
};
use std::any::Any;

/// Wraps a [TransformerCore] with the parts every stage has in common: a
/// [Uid] and an enabled flag. This is where disabled stages become
/// pass-through, so no core has to handle it.
///
/// Enabling, disabling or reconfiguring can happen between ticks, when no
/// timer is at hand. The stage flushes the core against the last timer it
/// saw, and holds the resulting Note-Offs until its next output.
#[derive(Debug, Clone)]
pub struct TransformerStage<C: TransformerCore> {
    uid: Uid,
    is_enabled: bool,
    inner: C,
    last_timer: TimerSnapshot,
    released: Vec<AudioCommand>,
}
impl<C: TransformerCore + Default> Default for TransformerStage<C> {
    fn default() -> Self {
        Self::new_with(Uid::default(), C::default())
    }
}
impl<C: TransformerCore> TransformerStage<C> {
    #[allow(missing_docs)]
    pub fn new_with(uid: Uid, inner: C) -> Self {
        Self {
            uid,
            is_enabled: true,
            inner,
            last_timer: TimerSnapshot::default(),
            released: Vec::default(),
        }
    }

    /// Note-Offs flushed from the core that haven't gone out yet.
    pub fn released(&self) -> &[AudioCommand] {
        &self.released
    }

    fn flush_inner(&mut self) {
        let released = self.inner.flush(&self.last_timer);
        if !released.is_empty() {
            log::debug!(
                "{} {}: releasing {} held notes",
                C::KEY,
                self.uid,
                released.len()
            );
            self.released.extend(released);
        }
    }

    #[allow(missing_docs)]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    #[allow(missing_docs)]
    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }
}
impl<C: TransformerCore> HasMetadata for TransformerStage<C> {
    fn uid(&self) -> Uid {
        self.uid
    }

    fn set_uid(&mut self, uid: Uid) {
        self.uid = uid;
    }

    fn name(&self) -> &'static str {
        C::NAME
    }

    fn key(&self) -> &'static str {
        C::KEY
    }
}
impl<C: TransformerCore> Transformer for TransformerStage<C> {
    fn category(&self) -> Category {
        C::CATEGORY
    }

    fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    fn set_enabled(&mut self, is_enabled: bool) {
        if is_enabled != self.is_enabled {
            self.flush_inner();
            self.inner.reset();
            self.is_enabled = is_enabled;
        }
    }

    fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        timer: &dyn Timer,
    ) -> Result<Vec<AudioCommand>, TransformError> {
        self.last_timer = TimerSnapshot::capture(timer);
        let output = if self.is_enabled {
            self.inner
                .transform(commands, timer)
                .map_err(|e| TransformError::Stage {
                    uid: self.uid,
                    key: C::KEY.to_string(),
                    reason: format!("{e:#}"),
                })?
        } else {
            commands
        };
        if self.released.is_empty() {
            return Ok(output);
        }
        let mut r = std::mem::take(&mut self.released);
        r.extend(output);
        Ok(r)
    }

    fn reset(&mut self) {
        self.released.clear();
        self.inner.reset();
    }

    fn destroy(&mut self) {
        self.released.clear();
        self.inner.destroy();
    }

    fn release(&mut self) -> Vec<AudioCommand> {
        self.flush_inner();
        std::mem::take(&mut self.released)
    }

    fn fields(&self) -> Vec<Field> {
        C::fields()
    }

    fn config_value(&self, name: &str) -> Result<FieldValue, ConfigError> {
        self.inner.config_value(name)
    }

    fn set_config(&mut self, name: &str, value: &FieldValue) -> Result<(), ConfigError> {
        self.inner.set_config(name, value)
    }

    fn config(&self) -> TransformerConfig {
        self.inner.to_config()
    }

    fn apply_config(&mut self, config: TransformerConfig) -> Result<(), ConfigError> {
        let key = config.key();
        let Some(mut inner) = C::from_config(config) else {
            return Err(ConfigError::Malformed(format!(
                "a {key} config can't configure a {} stage",
                C::KEY
            )));
        };
        inner.after_deser();
        self.flush_inner();
        self.inner.destroy();
        self.inner = inner;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cores::{FilterCore, IdentityCore, RepeaterCore, TransposerCore},
        timing::TimerSnapshot,
        types::Seconds,
    };

    fn batch(timer: &TimerSnapshot) -> Vec<AudioCommand> {
        vec![
            AudioCommand::note_on(59, timer, "test"),
            AudioCommand::control_change(7, 100, timer, "test"),
            AudioCommand::note_on(60, timer, "test"),
            AudioCommand::note_off(59, timer, "test"),
            AudioCommand::note_off(60, timer, "test"),
        ]
    }

    fn assert_disabled_is_identity<C: TransformerCore + Default>() {
        let timer = TimerSnapshot::new_with(120.0, Seconds(1.0), Seconds::zero());
        let mut stage = TransformerStage::new_with(Uid(1), C::default());
        stage.set_enabled(false);
        assert!(!stage.is_enabled());
        let b = batch(&timer);
        assert_eq!(
            stage.transform(b.clone(), &timer).unwrap(),
            b,
            "a disabled {} should pass everything through",
            C::KEY
        );
        assert!(stage.transform(Vec::default(), &timer).unwrap().is_empty());
    }

    #[test]
    fn disabled_stage_is_identity() {
        assert_disabled_is_identity::<IdentityCore>();
        assert_disabled_is_identity::<FilterCore>();
        assert_disabled_is_identity::<TransposerCore>();
        assert_disabled_is_identity::<RepeaterCore>();
        assert_disabled_is_identity::<crate::cores::QuantiseCore>();
        assert_disabled_is_identity::<crate::cores::KillOldCore>();
        assert_disabled_is_identity::<crate::cores::ArpeggiatorCore>();
        assert_disabled_is_identity::<crate::cores::MidiFilePlayerCore>();
    }

    #[test]
    fn disabling_releases_notes_under_their_mapped_numbers() {
        let timer = TimerSnapshot::new_with(120.0, Seconds(1.0), Seconds::zero());
        let mut stage = TransformerStage::new_with(
            Uid(1),
            crate::cores::TransposerCoreBuilder::default()
                .semitones(2)
                .build()
                .unwrap(),
        );
        let out = stage
            .transform(vec![AudioCommand::note_on(60, &timer, "k")], &timer)
            .unwrap();
        assert_eq!(out[0].number, 62);

        stage.set_enabled(false);
        assert_eq!(stage.released().len(), 1);
        let later = timer.at(Seconds(1.5));
        let out = stage
            .transform(vec![AudioCommand::note_off(60, &later, "k")], &later)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].is_note_off());
        assert_eq!(out[0].number, 62, "the held note is released as it sounds");
        assert_eq!(out[0].start_at, Seconds(1.0), "stamped with the last timer seen");
        assert_eq!(out[1].number, 60, "then the input passes through");
        assert!(stage.released().is_empty());
    }

    #[test]
    fn reconfiguring_and_releasing_flush_the_core() {
        let timer = TimerSnapshot::default();
        let mut stage = TransformerStage::new_with(Uid(1), TransposerCore::default());
        stage.set_config("semitones", &FieldValue::Int(5)).unwrap();
        stage
            .transform(vec![AudioCommand::note_on(60, &timer, "k")], &timer)
            .unwrap();
        stage
            .apply_config(TransformerConfig::Transposer(TransposerCore::default()))
            .unwrap();
        let released = stage.release();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].number, 65);
        assert!(stage.release().is_empty());

        stage
            .transform(vec![AudioCommand::note_on(60, &timer, "k")], &timer)
            .unwrap();
        stage.set_enabled(false);
        stage.reset();
        assert!(stage.released().is_empty(), "a transport stop forgets them");
    }

    #[test]
    fn metadata_comes_from_core() {
        let mut stage = TransformerStage::<FilterCore>::default();
        assert_eq!(stage.uid(), Uid::default());
        stage.set_uid(Uid(9));
        assert_eq!(stage.uid(), Uid(9));
        assert_eq!(stage.key(), "filter");
        assert_eq!(stage.name(), "Filter");
        assert_eq!(stage.category(), Category::Tuning);
        assert_eq!(stage.state().uid, Uid(9));
    }

    #[test]
    fn apply_config_rejects_other_kinds() {
        let mut stage = TransformerStage::<FilterCore>::default();
        stage
            .set_config("lower", &FieldValue::Int(40))
            .expect("40 is in range");
        assert!(matches!(
            stage.apply_config(TransformerConfig::Identity(IdentityCore::default())),
            Err(ConfigError::Malformed(_))
        ));
        assert_eq!(
            stage.config_value("lower"),
            Ok(FieldValue::Int(40)),
            "a rejected config should leave the old one alone"
        );
    }
}
