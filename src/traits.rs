// Copyright (c) 2024 Mike Tsao

//! The traits that define many characteristics and relationships among parts of
//! the system.

use crate::{
    error::{ConfigError, TransformError},
    timing::Timer,
    transformers::{Category, Field, FieldValue, TransformerConfig, TransformerState},
    types::{AudioCommand, MidiNote, Uid},
};
use std::any::Any;

/// Quick import of all important traits.
pub mod prelude {
    pub use super::{
        Configures, HasMetadata, PlaysNotes, Serializable, Transformer, TransformerCore,
        TransformsCommands,
    };
}

/// A [HasMetadata] has basic information about a [Transformer]. Some methods
/// apply to the "class" of transformer (for example, all filters share the name
/// "Filter"), and others apply to each instance of a class (for example, one
/// filter might be Uid 42, and another Uid 43).
pub trait HasMetadata {
    /// The [Uid] is a unique identifier for an instance of a [Transformer].
    fn uid(&self) -> Uid;
    /// Assigns a [Uid].
    fn set_uid(&mut self, uid: Uid);
    /// A string that describes this class of [Transformer]. Suitable for
    /// debugging or quick-and-dirty UIs.
    fn name(&self) -> &'static str;
    /// A kebab-case string that identifies this class of [Transformer]. It's
    /// also the `type` tag of its wire record.
    fn key(&self) -> &'static str;
}

/// Something that [TransformsCommands] maps a batch of [AudioCommand]s to a new
/// batch. It's what every pipeline stage does.
///
/// Implementations own their state exclusively. They must handle an empty
/// batch, and they must never mutate a command they might have handed out
/// earlier; build a new one with [AudioCommand::derive()] or
/// [AudioCommand::retimed()] instead.
pub trait TransformsCommands {
    /// Transforms one batch. Called once per tick, in tick order.
    fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        timer: &dyn Timer,
    ) -> anyhow::Result<Vec<AudioCommand>>;

    /// Returns Note-Offs for every note this core is sounding under a number
    /// (or from a source) that the player's own Note-Off can't reach, and
    /// forgets those notes. Called right before the core is disabled,
    /// reconfigured or taken out of a pipeline.
    fn flush(&mut self, _timer: &dyn Timer) -> Vec<AudioCommand> {
        Vec::default()
    }

    /// Clears transient per-note state. Safe to call at any quiescent point,
    /// any number of times.
    fn reset(&mut self) {}

    /// Releases external resources, such as a loaded file.
    fn destroy(&mut self) {
        self.reset();
    }
}

/// Something that [Configures] exposes a declared schema of named fields, and
/// validates every change against it.
pub trait Configures: Sized {
    /// The schema. Field order is display order.
    fn fields() -> Vec<Field>;

    /// Returns the current value of the named field.
    fn config_value(&self, name: &str) -> Result<FieldValue, ConfigError>;

    /// Returns a copy of `self` with one field changed, or an error if the
    /// field doesn't exist or the value isn't allowed. Never partially
    /// applies.
    fn with(&self, name: &str, value: &FieldValue) -> Result<Self, ConfigError>;

    /// Changes one field in place. On error, `self` is untouched.
    fn set_config(&mut self, name: &str, value: &FieldValue) -> Result<(), ConfigError> {
        *self = self.with(name, value)?;
        Ok(())
    }
}

/// Something that is [Serializable] might need to do work right before
/// serialization, or right after deserialization. These are the hooks.
pub trait Serializable {
    /// Called just before saving.
    fn before_ser(&mut self) {}
    /// Called just after loading. Derived state should be rebuilt here.
    fn after_deser(&mut self) {}
}

/// The pure logic of one kind of pipeline stage. A
/// [TransformerStage](crate::transformers::TransformerStage) wraps a core with
/// a [Uid] and an enabled flag to make a [Transformer].
pub trait TransformerCore:
    TransformsCommands + Configures + Serializable + Clone + core::fmt::Debug + Send + 'static
{
    /// The registration key, and the wire record's `type` tag.
    const KEY: &'static str;
    /// A human-readable name.
    const NAME: &'static str;
    #[allow(missing_docs)]
    const CATEGORY: Category;

    /// Wraps a copy of this core's configuration in the closed wire enum.
    fn to_config(&self) -> TransformerConfig;

    /// Unwraps the wire enum, if it holds this kind of core.
    fn from_config(config: TransformerConfig) -> Option<Self>;
}

/// A [Transformer] is one stage of a pipeline: a stateful function from a
/// command batch to a command batch, configurable and composable. Almost
/// everything in a [TransformerManager](crate::orchestration::TransformerManager)
/// is handled through this trait.
///
/// A disabled transformer passes its input through unchanged, so callers never
/// need to special-case it.
pub trait Transformer: HasMetadata + core::fmt::Debug + Send {
    /// A coarse grouping tag for UIs.
    fn category(&self) -> Category;

    #[allow(missing_docs)]
    fn is_enabled(&self) -> bool;

    /// Enables or disables the stage. A change flushes the core (see
    /// [TransformsCommands::flush()]) and then clears its transient state, so
    /// notes held before the change don't leak into the new mode. The flushed
    /// Note-Offs lead the stage's next output.
    fn set_enabled(&mut self, is_enabled: bool);

    /// Transforms a batch. On error, the batch is lost but the stage remains
    /// usable.
    fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        timer: &dyn Timer,
    ) -> Result<Vec<AudioCommand>, TransformError>;

    /// See [TransformsCommands::reset()].
    fn reset(&mut self);

    /// See [TransformsCommands::destroy()].
    fn destroy(&mut self);

    /// Flushes the core and returns the Note-Offs that end what it still
    /// holds, along with any flushed earlier but not yet sent. Call it before
    /// taking the stage out of a pipeline.
    fn release(&mut self) -> Vec<AudioCommand>;

    /// See [Configures::fields()].
    fn fields(&self) -> Vec<Field>;

    /// See [Configures::config_value()].
    fn config_value(&self, name: &str) -> Result<FieldValue, ConfigError>;

    /// See [Configures::set_config()].
    fn set_config(&mut self, name: &str, value: &FieldValue) -> Result<(), ConfigError>;

    /// A copy of the current configuration.
    fn config(&self) -> TransformerConfig;

    /// Replaces the whole configuration, discarding transient state after
    /// flushing it. Fails if the config is for a different kind of
    /// transformer.
    fn apply_config(&mut self, config: TransformerConfig) -> Result<(), ConfigError>;

    /// The wire record for this stage.
    fn state(&self) -> TransformerState {
        TransformerState {
            uid: self.uid(),
            enabled: self.is_enabled(),
            config: self.config(),
        }
    }

    #[allow(missing_docs)]
    fn as_any(&self) -> &dyn Any;

    #[allow(missing_docs)]
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Something that [PlaysNotes] is an output at the end of a pipeline: a synth,
/// an external MIDI port, or an onscreen keyboard.
pub trait PlaysNotes: core::fmt::Debug {
    #[allow(missing_docs)]
    fn note_on(&mut self, note: MidiNote, velocity: u8);

    #[allow(missing_docs)]
    fn note_off(&mut self, note: MidiNote);

    /// Silences everything. Called when the transport stops.
    fn all_notes_off(&mut self);
}
