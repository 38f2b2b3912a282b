// Copyright (c) 2024 Mike Tsao

use crate::{
    cores::{
        ArpeggiatorCore, FilterCore, IdentityCore, KillOldCore, MidiFilePlayerCore, QuantiseCore,
        RepeaterCore, TransposerCore,
    },
    error::ConfigError,
    traits::{Transformer, TransformerCore},
    transformers::{TransformerStage, TransformerState},
    types::Uid,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use synonym::Synonym;

/// Identifies a kind of transformer, such as a filter or an arpeggiator. It's
/// the same string as the `type` tag of a wire record.
#[derive(Synonym, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransformerKey(String);

/// Creates a boxed transformer with the given [Uid].
pub type TransformerFactoryFn = fn(Uid) -> Box<dyn Transformer>;

/// [TransformerFactory] accepts [TransformerKey]s and creates transformers. It
/// is the one place that turns a wire record back into a live stage.
#[derive(Debug, Default)]
pub struct TransformerFactory {
    transformers: FxHashMap<TransformerKey, TransformerFactoryFn>,
    keys: FxHashSet<TransformerKey>,

    is_registration_complete: bool,
    sorted_keys: Vec<TransformerKey>,
}
impl TransformerFactory {
    /// Registers a new type for the given [TransformerKey] using the given
    /// function.
    pub fn register_transformer(&mut self, key: TransformerKey, f: TransformerFactoryFn) {
        if self.is_registration_complete {
            panic!("attempt to register a transformer after registration completed");
        }
        if self.keys.insert(key.clone()) {
            self.transformers.insert(key, f);
        } else {
            panic!("register_transformer({key}): duplicate key. Exiting.");
        }
    }

    /// Same as [TransformerFactory::register_transformer()], but takes a &str.
    pub fn register_transformer_with_str_key(&mut self, key: &str, f: TransformerFactoryFn) {
        self.register_transformer(TransformerKey::from(key), f)
    }

    /// Registers a core type under its own key, constructed from its defaults.
    pub fn register_core<C: TransformerCore + Default>(&mut self) {
        self.register_transformer_with_str_key(C::KEY, |uid| {
            Box::new(TransformerStage::new_with(uid, C::default()))
        });
    }

    /// Tells the factory that we won't be registering any more transformers,
    /// allowing it to do some final housekeeping.
    pub fn finalize(mut self) -> Self {
        self.is_registration_complete = true;
        self.sorted_keys = self.keys.iter().cloned().collect();
        self.sorted_keys.sort();
        self
    }

    /// Creates a new transformer of the type corresponding to the given
    /// [TransformerKey] with the given [Uid].
    pub fn new_transformer(
        &self,
        key: &TransformerKey,
        uid: Uid,
    ) -> Result<Box<dyn Transformer>, ConfigError> {
        if let Some(f) = self.transformers.get(key) {
            let mut transformer = f(uid);
            transformer.set_uid(uid);
            Ok(transformer)
        } else {
            Err(ConfigError::UnknownType(key.to_string()))
        }
    }

    /// Rebuilds a live transformer from its wire record. The uid is kept as
    /// given, even if unassigned; the manager mints one when it's added.
    pub fn from_state(&self, state: &TransformerState) -> Result<Box<dyn Transformer>, ConfigError> {
        let key = TransformerKey::from(state.config.key());
        let mut transformer = self.new_transformer(&key, state.uid)?;
        transformer.apply_config(state.config.clone())?;
        transformer.set_enabled(state.enabled);
        Ok(transformer)
    }

    /// Parses a wire record and rebuilds the transformer it describes.
    pub fn from_json(&self, json: &str) -> Result<Box<dyn Transformer>, ConfigError> {
        self.from_state(&TransformerState::from_json(json)?)
    }

    /// Returns the [FxHashSet] of all [TransformerKey]s.
    pub fn keys(&self) -> &FxHashSet<TransformerKey> {
        &self.keys
    }

    /// Returns all the [TransformerKey]s in sorted order for consistent
    /// display in a UI.
    pub fn sorted_keys(&self) -> &[TransformerKey] {
        if !self.is_registration_complete {
            panic!("sorted_keys() can be called only after registration is complete.")
        }
        &self.sorted_keys
    }
}

/// A collection of all transformers that are suitable for normal use. Allows
/// the creation of a [TransformerFactory] that lets apps refer to
/// transformers by [TransformerKey] rather than having to import and
/// instantiate each one.
pub struct BuiltInTransformers {}
impl BuiltInTransformers {
    /// Associates each transformer type with a key. Call once at
    /// initialization.
    pub fn register(mut factory: TransformerFactory) -> TransformerFactory {
        factory.register_core::<IdentityCore>();

        // Tuning
        factory.register_core::<FilterCore>();
        factory.register_core::<TransposerCore>();

        // Timing
        factory.register_core::<QuantiseCore>();
        factory.register_core::<RepeaterCore>();
        factory.register_core::<KillOldCore>();

        // Generative
        factory.register_core::<ArpeggiatorCore>();
        factory.register_core::<MidiFilePlayerCore>();

        factory
    }

    /// A finalized factory with every built-in transformer.
    pub fn factory() -> TransformerFactory {
        Self::register(TransformerFactory::default()).finalize()
    }
}
