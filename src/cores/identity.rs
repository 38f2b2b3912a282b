// Copyright (c) 2024 Mike Tsao

use crate::{
    error::ConfigError,
    timing::Timer,
    traits::{Configures, Serializable, TransformerCore, TransformsCommands},
    transformers::{Category, Field, FieldValue, TransformerConfig},
    types::AudioCommand,
};
use serde::{Deserialize, Serialize};

/// Returns its input unchanged. It's the default single-stage pipeline and the
/// smallest example of a core.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityCore {}
impl TransformsCommands for IdentityCore {
    fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        _timer: &dyn Timer,
    ) -> anyhow::Result<Vec<AudioCommand>> {
        Ok(commands)
    }
}
impl Configures for IdentityCore {
    fn fields() -> Vec<Field> {
        Vec::default()
    }

    fn config_value(&self, name: &str) -> Result<FieldValue, ConfigError> {
        Err(ConfigError::unknown_field(name))
    }

    fn with(&self, name: &str, _value: &FieldValue) -> Result<Self, ConfigError> {
        Err(ConfigError::unknown_field(name))
    }
}
impl Serializable for IdentityCore {}
impl TransformerCore for IdentityCore {
    const KEY: &'static str = "identity";
    const NAME: &'static str = "Identity";
    const CATEGORY: Category = Category::Utility;

    fn to_config(&self) -> TransformerConfig {
        TransformerConfig::Identity(self.clone())
    }

    fn from_config(config: TransformerConfig) -> Option<Self> {
        match config {
            TransformerConfig::Identity(core) => Some(core),
            _ => None,
        }
    }
}
