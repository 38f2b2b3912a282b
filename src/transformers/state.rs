// Copyright (c) 2024 Mike Tsao

use crate::{
    cores::{
        ArpeggiatorCore, FilterCore, IdentityCore, KillOldCore, MidiFilePlayerCore, QuantiseCore,
        RepeaterCore, TransposerCore,
    },
    error::ConfigError,
    traits::TransformerCore,
    types::Uid,
};
use derivative::Derivative;
use serde::{Deserialize, Serialize};

/// The configuration of every built-in kind of transformer. On the wire, the
/// variant is the `type` tag and the core's fields sit beside it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[allow(missing_docs)]
pub enum TransformerConfig {
    Identity(IdentityCore),
    Filter(FilterCore),
    Transposer(TransposerCore),
    Repeater(RepeaterCore),
    Quantise(QuantiseCore),
    KillOld(KillOldCore),
    Arpeggiator(ArpeggiatorCore),
    MidiFilePlayer(MidiFilePlayerCore),
}
impl Default for TransformerConfig {
    fn default() -> Self {
        Self::Identity(IdentityCore::default())
    }
}
impl TransformerConfig {
    /// The registration key of the transformer this config belongs to.
    pub fn key(&self) -> &'static str {
        match self {
            TransformerConfig::Identity(_) => IdentityCore::KEY,
            TransformerConfig::Filter(_) => FilterCore::KEY,
            TransformerConfig::Transposer(_) => TransposerCore::KEY,
            TransformerConfig::Repeater(_) => RepeaterCore::KEY,
            TransformerConfig::Quantise(_) => QuantiseCore::KEY,
            TransformerConfig::KillOld(_) => KillOldCore::KEY,
            TransformerConfig::Arpeggiator(_) => ArpeggiatorCore::KEY,
            TransformerConfig::MidiFilePlayer(_) => MidiFilePlayerCore::KEY,
        }
    }
}

/// The persisted/transmitted form of one pipeline stage:
/// `{"uid": 3, "enabled": true, "type": "filter", ...config fields}`.
#[derive(Clone, Debug, Derivative, PartialEq, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(rename_all = "kebab-case")]
pub struct TransformerState {
    /// Zero means "mint one for me."
    #[serde(default)]
    pub uid: Uid,

    #[allow(missing_docs)]
    #[serde(default = "TransformerState::default_enabled")]
    #[derivative(Default(value = "true"))]
    pub enabled: bool,

    #[allow(missing_docs)]
    #[serde(flatten)]
    pub config: TransformerConfig,
}
impl TransformerState {
    fn default_enabled() -> bool {
        true
    }

    /// An enabled stage with an unassigned uid.
    pub fn new_with(config: TransformerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Parses one wire record. An unregistered `type` is reported as
    /// [ConfigError::UnknownType]; anything else wrong is
    /// [ConfigError::Malformed].
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let Some(key) = value.get("type").and_then(|t| t.as_str()) else {
            return Err(ConfigError::Malformed("missing 'type'".to_string()));
        };
        if !Self::is_known_key(key) {
            return Err(ConfigError::UnknownType(key.to_string()));
        }
        serde_json::from_value(value).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    #[allow(missing_docs)]
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    #[allow(missing_docs)]
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn is_known_key(key: &str) -> bool {
        [
            IdentityCore::KEY,
            FilterCore::KEY,
            TransposerCore::KEY,
            RepeaterCore::KEY,
            QuantiseCore::KEY,
            KillOldCore::KEY,
            ArpeggiatorCore::KEY,
            MidiFilePlayerCore::KEY,
        ]
        .contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cores::{FilterCoreBuilder, FilterMode};

    #[test]
    fn wire_record_is_flat() {
        let state = TransformerState {
            uid: Uid(3),
            enabled: false,
            config: TransformerConfig::Filter(
                FilterCoreBuilder::default()
                    .lower(60)
                    .upper(64)
                    .mode(FilterMode::Exclude)
                    .build()
                    .unwrap(),
            ),
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["type"], "filter");
        assert_eq!(value["uid"], 3);
        assert_eq!(value["enabled"], false);
        assert_eq!(value["lower"], 60);
        assert_eq!(value["mode"], "exclude");

        let back = TransformerState::from_value(value).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let state = TransformerState::from_json(r#"{"type": "kill-old"}"#).unwrap();
        assert_eq!(state.uid, Uid::default());
        assert!(state.enabled);
        assert_eq!(
            state.config,
            TransformerConfig::KillOld(KillOldCore::default())
        );
        assert_eq!(state.config.key(), "kill-old");
    }

    #[test]
    fn bad_records() {
        assert_eq!(
            TransformerState::from_json(r#"{"type": "reverb"}"#),
            Err(ConfigError::UnknownType("reverb".to_string())),
            "unknown type is a hard error"
        );
        assert!(matches!(
            TransformerState::from_json(r#"{"lower": 3}"#),
            Err(ConfigError::Malformed(_))
        ));
        assert!(matches!(
            TransformerState::from_json(r#"{"type": "filter", "lower": "low"}"#),
            Err(ConfigError::Malformed(_))
        ));
        assert!(matches!(
            TransformerState::from_json("{"),
            Err(ConfigError::Malformed(_))
        ));
    }
}
