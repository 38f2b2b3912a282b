// Copyright (c) 2024 Mike Tsao

//! Typed errors for configuring and running pipelines.

use crate::types::Uid;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Something went wrong while configuring a transformer. A stage that returns
/// one of these has kept its previous configuration.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigError {
    /// The transformer has no field by this name.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// The value isn't one of the field's allowed values.
    #[error("invalid value {value} for field '{field}'")]
    InvalidValue {
        #[allow(missing_docs)]
        field: String,
        #[allow(missing_docs)]
        value: String,
    },

    /// No transformer is registered under this key.
    #[error("unknown transformer type '{0}'")]
    UnknownType(String),

    /// A wire record couldn't be understood.
    #[error("malformed transformer state: {0}")]
    Malformed(String),
}
impl ConfigError {
    pub(crate) fn invalid(field: &str, value: impl std::fmt::Display) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub(crate) fn unknown_field(field: &str) -> Self {
        Self::UnknownField(field.to_string())
    }
}

/// A stage failed while transforming a batch. The batch is lost, but the stage
/// and the rest of the pipeline remain usable.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformError {
    #[allow(missing_docs)]
    #[error("stage {uid} ({key}) failed: {reason}")]
    Stage {
        uid: Uid,
        key: String,
        reason: String,
    },
}
impl TransformError {
    /// The uid of the stage that failed.
    pub fn uid(&self) -> Uid {
        match self {
            TransformError::Stage { uid, .. } => *uid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_culprit() {
        let e = ConfigError::invalid("lower", 200);
        assert_eq!(e.to_string(), "invalid value 200 for field 'lower'");

        let e = TransformError::Stage {
            uid: Uid(7),
            key: "repeater".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(e.uid(), Uid(7));
        assert!(e.to_string().contains("repeater"));
        assert!(e.to_string().contains("boom"));
    }
}
