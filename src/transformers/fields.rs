// Copyright (c) 2024 Mike Tsao

//! Configuration schemas. Each transformer declares its fields here, and every
//! change is checked against them before it's applied.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, IntoStaticStr};

/// A configuration value as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[allow(missing_docs)]
    Bool(bool),
    #[allow(missing_docs)]
    Int(i64),
    #[allow(missing_docs)]
    Text(String),
}
impl FieldValue {
    #[allow(missing_docs)]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Text(v) => write!(f, "'{v}'"),
        }
    }
}
impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}
impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// How a UI should present a [Field]. The engine only cares whether a value is
/// allowed.
#[derive(
    Clone, Copy, Debug, Display, EnumIter, Eq, IntoStaticStr, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FieldKind {
    /// One of an ordered set of allowed values.
    Select,
    /// A boolean.
    Toggle,
    /// Free text, such as a file path.
    Text,
    /// An integer within [Field::bounds], for ranges too wide to list.
    Number,
}

/// One allowed value of a [FieldKind::Select] field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    #[allow(missing_docs)]
    pub value: FieldValue,
    /// What a UI shows for this value.
    pub label: String,
}

/// One entry in a transformer's configuration schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Field {
    /// The kebab-case name used by `set_config()` and the wire record.
    pub name: String,
    #[allow(missing_docs)]
    pub label: String,
    #[allow(missing_docs)]
    pub kind: FieldKind,
    /// Allowed values, in display order. Empty unless `kind` is
    /// [FieldKind::Select].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    /// Inclusive limits. `None` unless `kind` is [FieldKind::Number].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<(i64, i64)>,
}
impl Field {
    /// A select field with explicit options.
    pub fn select(name: &str, label: &str, options: Vec<FieldOption>) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Select,
            options,
            bounds: None,
        }
    }

    /// A select field over a contiguous range of integers.
    pub fn int_range(name: &str, label: &str, range: core::ops::RangeInclusive<i64>) -> Self {
        Self::select(
            name,
            label,
            range
                .map(|v| FieldOption {
                    value: FieldValue::Int(v),
                    label: v.to_string(),
                })
                .collect(),
        )
    }

    /// A select field over an explicit list of integers.
    pub fn int_values(name: &str, label: &str, values: &[i64]) -> Self {
        Self::select(
            name,
            label,
            values
                .iter()
                .map(|v| FieldOption {
                    value: FieldValue::Int(*v),
                    label: v.to_string(),
                })
                .collect(),
        )
    }

    /// A select field over every variant of a strum-enumerable enum. Values
    /// are the variants' kebab-case names.
    pub fn from_enum<E>(name: &str, label: &str) -> Self
    where
        E: IntoEnumIterator + Into<&'static str>,
    {
        Self::select(
            name,
            label,
            E::iter()
                .map(|e| {
                    let s: &'static str = e.into();
                    FieldOption {
                        value: FieldValue::Text(s.to_string()),
                        label: s.to_string(),
                    }
                })
                .collect(),
        )
    }

    #[allow(missing_docs)]
    pub fn toggle(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Toggle,
            options: Vec::default(),
            bounds: None,
        }
    }

    #[allow(missing_docs)]
    pub fn text(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Text,
            options: Vec::default(),
            bounds: None,
        }
    }

    /// An integer field over a range too wide to list as options.
    pub fn number(name: &str, label: &str, range: core::ops::RangeInclusive<i64>) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Number,
            options: Vec::default(),
            bounds: Some((*range.start(), *range.end())),
        }
    }

    /// Whether `value` is allowed in this field.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match self.kind {
            FieldKind::Select => self.options.iter().any(|o| o.value == *value),
            FieldKind::Toggle => value.as_bool().is_some(),
            FieldKind::Text => value.as_text().is_some(),
            FieldKind::Number => match (value.as_int(), self.bounds) {
                (Some(v), Some((min, max))) => (min..=max).contains(&v),
                (Some(_), None) => true,
                (None, _) => false,
            },
        }
    }
}

/// Finds the named field in a schema and checks the value against it.
pub fn validate(fields: &[Field], name: &str, value: &FieldValue) -> Result<(), ConfigError> {
    let Some(field) = fields.iter().find(|f| f.name == name) else {
        return Err(ConfigError::unknown_field(name));
    };
    if field.accepts(value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(name, value))
    }
}

/// Reads an integer that [validate()] has already approved.
pub(crate) fn int_of<T: TryFrom<i64>>(name: &str, value: &FieldValue) -> Result<T, ConfigError> {
    value
        .as_int()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| ConfigError::invalid(name, value))
}

/// Reads a kebab-case enum name that [validate()] has already approved.
pub(crate) fn enum_of<T: FromStr>(name: &str, value: &FieldValue) -> Result<T, ConfigError> {
    value
        .as_text()
        .and_then(|v| T::from_str(v).ok())
        .ok_or_else(|| ConfigError::invalid(name, value))
}

/// Turns an enum into the [FieldValue] that [Field::from_enum()] declares for
/// it.
pub(crate) fn enum_value<T: Into<&'static str>>(value: T) -> FieldValue {
    let s: &'static str = value.into();
    FieldValue::Text(s.to_string())
}
