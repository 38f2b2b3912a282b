// Copyright (c) 2024 Mike Tsao

//! Pipeline stages: the wrapper that turns a core into a [Transformer], the
//! configuration schema, the wire record, and the factory that rebuilds
//! stages from it.
//!
//! [Transformer]: crate::traits::Transformer

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, IntoStaticStr};

/// The most commonly used imports.
pub mod prelude {
    pub use super::{
        BuiltInTransformers, FieldValue, TransformerConfig, TransformerFactory, TransformerKey,
        TransformerStage, TransformerState,
    };
}

pub use factory::{BuiltInTransformers, TransformerFactory, TransformerFactoryFn, TransformerKey};
pub use fields::{validate, Field, FieldKind, FieldOption, FieldValue};
pub use stage::TransformerStage;
pub use state::{TransformerConfig, TransformerState};

pub(crate) use fields::{enum_of, enum_value, int_of};

mod factory;
mod fields;
mod stage;
mod state;

/// A coarse tag for grouping transformers in a UI. It has no effect on
/// behavior.
#[derive(
    Clone, Copy, Debug, Display, EnumIter, Eq, IntoStaticStr, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Category {
    /// Changes which notes sound.
    Tuning,
    /// Changes when notes sound.
    Timing,
    /// Makes new notes.
    Generative,
    /// Everything else.
    Utility,
}
