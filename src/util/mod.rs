// Copyright (c) 2024 Mike Tsao

//! System utilities.

/// Commonly used imports.
pub mod prelude {
    pub use super::{PipelineSettings, Rng};
}

pub use channels::CrossbeamChannel;
pub use rng::Rng;
pub use settings::PipelineSettings;

mod channels;
mod rng;
mod settings;
