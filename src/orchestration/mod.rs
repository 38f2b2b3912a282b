// Copyright (c) 2024 Mike Tsao

//! Composes transformers into a pipeline and connects the pipeline to its
//! outputs and recorder.

/// The most commonly used imports.
pub mod prelude {
    pub use super::{NoteLog, Performance, TransformerManager};
}

pub use {
    manager::TransformerManager,
    performance::{NoteEvent, NoteLog, Performance},
};

mod manager;
mod performance;
