// Copyright (c) 2024 Mike Tsao

#![deny(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]

//! Chordflow transforms streams of timed MIDI-style note events, with a focus
//! on live performance.
//!
//! There are several ways to use Chordflow, depending on the level of control
//! you need.
//!
//! * *Easiest, but least control*: Describe a chain in [PipelineSettings],
//! build it with a [TransformerFactory], and hand each tick's input to a
//! [Performance], which transforms, plays, and records it.
//! * *For more control over the main loop*: Run batches through a
//! [TransformerManager] yourself, dispatch the results however you like, and
//! append them to a [RecorderAudioEvent] for export.
//! * *Running off the main thread*: The `chordflow-services` crate hosts a
//! pipeline on its own thread and talks to it with serializable messages.
//! * *Maximum control, fewest batteries included*: Use bare transformer
//! [cores] and call their `transform()` directly.

/// A collection of imports that are useful to users of this crate. `use
/// chordflow::prelude::*;` for easier onboarding.
pub mod prelude {
    pub use super::{
        error::{ConfigError, TransformError},
        orchestration::prelude::*,
        recording::prelude::*,
        timing::prelude::*,
        traits::prelude::*,
        transformers::prelude::*,
        types::prelude::*,
        util::prelude::*,
    };
}

// Fundamental structures that are important enough to re-export at top level.
pub use {
    orchestration::{Performance, TransformerManager},
    recording::RecorderAudioEvent,
    transformers::{BuiltInTransformers, TransformerFactory},
    util::PipelineSettings,
};

pub mod cores;
pub mod error;
pub mod orchestration;
pub mod recording;
pub mod timing;
pub mod traits;
pub mod transformers;
pub mod types;
pub mod util;
