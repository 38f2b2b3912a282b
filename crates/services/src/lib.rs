// Copyright (c) 2024 Mike Tsao

//! Runs a chordflow pipeline off the caller's thread. The pipeline thread
//! and its clients talk over crossbeam channels with serializable messages.

#![deny(missing_docs)]

/// The most commonly used imports.
pub mod prelude {
    pub use super::{
        PipelineClient, PipelineError, PipelineService, PipelineServiceEvent,
        PipelineServiceInput, ProvidesService,
    };
}

pub use pipeline::{
    PipelineClient, PipelineError, PipelineService, PipelineServiceEvent, PipelineServiceInput,
    RequestId, QUIT_REQUEST_ID,
};
pub use traits::ProvidesService;

mod pipeline;
mod traits;
