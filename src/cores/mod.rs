// Copyright (c) 2024 Mike Tsao

//! The business logic of each built-in transformer, without the overhead that
//! the pipeline needs to host it. A core plus that overhead (a uid and an
//! enabled flag) is a [TransformerStage](crate::transformers::TransformerStage).
//! Cores exist separately from stages so that it's easier to focus on the
//! musical logic when developing a new transformer.

pub use arpeggiator::{ArpeggiatorCore, ArpeggiatorCoreBuilder, ArpeggioMode};
pub use filter::{FilterCore, FilterCoreBuilder, FilterMode};
pub use identity::IdentityCore;
pub use kill_old::{KillOldCore, KillOldCoreBuilder};
pub use midi_file_player::{MidiFilePlayerCore, MidiFilePlayerCoreBuilder, PlayerStatus};
pub use quantise::{QuantiseCore, QuantiseCoreBuilder};
pub use repeater::{RepeaterCore, RepeaterCoreBuilder};
pub use transposer::{ScaleMode, TransposerCore, TransposerCoreBuilder};

mod arpeggiator;
mod filter;
mod identity;
mod kill_old;
mod midi_file_player;
mod quantise;
mod repeater;
mod transposer;

